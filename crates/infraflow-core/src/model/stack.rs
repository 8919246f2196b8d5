//! スタック定義

use super::kind::ResourceKind;
use super::value::{OutputRef, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// 宣言されたリソース
///
/// KDL形式:
/// ```kdl
/// subnet "application-subnet" {
///     depends_on "myvnet"
///     name "applicationsubnet"
///     resource_group_name "${my-network.name}"
///     address_prefix "10.0.0.0/24"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDecl {
    /// スタック内で一意な論理名
    pub name: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// 推論される依存に加えて明示する順序
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ResourceDecl {
    pub fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            properties: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// プロパティが持つ出力参照
    pub fn references(&self) -> Vec<&OutputRef> {
        self.properties
            .values()
            .flat_map(|v| v.references())
            .collect()
    }

    /// このリソースより先に適用すべき論理名
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps: BTreeSet<String> = self.depends_on.iter().cloned().collect();
        deps.extend(self.references().into_iter().map(|r| r.resource.clone()));
        deps
    }

    /// 宣言時（未解決）のプロパティの正規化JSON
    pub fn declared_config(&self) -> serde_json::Value {
        serde_json::to_value(&self.properties).unwrap_or(serde_json::Value::Null)
    }
}

/// スタック（宣言全体）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stack {
    /// スタック名（プロジェクト名）
    pub name: String,
    /// テンプレート展開に使う変数
    #[serde(default)]
    pub variables: HashMap<String, String>,
    /// 宣言順のリソース
    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
    /// 適用後に公開する値（例: application_url）
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, name: &str) -> Option<&ResourceDecl> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// リソースを追加（同じ論理名があれば置き換え）
    pub fn add(&mut self, resource: ResourceDecl) {
        if let Some(existing) = self.resources.iter_mut().find(|r| r.name == resource.name) {
            *existing = resource;
        } else {
            self.resources.push(resource);
        }
    }

    /// ローカルオーバーライドのスタックを重ねる
    ///
    /// リソースは同じ論理名の宣言を置き換えるか、末尾に追加される。
    /// 出力と変数はマージされ、オーバーライド側が優先。
    pub fn apply_override(&mut self, overrides: Stack) {
        self.name = overrides.name;
        self.variables.extend(overrides.variables);
        for resource in overrides.resources {
            self.add(resource);
        }
        self.outputs.extend(overrides.outputs);
    }

    /// 論理名でリソースを削除
    pub fn remove(&mut self, name: &str) -> Option<ResourceDecl> {
        let pos = self.resources.iter().position(|r| r.name == name)?;
        Some(self.resources.remove(pos))
    }

    pub fn by_kind(&self, kind: ResourceKind) -> Vec<&ResourceDecl> {
        self.resources.iter().filter(|r| r.kind == kind).collect()
    }
}
