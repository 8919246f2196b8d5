//! リソースノードのパース

use crate::error::{Result, StackError};
use crate::model::{ResourceDecl, ResourceKind, Value};
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

/// `subnet "gateway-subnet" { ... }` のようなリソースノードをパース
///
/// プロパティはノードの `key=value` エントリと子ノードから取得する。
/// 子ノードの `depends_on` は明示的な順序を追加する。
pub fn parse_resource(node: &KdlNode, kind: ResourceKind) -> Result<ResourceDecl> {
    let name = node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| StackError::InvalidConfig(format!("{} requires a name", kind)))?
        .to_string();

    let mut resource = ResourceDecl::new(name, kind);

    for entry in node.entries() {
        if let Some(key) = entry.name() {
            resource
                .properties
                .insert(key.value().replace('-', "_"), parse_value(entry.value())?);
        }
    }

    if let Some(children) = node.children() {
        let mut block = KdlDocument::new();
        for child in children.nodes() {
            match child.name().value() {
                "depends_on" | "depends-on" => {
                    resource.depends_on.extend(
                        child
                            .entries()
                            .iter()
                            .filter_map(|e| e.value().as_string().map(|s| s.to_string())),
                    );
                }
                _ => block.nodes_mut().push(child.clone()),
            }
        }
        resource.properties.extend(parse_block(&block)?);
    }

    Ok(resource)
}

/// ブロックの子ノードをプロパティマップにパース
///
/// 同じブロック内で繰り返されたプロパティはリストにまとめる。
pub fn parse_block(doc: &KdlDocument) -> Result<BTreeMap<String, Value>> {
    let mut properties: BTreeMap<String, Value> = BTreeMap::new();
    let mut repeated: HashSet<String> = HashSet::new();

    for node in doc.nodes() {
        let key = node.name().value().replace('-', "_");
        let value = parse_property(node)?;

        match properties.remove(&key) {
            None => {
                properties.insert(key, value);
            }
            Some(Value::List(mut items)) if repeated.contains(&key) => {
                items.push(value);
                properties.insert(key, Value::List(items));
            }
            Some(existing) => {
                repeated.insert(key.clone());
                properties.insert(key, Value::List(vec![existing, value]));
            }
        }
    }

    Ok(properties)
}

/// プロパティノードを1つパース
///
/// - `prefix "10.0.0.0/24"` → スカラー
/// - `address_spaces "10.0.0.0/16" "10.1.0.0/16"` → リスト
/// - `sku name="Standard_v2" { capacity 1 }` → マップ
/// - `frontend_port "sqfrontendport" port=80` → 引数を `name` に持つマップ
fn parse_property(node: &KdlNode) -> Result<Value> {
    let args: Vec<&KdlValue> = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value())
        .collect();
    let has_props = node.entries().iter().any(|e| e.name().is_some());

    if !has_props && node.children().is_none() {
        return match args.as_slice() {
            [] => Ok(Value::Literal(serde_json::Value::Bool(true))),
            [single] => parse_value(single),
            many => many
                .iter()
                .map(|v| parse_value(v))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
        };
    }

    let mut fields = BTreeMap::new();
    match args.as_slice() {
        [] => {}
        [single] => {
            fields.insert("name".to_string(), parse_value(single)?);
        }
        _ => {
            return Err(StackError::InvalidConfig(format!(
                "block '{}' accepts at most one argument (its name)",
                node.name().value()
            )));
        }
    }

    for entry in node.entries() {
        if let Some(key) = entry.name() {
            fields.insert(key.value().replace('-', "_"), parse_value(entry.value())?);
        }
    }

    if let Some(children) = node.children() {
        fields.extend(parse_block(children)?);
    }

    Ok(Value::Map(fields))
}

/// KDLの値をプロパティ値に変換
pub fn parse_value(value: &KdlValue) -> Result<Value> {
    if let Some(s) = value.as_string() {
        if matches!(s, "true" | "false") {
            warn!(
                value = s,
                "String \"{s}\" is not a boolean; in KDL v2 write #{s} instead"
            );
        }
        return Value::parse_str(s);
    }
    if let Some(i) = value.as_integer() {
        let i = i64::try_from(i)
            .map_err(|_| StackError::InvalidConfig(format!("integer out of range: {}", i)))?;
        return Ok(Value::Literal(serde_json::Value::from(i)));
    }
    if let Some(f) = value.as_float() {
        return serde_json::Number::from_f64(f)
            .map(|n| Value::Literal(serde_json::Value::Number(n)))
            .ok_or_else(|| StackError::InvalidConfig(format!("invalid number: {}", f)));
    }
    if let Some(b) = value.as_bool() {
        return Ok(Value::Literal(serde_json::Value::Bool(b)));
    }
    Ok(Value::Literal(serde_json::Value::Null))
}
