//! プロパティ値
//!
//! プロパティは宣言時に確定する値（リテラル）か、他のリソースの作成後まで
//! 確定しない値（出力への参照）のどちらか。テンプレートは
//! 1つの文字列の中に両方を含みます。

use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 他リソースの出力への参照 (`${resource.output}`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputRef {
    /// 参照先リソースの論理名
    pub resource: String,
    /// 出力名 (id, fqdn, ip_address など)
    pub output: String,
}

impl OutputRef {
    pub fn new(resource: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            output: output.into(),
        }
    }

    /// `resource.output` をパース
    ///
    /// 論理名はハイフンを含めるがドットは含めないので、最初のドットで分割する。
    pub fn parse(s: &str) -> Option<Self> {
        let (resource, output) = s.trim().split_once('.')?;
        if resource.is_empty() || output.is_empty() || output.contains('.') {
            return None;
        }
        Some(Self::new(resource, output))
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.output)
    }
}

/// 文字列テンプレートの断片
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplatePart {
    Text(String),
    Ref(OutputRef),
}

/// 宣言されたプロパティ値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// 宣言時に確定している値
    Literal(serde_json::Value),
    /// 他リソースの出力（出力のJSON型を保つ）
    Reference(OutputRef),
    /// リテラルと参照が混在する文字列
    Template(Vec<TemplatePart>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Literal(serde_json::Value::String(s.into()))
    }

    pub fn reference(resource: impl Into<String>, output: impl Into<String>) -> Self {
        Value::Reference(OutputRef::new(resource, output))
    }

    /// `${resource.output}` を含みうる文字列をパース
    ///
    /// `$${` はリテラルの `${` になる。
    pub fn parse_str(s: &str) -> Result<Self> {
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut rest = s;

        while let Some(pos) = rest.find('$') {
            text.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if let Some(after) = tail.strip_prefix("$${") {
                text.push_str("${");
                rest = after;
            } else if let Some(after) = tail.strip_prefix("${") {
                let end = after.find('}').ok_or_else(|| {
                    StackError::InvalidReference(format!("unterminated placeholder in \"{}\"", s))
                })?;
                let inner = &after[..end];
                let output_ref = OutputRef::parse(inner).ok_or_else(|| {
                    StackError::InvalidReference(format!(
                        "\"${{{}}}\" must be written as ${{resource.output}}",
                        inner
                    ))
                })?;
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                }
                parts.push(TemplatePart::Ref(output_ref));
                rest = &after[end + 1..];
            } else {
                text.push('$');
                rest = &tail[1..];
            }
        }
        text.push_str(rest);
        if !text.is_empty() {
            parts.push(TemplatePart::Text(text));
        }

        let has_refs = parts.iter().any(|p| matches!(p, TemplatePart::Ref(_)));
        if !has_refs {
            let joined: String = parts
                .into_iter()
                .filter_map(|p| match p {
                    TemplatePart::Text(t) => Some(t),
                    TemplatePart::Ref(_) => None,
                })
                .collect();
            return Ok(Value::string(joined));
        }

        if parts.len() == 1
            && let Some(TemplatePart::Ref(r)) = parts.pop()
        {
            return Ok(Value::Reference(r));
        }

        Ok(Value::Template(parts))
    }

    /// 文字列リテラルならその内容
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Literal(serde_json::Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// この値に含まれる全ての出力参照
    pub fn references(&self) -> Vec<&OutputRef> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a OutputRef>) {
        match self {
            Value::Literal(_) => {}
            Value::Reference(r) => out.push(r),
            Value::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Ref(r) = part {
                        out.push(r);
                    }
                }
            }
            Value::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Value::Map(fields) => {
                for value in fields.values() {
                    value.collect_references(out);
                }
            }
        }
    }

    /// 出力なしで値が確定しているか
    pub fn is_known(&self) -> bool {
        self.references().is_empty()
    }

    /// 参照先の出力が揃った後に具体的な値を生成
    ///
    /// `lookup` は参照に対応する出力を返す。答えられなかった最初の参照が
    /// エラーとして返る。
    pub fn resolve<F>(&self, lookup: &F) -> std::result::Result<serde_json::Value, OutputRef>
    where
        F: Fn(&OutputRef) -> Option<serde_json::Value>,
    {
        match self {
            Value::Literal(v) => Ok(v.clone()),
            Value::Reference(r) => lookup(r).ok_or_else(|| r.clone()),
            Value::Template(parts) => {
                let mut rendered = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(t) => rendered.push_str(t),
                        TemplatePart::Ref(r) => match lookup(r).ok_or_else(|| r.clone())? {
                            serde_json::Value::String(s) => rendered.push_str(&s),
                            other => rendered.push_str(&other.to_string()),
                        },
                    }
                }
                Ok(serde_json::Value::String(rendered))
            }
            Value::List(items) => items
                .iter()
                .map(|item| item.resolve(lookup))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
            Value::Map(fields) => {
                let mut map = serde_json::Map::new();
                for (key, value) in fields {
                    map.insert(key.clone(), value.resolve(lookup)?);
                }
                Ok(serde_json::Value::Object(map))
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Literal(value)
    }
}
