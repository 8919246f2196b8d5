//! KDLパーサー
//!
//! InfraFlowのスタックファイルをパースします。リソースノードは
//! 専用モジュールで扱います。

mod resource;

pub use resource::{parse_block, parse_resource, parse_value};

use crate::error::{Result, StackError};
use crate::model::{ResourceKind, Stack};
use kdl::KdlDocument;
use std::fs;
use std::path::Path;
use tracing::debug;

/// KDLファイルをパースしてStackを生成
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<Stack> {
    let content = fs::read_to_string(path.as_ref())?;
    let name = path
        .as_ref()
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    parse_kdl_string(&content, name)
}

/// KDL文字列をパース
///
/// 論理名の宣言は1回まで。`stack.local.kdl` のオーバーライドは別にパースし、
/// [`Stack::apply_override`] で適用する。
pub fn parse_kdl_string(content: &str, default_name: String) -> Result<Stack> {
    let doc: KdlDocument = content.parse()?;
    let mut stack = Stack::new(default_name);

    for node in doc.nodes() {
        match node.name().value() {
            "stack" | "project" => {
                if let Some(stack_name) = node.entries().first().and_then(|e| e.value().as_string())
                {
                    stack.name = stack_name.to_string();
                }
            }
            "variables" => {
                // テンプレート展開で使用済み、表示用に保持
                if let Some(vars) = node.children() {
                    for var in vars.nodes() {
                        let key = var.name().value().to_string();
                        let value = var
                            .entries()
                            .first()
                            .map(|e| match e.value().as_string() {
                                Some(s) => s.to_string(),
                                None => e.value().to_string(),
                            })
                            .unwrap_or_default();
                        stack.variables.insert(key, value);
                    }
                }
            }
            "output" => {
                let mut args = node.entries().iter().filter(|e| e.name().is_none());
                let output_name = args
                    .next()
                    .and_then(|e| e.value().as_string())
                    .ok_or_else(|| StackError::InvalidConfig("output requires a name".to_string()))?
                    .to_string();
                let value = args.next().ok_or_else(|| {
                    StackError::InvalidConfig(format!("output '{}' requires a value", output_name))
                })?;
                stack
                    .outputs
                    .insert(output_name, parse_value(value.value())?);
            }
            other => {
                let kind: ResourceKind =
                    other
                        .parse()
                        .map_err(|_| StackError::UnknownResourceKind {
                            kind: other.to_string(),
                            name: node
                                .entries()
                                .first()
                                .and_then(|e| e.value().as_string())
                                .unwrap_or("")
                                .to_string(),
                        })?;
                let resource = parse_resource(node, kind)?;
                if stack.contains(&resource.name) {
                    return Err(StackError::DuplicateResource(resource.name));
                }
                stack.resources.push(resource);
            }
        }
    }

    debug!(
        stack = %stack.name,
        resources = stack.resources.len(),
        outputs = stack.outputs.len(),
        "Parsed stack"
    );
    Ok(stack)
}
