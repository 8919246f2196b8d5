//! テンプレート展開機能
//!
//! スタックファイルの `{{ variable }}` をパース前にTeraで展開します。
//! 出力参照 (`${resource.output}`) はここでは扱わず、
//! 適用時に解決されます。

use crate::error::{Result, StackError};
use std::collections::HashMap;
use std::path::Path;
use tera::{Context, Tera};
use tracing::{debug, info};

/// ファイルあたりの推定バイト数（容量事前確保用）
const ESTIMATED_BYTES_PER_FILE: usize = 2000;

/// テンプレートに公開する環境変数のプレフィックス
const ALLOWED_PREFIXES: &[&str] = &["INFRA_", "CI_", "APP_"];

/// 変数コンテキスト
pub type Variables = HashMap<String, serde_json::Value>;

/// テンプレートプロセッサ
pub struct TemplateProcessor {
    tera: Tera,
    context: Context,
}

impl TemplateProcessor {
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
            context: Context::new(),
        }
    }

    /// 変数を追加
    pub fn add_variable(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.context.insert(key.into(), &value);
    }

    /// 複数の変数を追加
    pub fn add_variables(&mut self, variables: Variables) {
        for (key, value) in variables {
            self.context.insert(key, &value);
        }
    }

    /// 文字列値自体がテンプレートでありうる変数を追加
    ///
    /// `unique_id "{{ today }}"` は現在のコンテキストで展開してから追加するので、
    /// 後続のファイルで `{{ unique_id }}` を使える。
    pub fn add_rendered_variables(&mut self, variables: Variables) -> Result<()> {
        let mut keys: Vec<_> = variables.keys().cloned().collect();
        keys.sort();
        for key in keys {
            let value = match &variables[&key] {
                serde_json::Value::String(s) if s.contains("{{") || s.contains("{%") => {
                    serde_json::Value::String(self.render_str(s)?)
                }
                other => other.clone(),
            };
            self.context.insert(key, &value);
        }
        Ok(())
    }

    /// 組み込み変数: `PROJECT_ROOT` と `today` (yyyyMMdd)
    pub fn add_builtin_variables(&mut self, project_root: &Path) {
        self.add_variable(
            "PROJECT_ROOT",
            serde_json::Value::String(project_root.to_string_lossy().to_string()),
        );
        self.add_variable(
            "today",
            serde_json::Value::String(chrono::Local::now().format("%Y%m%d").to_string()),
        );
    }

    /// 環境変数を追加（許可されたプレフィックスのみ）
    ///
    /// 以下のプレフィックスのみ公開:
    /// - INFRA_*: InfraFlow固有
    /// - CI_*: CI/CD関連
    /// - APP_*: アプリケーション設定
    #[tracing::instrument(skip(self))]
    pub fn add_env_variables(&mut self) {
        let mut count = 0;

        for (key, value) in std::env::vars() {
            if ALLOWED_PREFIXES
                .iter()
                .any(|prefix| key.starts_with(prefix))
            {
                debug!(key = %key, "Adding environment variable");
                self.context.insert(key, &serde_json::Value::String(value));
                count += 1;
            }
        }

        info!(
            env_var_count = count,
            "Added filtered environment variables"
        );
    }

    /// .envファイルから変数を追加
    ///
    /// プロジェクトに明示的に置かれたファイルなので、プレフィックスに関係なく
    /// 全てのキーを読み込む。
    #[tracing::instrument(skip(self))]
    pub fn add_env_file_variables(&mut self, env_file_path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(env_file_path).map_err(|e| StackError::IoError {
            path: env_file_path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut count = 0;
        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = strip_quotes(value.trim());

                debug!(key = %key, "Adding variable from .env file");
                self.context
                    .insert(key, &serde_json::Value::String(value.to_string()));
                count += 1;
            }
        }

        info!(
            env_file = %env_file_path.display(),
            variable_count = count,
            "Loaded variables from .env file"
        );

        Ok(())
    }

    /// 文字列をテンプレートとして展開
    pub fn render_str(&mut self, template: &str) -> Result<String> {
        self.tera
            .render_str(template, &self.context)
            .map_err(|e| StackError::TemplateRenderError(extract_tera_error_detail(&e)))
    }

    /// ファイルを読み込んで展開
    pub fn render_file(&mut self, path: &Path) -> Result<String> {
        let content = std::fs::read_to_string(path).map_err(|e| StackError::IoError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        self.render_str(&content).map_err(|e| match e {
            StackError::TemplateRenderError(message) => StackError::TemplateError {
                file: path.to_path_buf(),
                line: None,
                message,
            },
            other => other,
        })
    }

    /// 複数のファイルを展開して連結
    pub fn render_files(&mut self, paths: &[impl AsRef<Path>]) -> Result<String> {
        let mut result = String::with_capacity(paths.len() * ESTIMATED_BYTES_PER_FILE);

        for path in paths {
            let rendered = self.render_file(path.as_ref())?;
            result.push_str(&rendered);
            result.push('\n');
        }

        Ok(result)
    }
}

impl Default for TemplateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// KDLから `variables { ... }` ブロックを抽出
///
/// ブロックはテキストとして探すので、他の箇所のプレースホルダーが展開前に
/// 妥当である必要はない。後のブロックが優先。
pub fn extract_variables(kdl_content: &str) -> Result<Variables> {
    use regex::Regex;

    let re = Regex::new(r"(?m)^\s*variables\s*\{")
        .map_err(|e| StackError::InvalidConfig(format!("regex compile error: {}", e)))?;

    let mut all_vars = HashMap::new();

    for mat in re.find_iter(kdl_content) {
        let open = mat.end() - 1;
        let Some(close) = find_matching_brace(kdl_content, open) else {
            return Err(StackError::InvalidConfig(
                "variables block is not closed".to_string(),
            ));
        };

        // ブロック本体だけをダミーノードで包んでパース
        let dummy_kdl = format!("extracted {{\n{}\n}}", &kdl_content[open + 1..close]);
        let doc: kdl::KdlDocument = dummy_kdl.parse().map_err(|e| {
            StackError::InvalidConfig(format!("KDL parse error (variables block): {}", e))
        })?;

        if let Some(node) = doc.nodes().first()
            && let Some(children) = node.children()
        {
            for var_node in children.nodes() {
                let key = var_node.name().value().to_string();
                if let Some(entry) = var_node.entries().first() {
                    all_vars.insert(key, kdl_value_to_json(entry.value()));
                }
            }
        }
    }

    Ok(all_vars)
}

/// `open_pos` の開き括弧に対応する閉じ括弧を探す
fn find_matching_brace(content: &str, open_pos: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    if open_pos >= bytes.len() || bytes[open_pos] != b'{' {
        return None;
    }

    let mut depth = 1;
    let mut pos = open_pos + 1;
    let mut in_string = false;
    let mut escape_next = false;

    while pos < bytes.len() && depth > 0 {
        let c = bytes[pos];

        if escape_next {
            escape_next = false;
            pos += 1;
            continue;
        }

        if c == b'\\' {
            escape_next = true;
            pos += 1;
            continue;
        }

        if c == b'"' {
            in_string = !in_string;
        } else if !in_string {
            if c == b'{' {
                depth += 1;
            } else if c == b'}' {
                depth -= 1;
            }
        }

        pos += 1;
    }

    if depth == 0 { Some(pos - 1) } else { None }
}

/// "value" → value, 'value' → value
fn strip_quotes(s: &str) -> &str {
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Teraのエラーチェーンから有用な部分を取り出す
fn extract_tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }

    let full_error = details.join(" | ");

    // "Variable `xxx` not found in context"
    if full_error.contains("not found in context")
        && let Some(start) = full_error.find("Variable `")
        && let Some(end) = full_error[start..].find("` not found")
    {
        let var_name = &full_error[start + 10..start + end];
        return format!(
            "undefined variable: `{}`\nhint: define it in a variables block or in .env",
            var_name
        );
    }

    if full_error.contains("Filter") && full_error.contains("not found") {
        return format!("undefined filter\ndetail: {full_error}");
    }

    full_error
}

fn kdl_value_to_json(value: &kdl::KdlValue) -> serde_json::Value {
    if let Some(s) = value.as_string() {
        serde_json::Value::String(s.to_string())
    } else if let Some(i) = value.as_integer() {
        serde_json::Value::Number((i as i64).into())
    } else if let Some(f) = value.as_float() {
        serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    } else if let Some(b) = value.as_bool() {
        serde_json::Value::Bool(b)
    } else {
        serde_json::Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_location_expansion() {
        let mut processor = TemplateProcessor::new();
        processor.add_variable("location", serde_json::Value::String("westeurope".to_string()));

        let result = processor.render_str(r#"location "{{ location }}""#).unwrap();
        assert_eq!(result, r#"location "westeurope""#);
    }

    #[test]
    fn test_references_are_left_alone() {
        let mut processor = TemplateProcessor::new();
        processor.add_variable("suffix", serde_json::Value::String("0101".to_string()));

        let template = r#"name "vnet{{ suffix }}" rg "${my-network.name}""#;
        let result = processor.render_str(template).unwrap();
        assert_eq!(result, r#"name "vnet0101" rg "${my-network.name}""#);
    }

    #[test]
    fn test_filter_lower() {
        let mut processor = TemplateProcessor::new();
        processor.add_variable("team", serde_json::Value::String("Platform".to_string()));

        assert_eq!(
            processor.render_str("registry{{ team | lower }}").unwrap(),
            "registryplatform"
        );
    }

    #[test]
    fn test_if_condition() {
        let mut processor = TemplateProcessor::new();
        processor.add_variable("is_prod", serde_json::Value::Bool(true));

        let template = r#"
{% if is_prod %}
capacity 3
{% else %}
capacity 1
{% endif %}
"#;
        let result = processor.render_str(template).unwrap();

        assert!(result.contains("capacity 3"));
        assert!(!result.contains("capacity 1"));
    }

    #[test]
    fn test_builtin_today() {
        let mut processor = TemplateProcessor::new();
        processor.add_builtin_variables(Path::new("/tmp/project"));

        let today = processor.render_str("{{ today }}").unwrap();
        assert_eq!(today.len(), 8);
        assert!(today.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(
            processor.render_str("{{ PROJECT_ROOT }}").unwrap(),
            "/tmp/project"
        );
    }

    #[test]
    fn test_rendered_variables_can_use_builtins() {
        let mut processor = TemplateProcessor::new();
        processor.add_variable("today", serde_json::Value::String("20240101".to_string()));

        let mut vars = Variables::new();
        vars.insert(
            "unique_id".to_string(),
            serde_json::Value::String("{{ today }}".to_string()),
        );
        processor.add_rendered_variables(vars).unwrap();

        assert_eq!(
            processor.render_str("myvnet{{ unique_id }}").unwrap(),
            "myvnet20240101"
        );
    }

    #[test]
    fn test_extract_variables() {
        let kdl = r#"
variables {
    location "westeurope"
    capacity 2
    zone_redundant #true
    unique_id "{{ today }}"
}
"#;

        let vars = extract_variables(kdl).unwrap();

        assert_eq!(vars.get("location").unwrap(), "westeurope");
        assert_eq!(vars.get("capacity").unwrap(), 2);
        assert_eq!(vars.get("zone_redundant").unwrap(), true);
        assert_eq!(vars.get("unique_id").unwrap(), "{{ today }}");
    }

    #[test]
    fn test_extract_multiple_variables_blocks() {
        let kdl = r#"
variables {
    name "first"
}

resource_group "rg" {}

variables {
    name "second"
}
"#;

        let vars = extract_variables(kdl).unwrap();

        // 後の定義が優先
        assert_eq!(vars.get("name").unwrap(), "second");
    }

    #[test]
    fn test_undefined_variable_error() {
        let mut processor = TemplateProcessor::new();

        let err = processor.render_str("storage{{ unique_suffix }}").unwrap_err();
        let err_msg = err.to_string();
        assert!(
            err_msg.contains("unique_suffix"),
            "error message should name the variable: {}",
            err_msg
        );
    }

    #[test]
    #[serial]
    fn test_env_variables_filtering() {
        unsafe {
            std::env::set_var("INFRA_LOCATION", "northeurope");
            std::env::set_var("CI_PIPELINE_ID", "12345");
            std::env::set_var("SECRET_KEY", "should_not_be_included");
        }

        let mut processor = TemplateProcessor::new();
        processor.add_env_variables();

        assert_eq!(
            processor.render_str("{{ INFRA_LOCATION }}").unwrap(),
            "northeurope"
        );
        assert_eq!(processor.render_str("{{ CI_PIPELINE_ID }}").unwrap(), "12345");
        assert!(processor.render_str("{{ SECRET_KEY }}").is_err());

        unsafe {
            std::env::remove_var("INFRA_LOCATION");
            std::env::remove_var("CI_PIPELINE_ID");
            std::env::remove_var("SECRET_KEY");
        }
    }

    #[test]
    fn test_env_file_variables() {
        let temp_dir = tempfile::tempdir().unwrap();
        let env_file = temp_dir.path().join(".env");

        std::fs::write(
            &env_file,
            r#"
# comment
SUBSCRIPTION=local-subscription
REGISTRY_SKU="Premium"
EMPTY_VALUE=
QUOTED_SINGLE='single quoted'
"#,
        )
        .unwrap();

        let mut processor = TemplateProcessor::new();
        processor.add_env_file_variables(&env_file).unwrap();

        assert_eq!(
            processor.render_str("{{ SUBSCRIPTION }}").unwrap(),
            "local-subscription"
        );
        assert_eq!(processor.render_str("{{ REGISTRY_SKU }}").unwrap(), "Premium");
        assert_eq!(
            processor.render_str("{{ QUOTED_SINGLE }}").unwrap(),
            "single quoted"
        );
        assert_eq!(processor.render_str("{{ EMPTY_VALUE }}").unwrap(), "");
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("\"Standard_LRS\""), "Standard_LRS");
        assert_eq!(strip_quotes("'Standard_LRS'"), "Standard_LRS");
        assert_eq!(strip_quotes("Standard_LRS"), "Standard_LRS");
        assert_eq!(strip_quotes("\"Standard_LRS"), "\"Standard_LRS");
        assert_eq!(strip_quotes("\""), "\"");
        assert_eq!(strip_quotes(""), "");
    }

    #[test]
    fn test_find_matching_brace() {
        assert_eq!(find_matching_brace("{ sku }", 0), Some(6));
        assert_eq!(find_matching_brace("{ outer { inner } }", 0), Some(18));
        assert_eq!(find_matching_brace(r#"{ "a { b }" }"#, 0), Some(12));
        assert_eq!(find_matching_brace("{ sku", 0), None);
    }
}
