//! InfraFlow コア
//!
//! クラウドリソースのスタック宣言を扱う。リソースモデル、KDLパーサー、
//! テンプレート展開、プロジェクト検出、依存関係の解決を提供します。
//!
//! ```text
//! stack.kdl ─▶ template ─▶ parser ─▶ Stack ─▶ DependencyGraph
//!                 ▲                              │
//!             variables                    topological order,
//!             .env / env                   levels, dependents
//! ```

pub mod discovery;
pub mod error;
pub mod graph;
pub mod loader;
pub mod model;
pub mod parser;
pub mod template;

// Re-exports
pub use discovery::{DiscoveredFiles, discover_files, find_project_root};
pub use error::{Result, StackError};
pub use graph::{DependencyGraph, GraphError};
pub use loader::{LoadedStack, load_project, load_project_from_root, load_stack_str};
pub use model::{OutputRef, ResourceDecl, ResourceKind, Stack, TemplatePart, Value};
pub use parser::{parse_kdl_file, parse_kdl_string};
pub use template::{TemplateProcessor, Variables};
