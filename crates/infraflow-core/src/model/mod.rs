//! モデル定義
//!
//! 宣言されたスタックのデータモデル。関心ごとにモジュールを分けています。

mod kind;
mod stack;
mod value;

// Re-exports
pub use kind::*;
pub use stack::*;
pub use value::*;
