//! モデル定義
//!
//! スタックマニフェストを表すデータモデルを定義します。
//! 各モデルは機能ごとにモジュールに分離されています。

mod endpoint;
mod forms;
mod resources;
mod service;
mod stack;

// Re-exports
pub use endpoint::*;
pub use resources::*;
pub use service::*;
pub use stack::*;
