//! StackFlow のスタックをクラスタのリソース仕様に変換する

pub mod error;
pub mod labels;
pub mod resources;
pub mod translator;

pub use error::*;
pub use resources::*;
pub use translator::{render_yaml, translate};
