//! StackFlow core
//!
//! スタックマニフェストのモデル、パーサー、検証、環境変数の解決を提供します。

pub mod env;
pub mod error;
pub mod model;
pub mod naming;
pub mod parser;
pub mod quantity;
mod validate;

pub use env::{expand_env, expand_with, parse_env_file};
pub use error::{Result, SchemaError, StackError, ValidationError, SCHEMA_DOCS_URL};
pub use model::*;
pub use naming::{normalize_name, validate_name, NameError};
pub use parser::{load_stack, load_stack_file, read_stack};
pub use quantity::{Quantity, QuantityError};
