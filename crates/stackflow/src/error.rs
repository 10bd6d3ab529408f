use stackflow_build::BuildError;
use stackflow_config::ConfigError;
use stackflow_core::{StackError, ValidationError};
use stackflow_translate::TranslateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Stack(#[from] StackError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(BuildError),

    #[error("コンパイルがキャンセルされました")]
    Cancelled,

    #[error(transparent)]
    Translate(#[from] TranslateError),
}

impl From<BuildError> for CompileError {
    fn from(err: BuildError) -> Self {
        if err.is_cancelled() {
            CompileError::Cancelled
        } else {
            CompileError::Build(err)
        }
    }
}

impl CompileError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CompileError::Cancelled)
    }

    /// 利用者向けのメッセージ（ビルドエラーは対処方法付き）
    pub fn user_message(&self) -> String {
        match self {
            CompileError::Build(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
