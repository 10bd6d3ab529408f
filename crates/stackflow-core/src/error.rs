use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// スタックマニフェストのリファレンス
pub const SCHEMA_DOCS_URL: &str = "https://okteto.com/docs/reference/stacks";

#[derive(Error, Debug)]
pub enum StackError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("env_file のパースエラー: {path}{}\n理由: {message}", .line.map(|l| format!(":{l}")).unwrap_or_default())]
    EnvFile {
        path: PathBuf,
        line: Option<usize>,
        message: String,
    },

    #[error("変数展開エラー: '{input}'\n理由: {message}")]
    Expand { input: String, message: String },

    #[error("IO エラー: {path}\n理由: {message}")]
    Io { path: PathBuf, message: String },
}

/// マニフェストの構文・スキーマ違反
///
/// 最初の違反だけでなく、検出したすべての違反を保持する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    pub violations: Vec<String>,
}

impl SchemaError {
    pub fn new(violations: Vec<String>) -> Self {
        Self { violations }
    }

    pub fn single(violation: impl Into<String>) -> Self {
        Self {
            violations: vec![violation.into()],
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Invalid stack manifest:")?;
        for violation in &self.violations {
            writeln!(f, "    - {violation}")?;
        }
        write!(f, "    See {SCHEMA_DOCS_URL} for details")
    }
}

impl std::error::Error for SchemaError {}

/// 構文的には正しいが意味的に不正なスタック
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid stack name: {reason}")]
    InvalidStackName { name: String, reason: String },

    #[error("Invalid stack: 'services' cannot be empty")]
    NoServices,

    #[error("Invalid endpoint '{endpoint}': service '{service}' does not exist")]
    UnknownEndpointService { endpoint: String, service: String },

    #[error("Invalid endpoint '{endpoint}': service '{service}' does not have port '{port}'")]
    MissingEndpointPort {
        endpoint: String,
        service: String,
        port: u16,
    },

    #[error("Invalid service name '{service}': {reason}")]
    InvalidServiceName { service: String, reason: String },

    #[error("Invalid service '{service}': image cannot be empty")]
    MissingImage { service: String },

    #[error("Invalid volume '{volume}' in service '{service}': must be an absolute path")]
    RelativeVolume { service: String, volume: String },

    #[error(
        "Invalid volume '{volume}' in service '{service}': volume bind mounts are not supported"
    )]
    BindMount { service: String, volume: String },

    #[error(
        "the namespace in the stack manifest '{manifest}' does not match the namespace '{requested}'"
    )]
    NamespaceMismatch { manifest: String, requested: String },
}

pub type Result<T> = std::result::Result<T, StackError>;
