use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error("IO エラー: {path}\n理由: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("設定ファイルのパースエラー: {path}\n理由: {message}")]
    Parse { path: PathBuf, message: String },

    #[error(
        "ビルド先が見つかりません。以下のいずれかを設定してください:\n\
        - BUILDKIT_HOST 環境変数\n\
        - 設定ファイルの managed_buildkit_host (~/.config/stackflow/config.yaml)\n\
        設定ファイルは STACKFLOW_CONFIG_PATH 環境変数で直接指定できます"
    )]
    NoBuildTarget,
}

pub type Result<T> = std::result::Result<T, ConfigError>;
