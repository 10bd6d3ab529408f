use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid build configuration for service '{service}': {message}")]
    Configuration { service: String, message: String },

    #[error("Registry lookup failed for image '{image}': {message}")]
    Registry { image: String, message: String },

    #[error("Build failed for service '{service}': {message}")]
    Failed { service: String, message: String },

    #[error("Build cancelled")]
    Cancelled,

    #[error("Registry authentication failed for {registry}: {message}")]
    AuthFailed { registry: String, message: String },
}

impl BuildError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::Configuration { service, message } => {
                format!(
                    "サービス '{}' のビルド設定が不正です: {}\n\
                     \n\
                     解決方法:\n\
                     1. image フィールドでビルド後のイメージ名を指定してください\n\
                     2. もしくは管理ビルドキットを設定してください (managed_buildkit_host)",
                    service, message
                )
            }
            BuildError::Registry { image, message } => {
                format!(
                    "レジストリへの問い合わせに失敗しました: {}\n\
                     理由: {}\n\
                     \n\
                     レジストリへの接続と認証情報を確認してください。\n\
                     強制的にビルドする場合は force_build を指定してください。",
                    image, message
                )
            }
            BuildError::Failed { service, message } => {
                format!(
                    "サービス '{}' のビルドに失敗しました: {}\n\
                     \n\
                     Dockerfileの内容を確認してください。",
                    service, message
                )
            }
            _ => format!("{}", self),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BuildError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
