use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("リソース '{kind}/{name}' の YAML 出力に失敗しました: {message}")]
    Render {
        kind: &'static str,
        name: String,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, TranslateError>;
