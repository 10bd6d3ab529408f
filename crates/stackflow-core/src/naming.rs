//! クラスタで安全に使える識別子の検証と正規化

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

const BAD_NAME_REASON: &str = "must consist of lower case alphanumeric characters or '-', and must start and end with an alphanumeric character";

/// 許可されない文字の連続にマッチ
static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\-]+").expect("static regex"));

/// 識別子が不正な理由
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameError {
    pub reason: &'static str,
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason)
    }
}

/// 名前がクラスタ安全な識別子かを検証
///
/// 小文字英数字と `-` のみ、先頭と末尾は英数字、空文字は不可。
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError {
            reason: "name cannot be empty",
        });
    }
    if INVALID_CHARS.is_match(name) || name.starts_with('-') || name.ends_with('-') {
        return Err(NameError {
            reason: BAD_NAME_REASON,
        });
    }
    Ok(())
}

/// 任意の文字列を識別子に寄せる
///
/// ディレクトリ名からスタック名を導出するときに使う。
pub fn normalize_name(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    INVALID_CHARS
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}
