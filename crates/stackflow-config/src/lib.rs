//! StackFlow の設定
//!
//! コンパイラ全体の設定ファイルと、イメージビルド先の解決を扱います。

pub mod error;

pub use error::*;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 管理レジストリのデフォルトプレフィックス
pub const DEFAULT_REGISTRY_PREFIX: &str = "okteto.dev";

/// 設定ファイルのパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "STACKFLOW_CONFIG_PATH";

/// 管理外のビルドキットを指定する環境変数
pub const BUILDKIT_HOST_ENV: &str = "BUILDKIT_HOST";

/// コンパイラ設定
///
/// ```yaml
/// managed_buildkit_host: tcp://buildkit.example.com:1234
/// managed_registry_prefix: okteto.dev
/// managed_registry_host: registry.example.com
/// registry_token: xxxxx
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 管理ビルドキットのアドレス
    pub managed_buildkit_host: Option<String>,
    /// 管理レジストリのイメージ名プレフィックス
    pub managed_registry_prefix: String,
    /// 管理プレフィックスを展開する先のレジストリホスト
    pub managed_registry_host: Option<String>,
    /// レジストリ API の Bearer トークン
    pub registry_token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            managed_buildkit_host: None,
            managed_registry_prefix: DEFAULT_REGISTRY_PREFIX.to_string(),
            managed_registry_host: None,
            registry_token: None,
        }
    }
}

/// イメージのビルド先
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    /// ビルドキットのアドレス
    pub host: String,
    /// 管理ビルドキットか（イメージ名の書き換え対象）
    pub managed: bool,
    /// 管理レジストリのプレフィックス
    pub registry_prefix: String,
}

impl BuildTarget {
    pub fn managed(host: impl Into<String>, registry_prefix: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            managed: true,
            registry_prefix: registry_prefix.into(),
        }
    }

    pub fn unmanaged(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            managed: false,
            registry_prefix: DEFAULT_REGISTRY_PREFIX.to_string(),
        }
    }

    /// イメージが管理レジストリ配下か
    pub fn is_managed_image(&self, image: &str) -> bool {
        image.starts_with(&self.registry_prefix)
    }
}

/// StackFlowの設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("stackflow"))
}

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 STACKFLOW_CONFIG_PATH (直接パス指定)
/// 2. ~/.config/stackflow/config.yaml
pub fn find_settings_file() -> Option<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Some(path);
        }
        debug!(path = %path.display(), "STACKFLOW_CONFIG_PATH does not exist");
    }

    // 2. グローバル設定ファイル
    let global = get_config_dir().ok()?.join("config.yaml");
    global.exists().then_some(global)
}

/// 設定ファイルを読み込む。見つからなければデフォルト
pub fn load_settings() -> Result<Settings> {
    match find_settings_file() {
        Some(path) => load_settings_from(&path),
        None => {
            debug!("No settings file found, using defaults");
            Ok(Settings::default())
        }
    }
}

/// 指定したパスから設定を読み込む
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if content.trim().is_empty() {
        return Ok(Settings::default());
    }

    let mut settings: Settings =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    if settings.managed_registry_prefix.is_empty() {
        settings.managed_registry_prefix = DEFAULT_REGISTRY_PREFIX.to_string();
    }

    info!(path = %path.display(), "Loaded settings");
    Ok(settings)
}

/// ビルド先を解決
///
/// 1. 環境変数 BUILDKIT_HOST があれば管理外のビルドキット
/// 2. 設定の managed_buildkit_host があれば管理ビルドキット
/// 3. どちらもなければエラー
pub fn resolve_build_target(settings: &Settings) -> Result<BuildTarget> {
    if let Ok(host) = std::env::var(BUILDKIT_HOST_ENV)
        && !host.is_empty()
    {
        debug!(host = %host, "Using BUILDKIT_HOST");
        return Ok(BuildTarget {
            host,
            managed: false,
            registry_prefix: settings.managed_registry_prefix.clone(),
        });
    }

    if let Some(host) = settings
        .managed_buildkit_host
        .as_deref()
        .filter(|h| !h.is_empty())
    {
        debug!(host = %host, "Using managed buildkit");
        return Ok(BuildTarget::managed(
            host,
            settings.managed_registry_prefix.clone(),
        ));
    }

    Err(ConfigError::NoBuildTarget)
}
