//! レジストリ認証処理
//!
//! Docker config.json から認証情報を取得します。

use crate::error::{BuildError, Result};
use base64::Engine;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Docker config.json の構造
#[derive(Debug, Deserialize)]
struct DockerConfig {
    /// 認証情報 (レジストリ -> AuthEntry)
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
}

/// 認証エントリ
#[derive(Debug, Deserialize)]
struct AuthEntry {
    /// Base64エンコードされた "username:password"
    auth: Option<String>,
}

/// Basic 認証の資格情報
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// レジストリ認証を管理
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    config_path: PathBuf,
}

impl Default for RegistryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryAuth {
    /// デフォルトで ~/.docker/config.json を使用
    pub fn new() -> Self {
        let config_path = std::env::var("DOCKER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|h| h.join(".docker"))
                    .unwrap_or_else(|| PathBuf::from(".docker"))
            })
            .join("config.json");

        Self { config_path }
    }

    /// 指定したパスの config.json を使用
    pub fn with_config_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// レジストリの認証情報を取得
    ///
    /// * `Ok(Some(credentials))` - 認証情報が見つかった場合
    /// * `Ok(None)` - config.json がない、またはエントリがない場合
    pub fn get_credentials(&self, registry: &str) -> Result<Option<RegistryCredentials>> {
        // config.json が存在しない場合は認証なしで続行
        if !self.config_path.exists() {
            tracing::debug!("Docker config.json not found at {:?}", self.config_path);
            return Ok(None);
        }

        let config = self.load_docker_config()?;

        // Docker Hub は歴史的に URL 形式のキーで保存される
        let keys = [
            registry.to_string(),
            format!("https://{registry}"),
            "https://index.docker.io/v1/".to_string(),
        ];
        let entry = keys
            .iter()
            .take(if registry == crate::image::DOCKER_HUB { 3 } else { 2 })
            .find_map(|key| config.auths.get(key));

        if let Some(auth_entry) = entry
            && let Some(auth_b64) = &auth_entry.auth
        {
            tracing::debug!("Found credentials in auths for {}", registry);
            return self.decode_auth(auth_b64, registry);
        }

        tracing::debug!("No credentials found for {}", registry);
        Ok(None)
    }

    /// Docker config.json を読み込み
    fn load_docker_config(&self) -> Result<DockerConfig> {
        let content =
            std::fs::read_to_string(&self.config_path).map_err(|e| BuildError::AuthFailed {
                registry: self.config_path.display().to_string(),
                message: format!("Failed to read config.json: {}", e),
            })?;

        serde_json::from_str(&content).map_err(|e| BuildError::AuthFailed {
            registry: self.config_path.display().to_string(),
            message: format!("Failed to parse config.json: {}", e),
        })
    }

    /// Base64エンコードされた認証情報をデコード
    fn decode_auth(&self, auth_b64: &str, registry: &str) -> Result<Option<RegistryCredentials>> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(auth_b64)
            .map_err(|e| BuildError::AuthFailed {
                registry: registry.to_string(),
                message: format!("Failed to decode auth: {}", e),
            })?;

        let auth_str = String::from_utf8(decoded).map_err(|e| BuildError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Invalid UTF-8 in auth: {}", e),
        })?;

        Ok(auth_str
            .split_once(':')
            .map(|(username, password)| RegistryCredentials {
                username: username.to_string(),
                password: password.to_string(),
            }))
    }
}
