//! イメージレジストリへの問い合わせ
//!
//! ビルド前にイメージがすでに存在するかを確認し、存在すればビルドを省略する。

use crate::auth::{RegistryAuth, RegistryCredentials};
use crate::error::{BuildError, Result};
use crate::image::ImageRef;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, WWW_AUTHENTICATE};
use serde::Deserialize;
use stackflow_config::Settings;
use std::collections::HashMap;
use std::sync::Mutex;

/// マニフェスト取得時に受け付けるメディアタイプ
const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, \
    application/vnd.docker.distribution.manifest.list.v2+json, \
    application/vnd.oci.image.manifest.v1+json, \
    application/vnd.oci.image.index.v1+json";

const DIGEST_HEADER: &str = "Docker-Content-Digest";

/// レジストリ上のイメージのダイジェスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDigest(pub String);

impl ImageDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// イメージの存在確認
#[async_trait]
pub trait RegistryLookup: Send + Sync {
    /// イメージのダイジェストを取得
    ///
    /// * `Ok(Some(digest))` - イメージが存在する
    /// * `Ok(None)` - イメージが存在しない
    /// * `Err(BuildError::Registry)` - 問い合わせ自体に失敗した
    async fn lookup(&self, namespace: &str, image: &str) -> Result<Option<ImageDigest>>;
}

/// Docker Registry HTTP API v2 によるイメージ確認
pub struct HttpRegistry {
    client: reqwest::Client,
    managed_prefix: String,
    managed_host: Option<String>,
    token: Option<String>,
    auth: RegistryAuth,
}

impl HttpRegistry {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: reqwest::Client::new(),
            managed_prefix: settings.managed_registry_prefix.clone(),
            managed_host: settings.managed_registry_host.clone(),
            token: settings.registry_token.clone(),
            auth: RegistryAuth::new(),
        }
    }

    /// HTTP クライアントを差し替える（プロキシやタイムアウトの設定用）
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Docker config.json の場所を差し替える
    pub fn with_auth(mut self, auth: RegistryAuth) -> Self {
        self.auth = auth;
        self
    }

    /// 管理プレフィックスのイメージを実際のレジストリ上の名前に展開
    ///
    /// `okteto.dev/api:1` -> `<managed_registry_host>/<namespace>/api:1`
    pub fn expand_image(&self, namespace: &str, image: &str) -> String {
        let Some(host) = self.managed_host.as_deref() else {
            return image.to_string();
        };
        let Some(rest) = image
            .strip_prefix(self.managed_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            return image.to_string();
        };

        if namespace.is_empty() {
            format!("{host}/{rest}")
        } else {
            format!("{host}/{namespace}/{rest}")
        }
    }

    /// マニフェスト API の URL
    pub fn manifest_url(image: &ImageRef) -> String {
        let host = image.api_host();
        let scheme = if is_local_registry(host) { "http" } else { "https" };
        format!(
            "{scheme}://{host}/v2/{}/manifests/{}",
            image.repository, image.reference
        )
    }
}

fn is_local_registry(host: &str) -> bool {
    let name = host.split(':').next().unwrap_or(host);
    name == "localhost" || name == "127.0.0.1"
}

/// `WWW-Authenticate: Bearer ...` のチャレンジ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

impl BearerChallenge {
    /// `Bearer realm="...",service="...",scope="..."` を解析。Bearer 以外は `None`
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for (key, value) in split_auth_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }

        Some(Self {
            realm: realm?,
            service,
            scope,
        })
    }
}

/// `key="value",key=value` をクォート内のカンマを無視して分割
fn split_auth_params(params: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut quoted = false;

    for c in params.chars() {
        match c {
            '"' if in_value => quoted = !quoted,
            ',' if !quoted => {
                if in_value {
                    pairs.push((key.trim().to_string(), std::mem::take(&mut value)));
                }
                key.clear();
                in_value = false;
            }
            '=' if !in_value => in_value = true,
            c if in_value => value.push(c),
            c => key.push(c),
        }
    }
    if in_value {
        pairs.push((key.trim().to_string(), value));
    }
    pairs
}

/// トークンエンドポイントの応答（`token` と `access_token` のどちらも使われる）
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl HttpRegistry {
    /// チャレンジに従ってトークンを取得
    async fn fetch_token(
        &self,
        image: &str,
        image_ref: &ImageRef,
        challenge: &BearerChallenge,
        creds: Option<&RegistryCredentials>,
    ) -> Result<String> {
        let registry_error = |message: String| BuildError::Registry {
            image: image.to_string(),
            message,
        };

        let scope = challenge
            .scope
            .clone()
            .unwrap_or_else(|| format!("repository:{}:pull", image_ref.repository));
        let mut query = vec![("scope", scope)];
        if let Some(service) = &challenge.service {
            query.push(("service", service.clone()));
        }

        let mut request = self.client.get(&challenge.realm).query(&query);
        if let Some(creds) = creds {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| registry_error(format!("token request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(registry_error(format!(
                "token request failed with status {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| registry_error(format!("invalid token response: {e}")))?;
        body.token
            .or(body.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| registry_error("token response has no token".to_string()))
    }
}

#[async_trait]
impl RegistryLookup for HttpRegistry {
    async fn lookup(&self, namespace: &str, image: &str) -> Result<Option<ImageDigest>> {
        let expanded = self.expand_image(namespace, image);
        let managed = expanded != image;
        let image_ref = ImageRef::parse(&expanded);
        let url = Self::manifest_url(&image_ref);
        tracing::debug!(image = %image, url = %url, "Checking registry for image");

        let creds = if managed {
            None
        } else {
            self.auth.get_credentials(&image_ref.registry)?
        };
        let send_error = |e: reqwest::Error| BuildError::Registry {
            image: image.to_string(),
            message: e.to_string(),
        };

        let mut request = self.client.head(&url).header(ACCEPT, MANIFEST_ACCEPT);
        if managed && let Some(token) = &self.token {
            request = request.bearer_auth(token);
        } else if let Some(creds) = &creds {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        let mut response = request.send().await.map_err(send_error)?;

        // 匿名アクセスでもトークンを要求するレジストリに対応（1回だけ再試行）
        if response.status() == StatusCode::UNAUTHORIZED
            && let Some(challenge) = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .and_then(BearerChallenge::parse)
        {
            tracing::debug!(image = %image, realm = %challenge.realm, "Requesting registry token");
            let token = self
                .fetch_token(image, &image_ref, &challenge, creds.as_ref())
                .await?;
            response = self
                .client
                .head(&url)
                .header(ACCEPT, MANIFEST_ACCEPT)
                .bearer_auth(token)
                .send()
                .await
                .map_err(send_error)?;
        }

        match response.status() {
            status if status.is_success() => {
                let digest = response
                    .headers()
                    .get(DIGEST_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Ok(Some(ImageDigest(digest)))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(BuildError::Registry {
                image: image.to_string(),
                message: format!("unexpected response status {status}"),
            }),
        }
    }
}

/// メモリ上のレジストリ
///
/// 登録したイメージだけが存在する。問い合わせは記録される。
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    images: Mutex<HashMap<String, ImageDigest>>,
    failures: Mutex<HashMap<String, String>>,
    lookups: Mutex<Vec<String>>,
    block: bool,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// イメージを登録
    pub fn with_image(self, image: impl Into<String>, digest: impl Into<String>) -> Self {
        self.push(image, digest);
        self
    }

    /// 問い合わせ失敗を仕込む
    pub fn fail_on(self, image: impl Into<String>, message: impl Into<String>) -> Self {
        lock(&self.failures).insert(image.into(), message.into());
        self
    }

    /// 問い合わせを完了させない
    pub fn blocking(mut self) -> Self {
        self.block = true;
        self
    }

    pub fn push(&self, image: impl Into<String>, digest: impl Into<String>) {
        lock(&self.images).insert(image.into(), ImageDigest(digest.into()));
    }

    /// これまでに問い合わせたイメージ（順番通り）
    pub fn lookups(&self) -> Vec<String> {
        lock(&self.lookups).clone()
    }
}

#[async_trait]
impl RegistryLookup for InMemoryRegistry {
    async fn lookup(&self, _namespace: &str, image: &str) -> Result<Option<ImageDigest>> {
        lock(&self.lookups).push(image.to_string());

        if self.block {
            std::future::pending::<()>().await;
        }
        if let Some(message) = lock(&self.failures).get(image) {
            return Err(BuildError::Registry {
                image: image.to_string(),
                message: message.clone(),
            });
        }
        Ok(lock(&self.images).get(image).cloned())
    }
}

/// ポイズンしていても中身を使う
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn managed_settings() -> Settings {
        Settings {
            managed_registry_host: Some("registry.cloud.example.com".to_string()),
            registry_token: Some("token".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_expand_managed_image() {
        let registry = HttpRegistry::new(&managed_settings());

        assert_eq!(
            registry.expand_image("team-a", "okteto.dev/shop-api:okteto"),
            "registry.cloud.example.com/team-a/shop-api:okteto"
        );
        assert_eq!(
            registry.expand_image("", "okteto.dev/shop-api:okteto"),
            "registry.cloud.example.com/shop-api:okteto"
        );
        assert_eq!(registry.expand_image("team-a", "nginx:1"), "nginx:1");
    }

    #[test]
    fn test_expand_without_managed_host() {
        let registry = HttpRegistry::new(&Settings::default());
        assert_eq!(
            registry.expand_image("team-a", "okteto.dev/api:okteto"),
            "okteto.dev/api:okteto"
        );
    }

    #[test]
    fn test_manifest_url() {
        assert_eq!(
            HttpRegistry::manifest_url(&ImageRef::parse("ghcr.io/org/app:v1")),
            "https://ghcr.io/v2/org/app/manifests/v1"
        );
        assert_eq!(
            HttpRegistry::manifest_url(&ImageRef::parse("nginx")),
            "https://registry-1.docker.io/v2/library/nginx/manifests/latest"
        );
        assert_eq!(
            HttpRegistry::manifest_url(&ImageRef::parse("localhost:5000/app:dev")),
            "http://localhost:5000/v2/app/manifests/dev"
        );
    }

    #[test]
    fn test_parse_bearer_challenge() {
        let challenge = BearerChallenge::parse(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/nginx:pull,push""#,
        )
        .unwrap();
        assert_eq!(challenge.realm, "https://auth.docker.io/token");
        assert_eq!(challenge.service.as_deref(), Some("registry.docker.io"));
        assert_eq!(
            challenge.scope.as_deref(),
            Some("repository:library/nginx:pull,push")
        );

        let minimal = BearerChallenge::parse(r#"bearer realm="https://ghcr.io/token""#).unwrap();
        assert_eq!(minimal.service, None);
        assert_eq!(minimal.scope, None);

        assert_eq!(BearerChallenge::parse(r#"Basic realm="registry""#), None);
        assert_eq!(BearerChallenge::parse(r#"Bearer service="x""#), None);
    }

    /// トークン認証を要求する最小限のレジストリ
    ///
    /// 受け取ったリクエスト行を記録する。`/manifests/gone` は存在しない扱い。
    async fn spawn_token_registry(token: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = listener.local_addr().unwrap().to_string();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let realm = format!("http://{host}/token");
        let recorded = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let realm = realm.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&buf).to_string();
                    let request_line = head.lines().next().unwrap_or_default().to_string();
                    let authorized = head.lines().any(|line| {
                        line.to_ascii_lowercase() == format!("authorization: bearer {token}")
                    });
                    lock(&recorded).push(request_line.clone());

                    let response = if request_line.starts_with("GET /token") {
                        let body = format!(r#"{{"token":"{token}"}}"#);
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                            body.len()
                        )
                    } else if !authorized {
                        format!(
                            "HTTP/1.1 401 Unauthorized\r\nWWW-Authenticate: Bearer realm=\"{realm}\",service=\"registry.test\",scope=\"repository:app:pull\"\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        )
                    } else if request_line.contains("/manifests/gone") {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                            .to_string()
                    } else {
                        "HTTP/1.1 200 OK\r\nDocker-Content-Digest: sha256:feed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                            .to_string()
                    };
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (host, requests)
    }

    fn anonymous_registry(dir: &tempfile::TempDir) -> HttpRegistry {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        HttpRegistry::new(&Settings::default())
            .with_client(client)
            .with_auth(RegistryAuth::with_config_path(dir.path().join("config.json")))
    }

    #[tokio::test]
    async fn test_lookup_follows_bearer_challenge() {
        let (host, requests) = spawn_token_registry("abc123").await;
        let dir = tempfile::tempdir().unwrap();
        let registry = anonymous_registry(&dir);

        let digest = registry
            .lookup("team-a", &format!("{host}/app:dev"))
            .await
            .unwrap();
        assert_eq!(digest, Some(ImageDigest("sha256:feed".to_string())));

        let requests = lock(&requests).clone();
        assert_eq!(requests.len(), 3, "{requests:?}");
        assert!(requests[0].starts_with("HEAD /v2/app/manifests/dev "));
        assert!(requests[1].starts_with("GET /token?"));
        assert!(requests[1].contains("service=registry.test"));
        assert!(requests[1].contains("scope=repository%3Aapp%3Apull"));
        assert!(requests[2].starts_with("HEAD /v2/app/manifests/dev "));
    }

    #[tokio::test]
    async fn test_lookup_not_found_after_token() {
        let (host, _) = spawn_token_registry("abc123").await;
        let dir = tempfile::tempdir().unwrap();
        let registry = anonymous_registry(&dir);

        let digest = registry
            .lookup("team-a", &format!("{host}/app:gone"))
            .await
            .unwrap();
        assert_eq!(digest, None);
    }

    #[tokio::test]
    async fn test_in_memory_registry() {
        let registry = InMemoryRegistry::new()
            .with_image("api:1", "sha256:abc")
            .fail_on("broken:1", "connection refused");

        assert_eq!(
            registry.lookup("ns", "api:1").await.unwrap(),
            Some(ImageDigest("sha256:abc".to_string()))
        );
        assert_eq!(registry.lookup("ns", "web:1").await.unwrap(), None);

        let err = registry.lookup("ns", "broken:1").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Registry lookup failed for image 'broken:1': connection refused"
        );
        assert_eq!(registry.lookups(), vec!["api:1", "web:1", "broken:1"]);
    }
}
