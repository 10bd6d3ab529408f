//! イメージ参照の分解

/// Docker Hub のデフォルトレジストリ
pub const DOCKER_HUB: &str = "docker.io";

/// `registry/repository:tag` に分解したイメージ参照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub registry: String,
    pub repository: String,
    /// タグまたは `sha256:...` ダイジェスト
    pub reference: String,
}

impl ImageRef {
    /// イメージ名を分解
    ///
    /// # Examples
    /// - `ghcr.io/org/app:v1.0` -> (`ghcr.io`, `org/app`, `v1.0`)
    /// - `nginx` -> (`docker.io`, `library/nginx`, `latest`)
    /// - `localhost:5000/app` -> (`localhost:5000`, `app`, `latest`)
    /// - `app@sha256:abc` -> (`docker.io`, `library/app`, `sha256:abc`)
    pub fn parse(image: &str) -> Self {
        let registry = extract_registry(image);
        let remainder = image
            .strip_prefix(registry.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(image);

        let (name, reference) = match remainder.split_once('@') {
            Some((name, digest)) => (name.to_string(), digest.to_string()),
            None => split_image_tag(remainder),
        };

        let repository = if registry == DOCKER_HUB && !name.contains('/') {
            format!("library/{name}")
        } else {
            name
        };

        Self {
            registry,
            repository,
            reference,
        }
    }

    /// レジストリ API のホスト名
    pub fn api_host(&self) -> &str {
        if self.registry == DOCKER_HUB {
            "registry-1.docker.io"
        } else {
            &self.registry
        }
    }
}

/// イメージ名からレジストリを抽出
///
/// 先頭要素が `.` か `:` を含むか `localhost` ならレジストリ、そうでなければ Docker Hub
pub fn extract_registry(image: &str) -> String {
    if let Some((first, _)) = image.split_once('/')
        && (first.contains('.') || first.contains(':') || first == "localhost")
    {
        return first.to_string();
    }

    DOCKER_HUB.to_string()
}

/// イメージ名とタグを分割
///
/// タグがなければ `latest`。レジストリのポート番号はタグとみなさない。
pub fn split_image_tag(image: &str) -> (String, String) {
    // 最後の : を探す
    if let Some(pos) = image.rfind(':') {
        let potential_tag = &image[pos + 1..];
        let potential_image = &image[..pos];

        // ポート番号の場合: localhost:5000/app (タグなし)
        if !potential_tag.contains('/') {
            return (potential_image.to_string(), potential_tag.to_string());
        }
    }

    (image.to_string(), "latest".to_string())
}
