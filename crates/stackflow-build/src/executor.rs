//! イメージビルドの実行
//!
//! 実際のビルドエンジンは外部にあり、ここではビルド要求を組み立てて渡すだけ。

use crate::registry::lock;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::process::Command;

/// ビルドログの出力形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// 端末向けの進捗表示
    Tty,
    /// ログ向けのプレーン出力
    #[default]
    Plain,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::Tty => "tty",
            OutputMode::Plain => "plain",
        }
    }
}

/// 1サービス分のビルド要求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub namespace: String,
    pub buildkit_host: String,
    pub managed: bool,
    pub context: PathBuf,
    pub dockerfile: PathBuf,
    pub image: String,
    pub target: Option<String>,
    pub no_cache: bool,
    pub cache_from: Vec<String>,
    /// `KEY=VALUE` 形式、名前順
    pub build_args: Vec<String>,
    pub output: OutputMode,
}

/// ビルドエンジンの呼び出し
#[async_trait]
pub trait BuildExecutor: Send + Sync {
    /// イメージをビルドしてレジストリへ送る。失敗時は理由を返す
    async fn build(&self, request: &BuildRequest) -> Result<(), String>;
}

/// `docker buildx build --push` によるビルド
///
/// ビルドキットのアドレスごとに remote ドライバーのビルダーを用意し、
/// `--builder` で指定して実行する。
#[derive(Debug, Clone)]
pub struct BuildxExecutor {
    docker: PathBuf,
}

impl Default for BuildxExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildxExecutor {
    pub fn new() -> Self {
        Self {
            docker: PathBuf::from("docker"),
        }
    }

    /// docker コマンドのパスを指定
    pub fn with_docker(docker: impl Into<PathBuf>) -> Self {
        Self {
            docker: docker.into(),
        }
    }

    /// ビルドキットのアドレスに対応するビルダー名
    ///
    /// `tcp://buildkit:1234` -> `stackflow-tcp-buildkit-1234`
    pub fn builder_name(buildkit_host: &str) -> String {
        let mut name = String::from("stackflow-");
        let mut last_dash = true;
        for c in buildkit_host.chars() {
            if c.is_ascii_alphanumeric() {
                name.push(c.to_ascii_lowercase());
                last_dash = false;
            } else if !last_dash {
                name.push('-');
                last_dash = true;
            }
        }
        name.trim_end_matches('-').to_string()
    }

    /// ビルダーを作成する引数
    pub fn create_builder_args(buildkit_host: &str) -> Vec<String> {
        vec![
            "buildx".to_string(),
            "create".to_string(),
            "--name".to_string(),
            Self::builder_name(buildkit_host),
            "--driver".to_string(),
            "remote".to_string(),
            buildkit_host.to_string(),
        ]
    }

    /// buildx に渡す引数
    pub fn command_args(request: &BuildRequest) -> Vec<String> {
        let mut args = vec![
            "buildx".to_string(),
            "build".to_string(),
            "--builder".to_string(),
            Self::builder_name(&request.buildkit_host),
            "--push".to_string(),
            "--progress".to_string(),
            request.output.as_str().to_string(),
            "--file".to_string(),
            request.dockerfile.display().to_string(),
            "--tag".to_string(),
            request.image.clone(),
        ];
        if let Some(target) = &request.target {
            args.push("--target".to_string());
            args.push(target.clone());
        }
        if request.no_cache {
            args.push("--no-cache".to_string());
        }
        for cache in &request.cache_from {
            args.push("--cache-from".to_string());
            args.push(cache.clone());
        }
        for build_arg in &request.build_args {
            args.push("--build-arg".to_string());
            args.push(build_arg.clone());
        }
        args.push(request.context.display().to_string());
        args
    }

    fn command(&self, args: Vec<String>) -> Command {
        let mut command = Command::new(&self.docker);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);
        command
    }

    /// ビルダーがなければ作成
    async fn ensure_builder(&self, buildkit_host: &str) -> Result<(), String> {
        let name = Self::builder_name(buildkit_host);
        let inspect = self
            .command(vec!["buildx".to_string(), "inspect".to_string(), name.clone()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| format!("failed to run {}: {e}", self.docker.display()))?;
        if inspect.success() {
            return Ok(());
        }

        tracing::info!(builder = %name, host = %buildkit_host, "Creating buildx builder");
        let output = self
            .command(Self::create_builder_args(buildkit_host))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {e}", self.docker.display()))?;
        if !output.status.success() {
            return Err(format!(
                "failed to create builder '{name}': {} ({})",
                output.status,
                last_line(&output.stderr)
            ));
        }
        Ok(())
    }
}

fn last_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("no output")
        .to_string()
}

#[async_trait]
impl BuildExecutor for BuildxExecutor {
    async fn build(&self, request: &BuildRequest) -> Result<(), String> {
        self.ensure_builder(&request.buildkit_host).await?;
        tracing::info!("Building image: {}", request.image);

        let mut command = self.command(Self::command_args(request));
        match request.output {
            OutputMode::Tty => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            OutputMode::Plain => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        let output = command
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {e}", self.docker.display()))?;

        if !output.status.success() {
            return Err(format!("{} ({})", output.status, last_line(&output.stderr)));
        }

        tracing::info!("Successfully built: {}", request.image);
        Ok(())
    }
}

/// 要求を記録するだけのビルドエンジン
///
/// イメージ名ごとに失敗を仕込んだり、キャンセルの確認のためにビルドを
/// 終わらせないようにできる。
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    requests: Mutex<Vec<BuildRequest>>,
    failures: HashMap<String, String>,
    block: bool,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定イメージのビルドを失敗させる
    pub fn fail_on(mut self, image: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(image.into(), message.into());
        self
    }

    /// ビルドを完了させない
    pub fn blocking(mut self) -> Self {
        self.block = true;
        self
    }

    /// 受け取った要求（順番通り）
    pub fn requests(&self) -> Vec<BuildRequest> {
        lock(&self.requests).clone()
    }

    /// ビルドしたイメージ名（順番通り）
    pub fn built_images(&self) -> Vec<String> {
        lock(&self.requests)
            .iter()
            .map(|r| r.image.clone())
            .collect()
    }
}

#[async_trait]
impl BuildExecutor for RecordingExecutor {
    async fn build(&self, request: &BuildRequest) -> Result<(), String> {
        lock(&self.requests).push(request.clone());

        if self.block {
            std::future::pending::<()>().await;
        }
        match self.failures.get(&request.image) {
            Some(message) => Err(message.clone()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BuildRequest {
        BuildRequest {
            namespace: "team-a".to_string(),
            buildkit_host: "tcp://buildkit:1234".to_string(),
            managed: false,
            context: PathBuf::from("/work/api"),
            dockerfile: PathBuf::from("/work/api/Dockerfile"),
            image: "registry.local/api:1".to_string(),
            target: None,
            no_cache: false,
            cache_from: Vec::new(),
            build_args: Vec::new(),
            output: OutputMode::Plain,
        }
    }

    #[test]
    fn test_command_args_minimal() {
        assert_eq!(
            BuildxExecutor::command_args(&request()),
            vec![
                "buildx",
                "build",
                "--builder",
                "stackflow-tcp-buildkit-1234",
                "--push",
                "--progress",
                "plain",
                "--file",
                "/work/api/Dockerfile",
                "--tag",
                "registry.local/api:1",
                "/work/api",
            ]
        );
    }

    #[test]
    fn test_command_args_full() {
        let mut req = request();
        req.target = Some("release".to_string());
        req.no_cache = true;
        req.cache_from = vec!["registry.local/api:cache".to_string()];
        req.build_args = vec!["A=1".to_string(), "B=2".to_string()];
        req.output = OutputMode::Tty;

        let args = BuildxExecutor::command_args(&req);
        let joined = args.join(" ");
        assert!(joined.contains("--builder stackflow-tcp-buildkit-1234"));
        assert!(joined.contains("--progress tty"));
        assert!(joined.contains("--target release"));
        assert!(joined.contains("--no-cache"));
        assert!(joined.contains("--cache-from registry.local/api:cache"));
        assert!(joined.contains("--build-arg A=1 --build-arg B=2"));
        assert_eq!(args.last().map(String::as_str), Some("/work/api"));
    }

    #[test]
    fn test_builder_follows_buildkit_host() {
        assert_eq!(
            BuildxExecutor::builder_name("tcp://buildkit.example.com:1234"),
            "stackflow-tcp-buildkit-example-com-1234"
        );
        assert_ne!(
            BuildxExecutor::builder_name("tcp://a:1234"),
            BuildxExecutor::builder_name("tcp://b:1234")
        );
        assert_eq!(
            BuildxExecutor::create_builder_args("tcp://buildkit:1234"),
            vec![
                "buildx",
                "create",
                "--name",
                "stackflow-tcp-buildkit-1234",
                "--driver",
                "remote",
                "tcp://buildkit:1234",
            ]
        );
    }

    #[tokio::test]
    async fn test_buildx_missing_binary() {
        let executor = BuildxExecutor::with_docker("/nonexistent/docker");
        let err = executor.build(&request()).await.unwrap_err();
        assert!(err.starts_with("failed to run /nonexistent/docker"), "{err}");
    }

    #[tokio::test]
    async fn test_recording_executor() {
        let executor = RecordingExecutor::new().fail_on("bad:1", "exit status 1");

        executor.build(&request()).await.unwrap();
        let mut bad = request();
        bad.image = "bad:1".to_string();
        assert_eq!(executor.build(&bad).await.unwrap_err(), "exit status 1");

        assert_eq!(executor.built_images(), vec!["registry.local/api:1", "bad:1"]);
        assert_eq!(executor.requests()[0], request());
    }
}
