//! ビルドオーケストレーション
//!
//! build 設定を持つサービスについて、イメージ名を決め、レジストリに存在すれば
//! 再利用し、なければビルドする。ビルドは名前順に1つずつ実行する。

use crate::cancel::CancelToken;
use crate::error::{BuildError, Result};
use crate::executor::{BuildExecutor, BuildRequest, OutputMode};
use crate::progress::BuildProgress;
use crate::registry::RegistryLookup;
use chrono::Utc;
use stackflow_config::BuildTarget;
use stackflow_core::{BuildSpec, Stack};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 名前に含まれていたら警告するビルド引数のパターン
const SENSITIVE_ARG_PATTERNS: [&str; 5] = ["password", "token", "secret", "api_key", "private_key"];

/// ビルドオプション
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// レジストリを確認せずに常にビルドする
    pub force_build: bool,
    pub no_cache: bool,
    pub output: OutputMode,
}

/// ビルド結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// ビルドしたサービス（名前順）
    pub built: Vec<String>,
    /// 既存イメージを再利用したサービス（名前順）
    pub reused: Vec<String>,
    /// build 設定がないため force_build が無視された
    pub force_build_ignored: bool,
}

pub struct BuildOrchestrator {
    target: BuildTarget,
    registry: Arc<dyn RegistryLookup>,
    executor: Arc<dyn BuildExecutor>,
}

impl BuildOrchestrator {
    pub fn new(
        target: BuildTarget,
        registry: Arc<dyn RegistryLookup>,
        executor: Arc<dyn BuildExecutor>,
    ) -> Self {
        Self {
            target,
            registry,
            executor,
        }
    }

    pub fn target(&self) -> &BuildTarget {
        &self.target
    }

    /// スタックのイメージをビルド
    ///
    /// イメージ名の書き換えとビルド時刻の記録でスタックを更新する。
    /// キャンセルされると、それ以降のサービスには手を付けず `BuildError::Cancelled` を返す。
    #[instrument(skip_all, fields(stack = %stack.name))]
    pub async fn run(
        &self,
        stack: &mut Stack,
        options: &BuildOptions,
        cancel: &CancelToken,
    ) -> Result<BuildReport> {
        let mut report = BuildReport::default();

        if options.force_build && !stack.has_builds() {
            warn!("Ignoring force build: no service has a 'build' section");
            report.force_build_ignored = true;
            return Ok(report);
        }

        let namespace = stack.namespace.clone().unwrap_or_default();
        let stack_name = stack.name.clone();

        for (name, service) in stack.services.iter_mut() {
            let Some(build) = service.build.clone() else {
                continue;
            };
            if cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }

            if !self.target.managed && service.image.is_empty() {
                return Err(BuildError::Configuration {
                    service: name.clone(),
                    message: "'build' and 'image' fields cannot both be empty".to_string(),
                });
            }
            if self.target.managed && !self.target.is_managed_image(&service.image) {
                service.image = format!(
                    "{}/{}-{}:okteto",
                    self.target.registry_prefix, stack_name, name
                );
                debug!(service = %name, image = %service.image, "Using managed registry image");
            }

            let progress = match options.output {
                OutputMode::Tty => BuildProgress::new(name),
                OutputMode::Plain => BuildProgress::hidden(name),
            };

            if !options.force_build {
                progress.set_message(&format!("Checking registry for {}", service.image));
                let found = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(BuildError::Cancelled),
                    found = self.registry.lookup(&namespace, &service.image) => found?,
                };
                if let Some(digest) = found {
                    info!(service = %name, image = %service.image, digest = %digest.as_str(), "Image already exists, skipping build");
                    progress.finish_reused(&service.image);
                    report.reused.push(name.clone());
                    continue;
                }
                info!("image '{}' not found, building it", service.image);
            }

            warn_sensitive_args(&build);
            let request = BuildRequest {
                namespace: namespace.clone(),
                buildkit_host: self.target.host.clone(),
                managed: self.target.managed,
                context: build.context.clone(),
                dockerfile: build.dockerfile.clone(),
                image: service.image.clone(),
                target: build.target.clone(),
                no_cache: options.no_cache,
                cache_from: build.cache_from.clone(),
                build_args: build.serialized_args(),
                output: options.output,
            };

            progress.set_message(&format!("Building {}...", service.image));
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BuildError::Cancelled),
                result = self.executor.build(&request) => result,
            };
            if let Err(message) = result {
                progress.finish_error(&message);
                return Err(BuildError::Failed {
                    service: name.clone(),
                    message,
                });
            }

            service.mark_built(Utc::now());
            progress.finish_success();
            info!(service = %name, image = %service.image, "Image built");
            report.built.push(name.clone());
        }

        Ok(report)
    }
}

/// ビルド引数の検証（機密情報の警告）
///
/// ビルド引数はイメージ履歴に残るため、機密情報らしい名前なら警告する。値は出力しない。
fn warn_sensitive_args(build: &BuildSpec) {
    for key in build.args.keys() {
        if is_sensitive_arg(key) {
            warn!(
                "警告: ビルド引数 '{}' は機密情報を含む可能性があります。\n\
                 ビルド引数はイメージ履歴に記録されます。\n\
                 機密情報はビルド引数ではなく、シークレットマウントを使用してください。",
                key
            );
        }
    }
}

fn is_sensitive_arg(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    SENSITIVE_ARG_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}
