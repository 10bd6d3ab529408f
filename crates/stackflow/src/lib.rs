//! StackFlow - スタックマニフェストコンパイラ
//!
//! マニフェストを読み込み、検証し、環境変数を解決し、必要なイメージをビルドして、
//! クラスタに送るリソース仕様の列を生成する。
//!
//! ```no_run
//! use stackflow::{CancelToken, CompileOptions, compile_file, default_orchestrator, load_settings};
//!
//! # async fn run() -> stackflow::Result<()> {
//! let settings = load_settings()?;
//! let orchestrator = default_orchestrator(&settings)?;
//! let options = CompileOptions::default();
//! let compiled = compile_file("okteto-stack.yml", &options, &orchestrator, &CancelToken::new()).await?;
//! println!("{}", compiled.render()?);
//! # Ok(())
//! # }
//! ```

mod error;

pub use error::{CompileError, Result};

pub use stackflow_build::{
    BuildExecutor, BuildOptions, BuildOrchestrator, BuildReport, BuildRequest, BuildxExecutor,
    CancelToken, HttpRegistry, ImageDigest, InMemoryRegistry, OutputMode, RecordingExecutor,
    RegistryLookup,
};
pub use stackflow_config::{BuildTarget, Settings, load_settings, resolve_build_target};
pub use stackflow_core::Stack;
pub use stackflow_translate::{Resource, render_yaml};

use stackflow_core::{StackError, load_stack};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

/// コンパイルオプション
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// スタック名の上書き（空文字は無視）
    pub name: Option<String>,
    /// 外部から指定する namespace
    pub namespace: Option<String>,
    pub force_build: bool,
    pub no_cache: bool,
    pub output: OutputMode,
}

impl CompileOptions {
    fn build_options(&self) -> BuildOptions {
        BuildOptions {
            force_build: self.force_build,
            no_cache: self.no_cache,
            output: self.output,
        }
    }
}

/// コンパイル結果
#[derive(Debug, Clone)]
pub struct Compiled {
    /// ビルド後のスタック（イメージ名とビルド時刻が反映済み）
    pub stack: Stack,
    pub resources: Vec<Resource>,
    pub report: BuildReport,
}

impl Compiled {
    /// リソースを複数ドキュメントの YAML として出力
    pub fn render(&self) -> Result<String> {
        Ok(render_yaml(&self.resources)?)
    }
}

/// 設定から実際のレジストリとビルドエンジンを使うオーケストレーターを作る
pub fn default_orchestrator(settings: &Settings) -> Result<BuildOrchestrator> {
    let target = resolve_build_target(settings)?;
    Ok(BuildOrchestrator::new(
        target,
        Arc::new(HttpRegistry::new(settings)),
        Arc::new(BuildxExecutor::new()),
    ))
}

/// マニフェストをリソース仕様にコンパイル
///
/// 解析、検証、namespace の反映、環境変数の解決、イメージのビルド、変換の順に実行し、
/// 最初のエラーで中断する。
#[instrument(skip_all, fields(manifest = %manifest_path.display()))]
pub async fn compile(
    bytes: &[u8],
    manifest_path: &Path,
    options: &CompileOptions,
    orchestrator: &BuildOrchestrator,
    cancel: &CancelToken,
) -> Result<Compiled> {
    let mut stack = load_stack(bytes, manifest_path, options.name.as_deref())?;
    stack.validate()?;
    if let Some(namespace) = &options.namespace {
        stack.update_namespace(namespace)?;
    }
    stack.resolve_environment()?;

    let report = orchestrator
        .run(&mut stack, &options.build_options(), cancel)
        .await?;

    let resources = stackflow_translate::translate(&stack);
    info!(
        stack = %stack.name,
        resources = resources.len(),
        built = report.built.len(),
        reused = report.reused.len(),
        "Compiled stack"
    );

    Ok(Compiled {
        stack,
        resources,
        report,
    })
}

/// マニフェストファイルを読み込んでコンパイル
pub async fn compile_file<P: AsRef<Path>>(
    path: P,
    options: &CompileOptions,
    orchestrator: &BuildOrchestrator,
    cancel: &CancelToken,
) -> Result<Compiled> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| StackError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    compile(&bytes, path, options, orchestrator, cancel).await
}
