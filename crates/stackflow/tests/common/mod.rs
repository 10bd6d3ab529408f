use stackflow::{BuildOrchestrator, BuildTarget, InMemoryRegistry, RecordingExecutor};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const MANIFEST: &str = "okteto-stack.yml";

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        init_tracing();
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_manifest(&self, content: &str) -> PathBuf {
        let path = self.manifest_path();
        fs::write(&path, content).unwrap();
        path
    }

    #[allow(dead_code)]
    pub fn write_file(&self, name: &str, content: &str) {
        fs::write(self.root.path().join(name), content).unwrap();
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.path().join(MANIFEST)
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// 管理外のビルドキットを使うオーケストレーター
pub fn orchestrator(
    registry: Arc<InMemoryRegistry>,
    executor: Arc<RecordingExecutor>,
) -> BuildOrchestrator {
    BuildOrchestrator::new(
        BuildTarget::unmanaged("tcp://buildkit:1234"),
        registry,
        executor,
    )
}
