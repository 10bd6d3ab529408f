use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// サービス単位のビルド進捗表示
pub struct BuildProgress {
    progress_bar: ProgressBar,
}

impl BuildProgress {
    pub fn new(service_name: &str) -> Self {
        let progress = Self::with_bar(ProgressBar::new_spinner(), service_name);
        // ビルド出力を待つ間も回し続ける
        progress.progress_bar.enable_steady_tick(TICK_INTERVAL);
        progress
    }

    /// 何も描画しない進捗表示
    pub fn hidden(service_name: &str) -> Self {
        Self::with_bar(ProgressBar::hidden(), service_name)
    }

    fn with_bar(pb: ProgressBar, service_name: &str) -> Self {
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(format!("Building {}...", service_name));

        Self { progress_bar: pb }
    }

    pub fn message(&self) -> String {
        self.progress_bar.message()
    }

    pub fn set_message(&self, msg: &str) {
        self.progress_bar.set_message(msg.to_string());
    }

    pub fn finish_success(&self) {
        self.progress_bar.finish_with_message("Build completed ✓");
    }

    pub fn finish_reused(&self, image: &str) {
        self.progress_bar
            .finish_with_message(format!("Using existing image {}", image));
    }

    pub fn finish_error(&self, error: &str) {
        self.progress_bar
            .finish_with_message(format!("Build failed: {}", error));
    }
}
