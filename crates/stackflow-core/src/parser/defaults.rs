//! デフォルト値の適用とパス解決
//!
//! どちらの処理も冪等で、適用済みのモデルに再度かけても変化しない。

use crate::model::{BuildSpec, Service, Stack};
use std::path::{Component, Path, PathBuf};

impl Stack {
    /// 全サービスにデフォルト値を適用
    pub fn apply_defaults(&mut self) {
        for service in self.services.values_mut() {
            service.apply_defaults();
        }
    }

    /// ビルドコンテキストと Dockerfile をマニフェストのディレクトリ基準の絶対パスにする
    pub fn resolve_build_paths(&mut self, stack_dir: &Path) {
        for service in self.services.values_mut() {
            if let Some(build) = service.build.as_mut() {
                build.context = absolute_from(stack_dir, &build.context);
                build.dockerfile = absolute_from(stack_dir, &build.dockerfile);
            }
        }
    }
}

impl Service {
    /// サービス単位のデフォルト適用
    ///
    /// `entrypoint` があれば、それまでの `command` が `args` に、`entrypoint` が
    /// `command` になる。元の `args` は失われる。
    pub fn apply_defaults(&mut self) {
        if let Some(build) = self.build.as_mut() {
            build.apply_defaults();
        }
        if self.replicas == 0 {
            self.replicas = 1;
        }
        if !self.entrypoint.is_empty() {
            self.args = std::mem::take(&mut self.command);
            self.command = std::mem::take(&mut self.entrypoint);
        }
        if !self.expose.is_empty() && self.ports.is_empty() {
            self.public = false;
        }
        let exposed = std::mem::take(&mut self.expose);
        self.ports.extend(exposed);
    }
}

impl BuildSpec {
    pub fn apply_defaults(&mut self) {
        if !self.name.is_empty() {
            self.context = PathBuf::from(std::mem::take(&mut self.name));
        }
        if self.context.as_os_str().is_empty() {
            self.context = PathBuf::from(".");
        }
        if self.dockerfile.as_os_str().is_empty() {
            self.dockerfile = self.context.join("Dockerfile");
        }
    }
}

/// 相対パスなら `base` と結合し、`.` と `..` を字句的に畳む
pub(crate) fn absolute_from(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    clean_path(&joined)
}

/// `.` と `..` を取り除く（ファイルシステムは参照しない）
pub(super) fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}
