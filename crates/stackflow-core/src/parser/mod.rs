//! スタックマニフェストのパーサー
//!
//! YAMLのマニフェストをパースし、デフォルト値を適用した `Stack` を生成します。
//! 未知フィールドは最初の1件で止めず、すべてまとめて報告します。

mod defaults;
mod schema;

use crate::error::{Result, SchemaError, StackError};
use crate::model::Stack;
use crate::naming::normalize_name;
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

/// マニフェストのバイト列をパースしてデフォルトを適用
///
/// 名前の解決とパスの絶対化は行わない（[`load_stack`] を参照）。
pub fn read_stack(bytes: &[u8]) -> Result<Stack> {
    let content = std::str::from_utf8(bytes)
        .map_err(|e| SchemaError::single(format!("manifest is not valid UTF-8: {e}")))?;

    let tree: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| SchemaError::single(e.to_string()))?;

    let violations = schema::unknown_fields(&tree);
    if !violations.is_empty() {
        debug!(count = violations.len(), "Unknown fields in stack manifest");
        return Err(SchemaError::new(violations).into());
    }

    let mut stack: Stack = if tree.is_null() {
        Stack::default()
    } else {
        serde_yaml::from_str(content).map_err(|e| SchemaError::single(e.to_string()))?
    };
    stack.manifest = bytes.to_vec();
    stack.apply_defaults();

    Ok(stack)
}

/// マニフェストを読み込み、名前とビルドパスを解決する
///
/// 名前の優先順位:
/// 1. 呼び出し側の指定（空でなければ無条件に上書き）
/// 2. マニフェストの `name`
/// 3. マニフェストのあるディレクトリ名を正規化したもの
#[instrument(skip(bytes), fields(manifest = %manifest_path.display()))]
pub fn load_stack(bytes: &[u8], manifest_path: &Path, name: Option<&str>) -> Result<Stack> {
    let mut stack = read_stack(bytes)?;

    let parent = manifest_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let stack_dir = std::path::absolute(parent)
        .map(|dir| defaults::clean_path(&dir))
        .map_err(|e| StackError::Io {
            path: parent.to_path_buf(),
            message: e.to_string(),
        })?;

    if let Some(name) = name.filter(|n| !n.is_empty()) {
        stack.name = name.to_string();
    }
    if stack.name.is_empty() {
        let folder = stack_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        stack.name = normalize_name(folder);
        info!(name = %stack.name, "Derived stack name from directory");
    }

    stack.resolve_build_paths(&stack_dir);
    stack.dir = stack_dir;

    info!(
        name = %stack.name,
        services = stack.services.len(),
        endpoints = stack.endpoints.len(),
        "Stack manifest loaded"
    );
    Ok(stack)
}

/// ファイルからマニフェストを読み込む
pub fn load_stack_file<P: AsRef<Path>>(path: P, name: Option<&str>) -> Result<Stack> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| StackError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    load_stack(&bytes, path, name)
}
