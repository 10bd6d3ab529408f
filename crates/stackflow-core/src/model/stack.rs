//! Stack定義

use super::endpoint::Endpoint;
use super::service::Service;
use crate::error::ValidationError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Stack - 複数サービスからなるアプリケーションの宣言
///
/// サービスとエンドポイントは名前順の `BTreeMap` で保持するため、
/// 走査順は常に辞書順になる。出力やエラーメッセージの順序はこれに従う。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Stack {
    /// スタック名。未指定ならマニフェストのディレクトリ名から導出
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
    /// エンドポイントグループ名 → ルーティングルール
    #[serde(default)]
    pub endpoints: BTreeMap<String, Vec<Endpoint>>,
    /// 読み込んだマニフェストのバイト列（設定オブジェクトに埋め込む）
    #[serde(skip)]
    pub manifest: Vec<u8>,
    /// マニフェストのあるディレクトリ（絶対パス）
    #[serde(skip)]
    pub dir: PathBuf,
}

impl Stack {
    /// 外部から指定された namespace を反映
    ///
    /// 空文字は無視する。マニフェスト側の namespace と食い違う場合はエラー。
    pub fn update_namespace(&mut self, namespace: &str) -> Result<(), ValidationError> {
        if namespace.is_empty() {
            return Ok(());
        }
        if let Some(current) = self.namespace.as_deref()
            && !current.is_empty()
            && current != namespace
        {
            return Err(ValidationError::NamespaceMismatch {
                manifest: current.to_string(),
                requested: namespace.to_string(),
            });
        }
        self.namespace = Some(namespace.to_string());
        Ok(())
    }

    /// 設定オブジェクトの名前
    pub fn config_map_name(&self) -> String {
        format!("okteto-{}", self.name)
    }

    /// build 設定を持つサービスがあるか
    pub fn has_builds(&self) -> bool {
        self.services.values().any(|svc| svc.build.is_some())
    }
}
