//! サービス定義

use super::forms;
use super::resources::StackResources;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// `last_built_at` を注釈として書き出すときのフォーマット
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// サービス定義
///
/// YAML形式：
/// ```yaml
/// services:
///   api:
///     image: myapp:1.0.0
///     build: ./api
///     ports: [8080]
///     environment:
///       - NODE_ENV=production
///     volumes: [/data]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Service {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// 外部公開するか
    #[serde(default)]
    pub public: bool,
    /// イメージ参照。`build` がある場合のみ空を許す
    #[serde(default)]
    pub image: String,
    /// ビルド設定 (`build: ./dir` の省略形も可)
    #[serde(default, deserialize_with = "forms::build_spec")]
    pub build: Option<BuildSpec>,
    #[serde(default)]
    pub replicas: u32,
    #[serde(default, deserialize_with = "forms::command_line")]
    pub entrypoint: Vec<String>,
    #[serde(default, deserialize_with = "forms::command_line")]
    pub command: Vec<String>,
    #[serde(default, deserialize_with = "forms::command_line")]
    pub args: Vec<String>,
    /// 環境変数 (マップ形式または `KEY=VALUE` のリスト)
    #[serde(default, deserialize_with = "forms::environment")]
    pub environment: Vec<EnvVar>,
    /// 環境変数ファイル。解決後に空になる
    #[serde(
        default,
        rename = "env_file",
        deserialize_with = "forms::string_or_list"
    )]
    pub env_files: Vec<String>,
    #[serde(default)]
    pub cap_add: Vec<String>,
    #[serde(default)]
    pub cap_drop: Vec<String>,
    #[serde(default)]
    pub healthchecks: bool,
    #[serde(default)]
    pub ports: Vec<u16>,
    /// 内部公開ポート。デフォルト適用時に `ports` へ畳み込まれる
    #[serde(default)]
    pub expose: Vec<u16>,
    /// コンテナ内の絶対パス。1つでもあれば永続ストレージを持つ
    #[serde(default)]
    pub volumes: Vec<String>,
    /// 停止猶予（秒）。`30s` や `1m30s` の表記も可
    #[serde(default, deserialize_with = "forms::grace_period")]
    pub stop_grace_period: i64,
    #[serde(default)]
    pub resources: StackResources,
    /// 最後にビルドされた時刻。ビルドオーケストレータのみが設定する
    #[serde(skip)]
    pub last_built_at: Option<DateTime<Utc>>,
}

/// 環境変数
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// ビルド設定
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSpec {
    /// 旧形式のコンテキスト指定。デフォルト適用時に `context` へ移される
    #[serde(default)]
    pub name: String,
    /// ビルドコンテキスト（マニフェストのディレクトリからの相対パス）
    #[serde(default)]
    pub context: PathBuf,
    /// Dockerfileのパス。未指定なら `<context>/Dockerfile`
    #[serde(default)]
    pub dockerfile: PathBuf,
    /// マルチステージビルドのターゲット
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default, deserialize_with = "forms::string_or_list")]
    pub cache_from: Vec<String>,
    /// ビルド引数 (マップ形式または `KEY=VALUE` のリスト)
    #[serde(default, deserialize_with = "forms::key_values")]
    pub args: BTreeMap<String, String>,
}

impl BuildSpec {
    /// ビルド引数を `KEY=VALUE` 形式で名前順に返す
    pub fn serialized_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect()
    }
}

impl Service {
    /// ボリュームを持つサービスはステートフルとして扱う
    pub fn is_stateful(&self) -> bool {
        !self.volumes.is_empty()
    }

    /// ビルド時刻を記録
    pub fn mark_built(&mut self, at: DateTime<Utc>) {
        self.last_built_at = Some(at);
    }

    /// `last_built_at` を注釈用の文字列に変換
    pub fn last_built_stamp(&self) -> Option<String> {
        self.last_built_at
            .map(|at| at.format(TIME_FORMAT).to_string())
    }

    pub fn env(&self, name: &str) -> Option<&str> {
        self.environment
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }
}
