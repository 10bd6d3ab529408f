//! エンドポイント定義

use serde::Deserialize;

/// パスからサービスのポートへのルーティングルール
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Endpoint {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub port: u16,
}
