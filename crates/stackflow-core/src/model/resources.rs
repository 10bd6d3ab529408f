//! リソース要求・制限

use crate::quantity::Quantity;
use serde::Deserialize;

/// サービスのリソース設定
///
/// ```yaml
/// resources:
///   limits:
///     cpu: 500m
///     memory: 256Mi
///   requests:
///     storage:
///       size: 10Gi
///       class: standard
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackResources {
    #[serde(default)]
    pub limits: ServiceResources,
    #[serde(default)]
    pub requests: ServiceResources,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceResources {
    #[serde(default)]
    pub cpu: Quantity,
    #[serde(default)]
    pub memory: Quantity,
    #[serde(default)]
    pub storage: StorageResource,
}

/// 永続ストレージのサイズとストレージクラス
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageResource {
    #[serde(default)]
    pub size: Quantity,
    #[serde(default)]
    pub class: Option<String>,
}
