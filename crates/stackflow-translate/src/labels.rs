//! リソースに付与するラベルと注釈

use crate::resources::StringMap;
use stackflow_core::{Service, Stack};

/// スタックの設定オブジェクトであることを示すラベル
pub const STACK_LABEL: &str = "stack.okteto.com";
pub const STACK_NAME_LABEL: &str = "stack.okteto.com/name";
pub const STACK_SERVICE_NAME_LABEL: &str = "stack.okteto.com/service";
pub const STACK_ENDPOINT_NAME_LABEL: &str = "stack.okteto.com/endpoint";

pub const LAST_BUILT_ANNOTATION: &str = "dev.okteto.com/last-built";
pub const AUTO_INGRESS_ANNOTATION: &str = "dev.okteto.com/auto-ingress";

/// サービスのラベル
///
/// ユーザー指定のラベルの後にスタック名とサービス名を書き込むため、
/// ユーザーがこの2つを上書きすることはできない。
pub fn service_labels(stack: &Stack, service_name: &str, service: &Service) -> StringMap {
    let mut labels = service.labels.clone();
    labels.extend(selector(stack, service_name));
    labels
}

/// ワークロードとネットワークのセレクタ
pub fn selector(stack: &Stack, service_name: &str) -> StringMap {
    StringMap::from([
        (STACK_NAME_LABEL.to_string(), stack.name.clone()),
        (STACK_SERVICE_NAME_LABEL.to_string(), service_name.to_string()),
    ])
}

pub fn ingress_labels(stack: &Stack, endpoint_name: &str) -> StringMap {
    StringMap::from([
        (STACK_NAME_LABEL.to_string(), stack.name.clone()),
        (STACK_ENDPOINT_NAME_LABEL.to_string(), endpoint_name.to_string()),
    ])
}

/// ユーザー指定の注釈と最終ビルド時刻
pub fn annotations(service: &Service) -> StringMap {
    let mut annotations = service.annotations.clone();
    if let Some(stamp) = service.last_built_stamp() {
        annotations.insert(LAST_BUILT_ANNOTATION.to_string(), stamp);
    }
    annotations
}

pub fn auto_ingress() -> StringMap {
    StringMap::from([(AUTO_INGRESS_ANNOTATION.to_string(), "true".to_string())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn stack() -> Stack {
        Stack {
            name: "shop".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_user_labels_cannot_override_fixed_pair() {
        let mut service = Service::default();
        service
            .labels
            .insert(STACK_NAME_LABEL.to_string(), "other".to_string());
        service
            .labels
            .insert("team".to_string(), "payments".to_string());

        let labels = service_labels(&stack(), "api", &service);
        assert_eq!(labels[STACK_NAME_LABEL], "shop");
        assert_eq!(labels[STACK_SERVICE_NAME_LABEL], "api");
        assert_eq!(labels["team"], "payments");
    }

    #[test]
    fn test_selector_only_fixed_pair() {
        let selector = selector(&stack(), "api");
        assert_eq!(selector.len(), 2);
    }

    #[test]
    fn test_last_built_annotation() {
        let mut service = Service::default();
        assert!(annotations(&service).is_empty());

        service.mark_built(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        assert_eq!(
            annotations(&service)[LAST_BUILT_ANNOTATION],
            "2024-01-02T03:04:05"
        );
    }
}
