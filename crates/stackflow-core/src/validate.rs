//! スタック全体の整合性検証

use crate::error::ValidationError;
use crate::model::Stack;
use crate::naming::validate_name;
use tracing::debug;

impl Stack {
    /// デフォルト適用済みのスタックを検証
    ///
    /// 規則は次の順に評価し、最初の違反を返す:
    /// 1. スタック名
    /// 2. サービスが1つ以上あること
    /// 3. エンドポイントの参照先サービスとポート
    /// 4. サービス名
    /// 5. image または build
    /// 6. ボリュームパス（バインドマウント不可、絶対パス）
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name).map_err(|e| ValidationError::InvalidStackName {
            name: self.name.clone(),
            reason: e.to_string(),
        })?;

        if self.services.is_empty() {
            return Err(ValidationError::NoServices);
        }

        for (endpoint_name, endpoints) in &self.endpoints {
            for endpoint in endpoints {
                let Some(service) = self.services.get(&endpoint.service) else {
                    return Err(ValidationError::UnknownEndpointService {
                        endpoint: endpoint_name.clone(),
                        service: endpoint.service.clone(),
                    });
                };
                if !service.ports.contains(&endpoint.port) {
                    return Err(ValidationError::MissingEndpointPort {
                        endpoint: endpoint_name.clone(),
                        service: endpoint.service.clone(),
                        port: endpoint.port,
                    });
                }
            }
        }

        for (name, service) in &self.services {
            validate_name(name).map_err(|e| ValidationError::InvalidServiceName {
                service: name.clone(),
                reason: e.to_string(),
            })?;

            if service.image.is_empty() && service.build.is_none() {
                return Err(ValidationError::MissingImage {
                    service: name.clone(),
                });
            }

            for volume in &service.volumes {
                if volume.contains(':') {
                    return Err(ValidationError::BindMount {
                        service: name.clone(),
                        volume: volume.clone(),
                    });
                }
                if !volume.starts_with('/') {
                    return Err(ValidationError::RelativeVolume {
                        service: name.clone(),
                        volume: volume.clone(),
                    });
                }
            }
        }

        debug!(stack = %self.name, "Stack validated");
        Ok(())
    }
}
