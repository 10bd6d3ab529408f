//! Stack からクラスタのリソース仕様への変換

use crate::error::{Result, TranslateError};
use crate::labels;
use crate::resources::*;
use base64::Engine;
use stackflow_core::{Quantity, Service as StackService, Stack};
use tracing::{debug, instrument};

/// 永続ボリューム要求テンプレートの名前
pub const PVC_NAME: &str = "pvc";

const NAME_FIELD: &str = "name";
const YAML_FIELD: &str = "yaml";

/// スタックをリソース仕様の列に変換
///
/// 順序: 設定オブジェクト、サービスごとに（名前順）ワークロードとネットワーク、
/// エンドポイントグループごとに（名前順）ルーティング。
#[instrument(skip_all, fields(stack = %stack.name))]
pub fn translate(stack: &Stack) -> Vec<Resource> {
    let mut resources = Vec::with_capacity(1 + stack.services.len() * 2 + stack.endpoints.len());
    resources.push(Resource::ConfigMap(translate_config_map(stack)));

    for (name, service) in &stack.services {
        if service.is_stateful() {
            resources.push(Resource::StatefulSet(translate_stateful_set(
                stack, name, service,
            )));
        } else {
            resources.push(Resource::Deployment(translate_deployment(stack, name, service)));
        }
        resources.push(Resource::Service(translate_service(stack, name, service)));
    }

    for (name, endpoints) in &stack.endpoints {
        resources.push(Resource::Ingress(translate_ingress(stack, name, endpoints)));
    }

    debug!(count = resources.len(), "Translated stack resources");
    resources
}

/// リソース列を複数ドキュメントの YAML に変換
pub fn render_yaml(resources: &[Resource]) -> Result<String> {
    let mut out = String::new();
    for resource in resources {
        let doc = serde_yaml::to_string(resource).map_err(|e| TranslateError::Render {
            kind: resource.kind(),
            name: resource.name().to_string(),
            message: e.to_string(),
        })?;
        out.push_str("---\n");
        out.push_str(&doc);
    }
    Ok(out)
}

fn meta(stack: &Stack, name: &str, labels: StringMap, annotations: StringMap) -> ObjectMeta {
    ObjectMeta {
        name: name.to_string(),
        namespace: stack.namespace.clone().filter(|ns| !ns.is_empty()),
        labels,
        annotations,
    }
}

pub fn translate_config_map(stack: &Stack) -> ConfigMap {
    let labels = StringMap::from([(labels::STACK_LABEL.to_string(), "true".to_string())]);
    ConfigMap {
        api_version: "v1",
        kind: "ConfigMap",
        metadata: meta(stack, &stack.config_map_name(), labels, StringMap::new()),
        data: StringMap::from([
            (NAME_FIELD.to_string(), stack.name.clone()),
            (
                YAML_FIELD.to_string(),
                base64::engine::general_purpose::STANDARD.encode(&stack.manifest),
            ),
        ]),
    }
}

fn pod_template(stack: &Stack, name: &str, service: &StackService, spec: PodSpec) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: ObjectMeta {
            labels: labels::service_labels(stack, name, service),
            annotations: labels::annotations(service),
            ..Default::default()
        },
        spec,
    }
}

pub fn translate_deployment(stack: &Stack, name: &str, service: &StackService) -> Deployment {
    let pod_spec = PodSpec {
        termination_grace_period_seconds: service.stop_grace_period,
        init_containers: Vec::new(),
        containers: vec![translate_container(name, service)],
    };

    Deployment {
        api_version: "apps/v1",
        kind: "Deployment",
        metadata: meta(
            stack,
            name,
            labels::service_labels(stack, name, service),
            labels::annotations(service),
        ),
        spec: DeploymentSpec {
            replicas: service.replicas,
            selector: LabelSelector {
                match_labels: labels::selector(stack, name),
            },
            template: pod_template(stack, name, service, pod_spec),
        },
    }
}

pub fn translate_stateful_set(stack: &Stack, name: &str, service: &StackService) -> StatefulSet {
    let init = Container {
        name: format!("init-{name}"),
        image: "busybox".to_string(),
        command: ["chmod", "-R", "777", "/data"].map(String::from).to_vec(),
        volume_mounts: vec![VolumeMount {
            name: PVC_NAME.to_string(),
            mount_path: "/data".to_string(),
            sub_path: String::new(),
        }],
        ..Default::default()
    };

    let mut container = translate_container(name, service);
    container.volume_mounts = translate_volume_mounts(service);

    let pod_spec = PodSpec {
        termination_grace_period_seconds: service.stop_grace_period,
        init_containers: vec![init],
        containers: vec![container],
    };

    let storage = &service.resources.requests.storage;
    let mut claim_resources = ResourceRequirements::default();
    if !storage.size.is_zero() {
        claim_resources
            .requests
            .insert("storage".to_string(), storage.size.clone());
    }

    let claim = PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: PVC_NAME.to_string(),
            labels: labels::service_labels(stack, name, service),
            annotations: labels::annotations(service),
            ..Default::default()
        },
        spec: PersistentVolumeClaimSpec {
            access_modes: vec!["ReadWriteOnce".to_string()],
            resources: claim_resources,
            storage_class_name: storage.class.clone().filter(|c| !c.is_empty()),
        },
    };

    StatefulSet {
        api_version: "apps/v1",
        kind: "StatefulSet",
        metadata: meta(
            stack,
            name,
            labels::service_labels(stack, name, service),
            labels::annotations(service),
        ),
        spec: StatefulSetSpec {
            replicas: service.replicas,
            revision_history_limit: 2,
            selector: LabelSelector {
                match_labels: labels::selector(stack, name),
            },
            service_name: name.to_string(),
            template: pod_template(stack, name, service, pod_spec),
            volume_claim_templates: vec![claim],
        },
    }
}

pub fn translate_service(stack: &Stack, name: &str, service: &StackService) -> Service {
    let mut annotations = labels::annotations(service);
    let service_type = if service.public {
        annotations.extend(labels::auto_ingress());
        ServiceType::LoadBalancer
    } else {
        ServiceType::ClusterIP
    };

    Service {
        api_version: "v1",
        kind: "Service",
        metadata: meta(
            stack,
            name,
            labels::service_labels(stack, name, service),
            annotations,
        ),
        spec: ServiceSpec {
            service_type,
            selector: labels::selector(stack, name),
            ports: service
                .ports
                .iter()
                .map(|&port| ServicePort {
                    name: format!("p-{port}"),
                    port,
                    target_port: port,
                })
                .collect(),
        },
    }
}

pub fn translate_ingress(stack: &Stack, name: &str, endpoints: &[stackflow_core::Endpoint]) -> Ingress {
    let paths = endpoints
        .iter()
        .map(|endpoint| HttpIngressPath {
            path: endpoint.path.clone(),
            path_type: "ImplementationSpecific",
            backend: IngressBackend {
                service: IngressServiceBackend {
                    name: endpoint.service.clone(),
                    port: ServiceBackendPort {
                        number: endpoint.port,
                    },
                },
            },
        })
        .collect();

    Ingress {
        api_version: "networking.k8s.io/v1",
        kind: "Ingress",
        metadata: meta(
            stack,
            name,
            labels::ingress_labels(stack, name),
            labels::auto_ingress(),
        ),
        spec: IngressSpec {
            rules: vec![IngressRule {
                http: HttpIngressRuleValue { paths },
            }],
        },
    }
}

fn translate_container(name: &str, service: &StackService) -> Container {
    Container {
        name: name.to_string(),
        image: service.image.clone(),
        command: service.command.clone(),
        args: service.args.clone(),
        env: service
            .environment
            .iter()
            .map(|e| EnvVar {
                name: e.name.clone(),
                value: e.value.clone(),
            })
            .collect(),
        ports: service
            .ports
            .iter()
            .map(|&container_port| ContainerPort { container_port })
            .collect(),
        security_context: translate_security_context(service),
        volume_mounts: Vec::new(),
        resources: translate_resources(service),
    }
}

fn translate_volume_mounts(service: &StackService) -> Vec<VolumeMount> {
    service
        .volumes
        .iter()
        .enumerate()
        .map(|(i, path)| VolumeMount {
            name: PVC_NAME.to_string(),
            mount_path: path.clone(),
            sub_path: format!("data-{i}"),
        })
        .collect()
}

fn translate_security_context(service: &StackService) -> Option<SecurityContext> {
    if service.cap_add.is_empty() && service.cap_drop.is_empty() {
        return None;
    }
    Some(SecurityContext {
        capabilities: Capabilities {
            add: service.cap_add.clone(),
            drop: service.cap_drop.clone(),
        },
    })
}

/// コンテナのリソース設定
///
/// requests は limits として書き出す。requests.cpu があると limits は cpu だけの
/// 新しいリストに置き換わり、requests.memory は limits に追加される。
fn translate_resources(service: &StackService) -> ResourceRequirements {
    let limits = &service.resources.limits;
    let requests = &service.resources.requests;
    let mut result = ResourceRequirements::default();

    set_if_nonzero(&mut result.limits, "cpu", &limits.cpu);
    set_if_nonzero(&mut result.limits, "memory", &limits.memory);

    if !requests.cpu.is_zero() {
        result.limits = ResourceList::from([("cpu".to_string(), requests.cpu.clone())]);
    }
    set_if_nonzero(&mut result.limits, "memory", &requests.memory);

    result
}

fn set_if_nonzero(list: &mut ResourceList, key: &str, value: &Quantity) {
    if !value.is_zero() {
        list.insert(key.to_string(), value.clone());
    }
}
