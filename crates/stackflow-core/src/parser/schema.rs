//! 未知フィールドの検出
//!
//! serde の `deny_unknown_fields` は最初の1件で止まってしまうため、
//! 型付きデシリアライズの前に YAML ツリー全体を走査して違反をすべて集める。

use serde_yaml::{Mapping, Value};

const STACK_FIELDS: &[&str] = &["name", "namespace", "services", "endpoints"];

const SERVICE_FIELDS: &[&str] = &[
    "labels",
    "annotations",
    "public",
    "image",
    "build",
    "replicas",
    "entrypoint",
    "command",
    "args",
    "environment",
    "env_file",
    "cap_add",
    "cap_drop",
    "healthchecks",
    "ports",
    "expose",
    "volumes",
    "stop_grace_period",
    "resources",
];

const BUILD_FIELDS: &[&str] = &["name", "context", "dockerfile", "target", "cache_from", "args"];
const RESOURCES_FIELDS: &[&str] = &["limits", "requests"];
const RESOURCE_LIST_FIELDS: &[&str] = &["cpu", "memory", "storage"];
const STORAGE_FIELDS: &[&str] = &["size", "class"];
const ENDPOINT_FIELDS: &[&str] = &["path", "service", "port"];

/// マニフェスト中の未知フィールドを文書順にすべて列挙
pub(crate) fn unknown_fields(root: &Value) -> Vec<String> {
    let mut violations = Vec::new();
    let Value::Mapping(root) = root else {
        return violations;
    };

    check_fields(root, STACK_FIELDS, "stack", &mut violations);

    if let Some(Value::Mapping(services)) = root.get("services") {
        for (name, service) in services {
            let Value::Mapping(service) = service else {
                continue;
            };
            let owner = format!("service '{}'", key_name(name));
            check_fields(service, SERVICE_FIELDS, &owner, &mut violations);

            if let Some(Value::Mapping(build)) = service.get("build") {
                check_fields(build, BUILD_FIELDS, &format!("{owner} build"), &mut violations);
            }
            if let Some(Value::Mapping(resources)) = service.get("resources") {
                check_resources(resources, &owner, &mut violations);
            }
        }
    }

    if let Some(Value::Mapping(endpoints)) = root.get("endpoints") {
        for (name, group) in endpoints {
            let Value::Sequence(rules) = group else {
                continue;
            };
            for (i, rule) in rules.iter().enumerate() {
                if let Value::Mapping(rule) = rule {
                    let owner = format!("endpoint '{}'[{i}]", key_name(name));
                    check_fields(rule, ENDPOINT_FIELDS, &owner, &mut violations);
                }
            }
        }
    }

    violations
}

fn check_resources(resources: &Mapping, owner: &str, violations: &mut Vec<String>) {
    let owner = format!("{owner} resources");
    check_fields(resources, RESOURCES_FIELDS, &owner, violations);

    for section in RESOURCES_FIELDS {
        let Some(Value::Mapping(list)) = resources.get(*section) else {
            continue;
        };
        let owner = format!("{owner}.{section}");
        check_fields(list, RESOURCE_LIST_FIELDS, &owner, violations);

        if let Some(Value::Mapping(storage)) = list.get("storage") {
            check_fields(storage, STORAGE_FIELDS, &format!("{owner}.storage"), violations);
        }
    }
}

fn check_fields(map: &Mapping, known: &[&str], owner: &str, violations: &mut Vec<String>) {
    for key in map.keys() {
        match key.as_str() {
            Some(field) if known.contains(&field) => {}
            Some(field) => violations.push(format!("field '{field}' not found in {owner}")),
            None => violations.push(format!("invalid key {} in {owner}", key_name(key))),
        }
    }
}

fn key_name(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|_| format!("{other:?}")),
    }
}
