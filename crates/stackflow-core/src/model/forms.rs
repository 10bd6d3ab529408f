//! マニフェストの省略形を受け付けるデシリアライザ

use super::service::{BuildSpec, EnvVar};
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").expect("static regex")
});

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

/// `build: ./api` または `build: { context: ./api, ... }`
pub(crate) fn build_spec<'de, D>(deserializer: D) -> Result<Option<BuildSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(context)) => Ok(Some(BuildSpec {
            context: PathBuf::from(context),
            ..Default::default()
        })),
        // 長い形式はフィールド名を含むエラーを残す
        Some(value @ Value::Mapping(_)) => BuildSpec::deserialize(value)
            .map(Some)
            .map_err(|e| D::Error::custom(format!("invalid build section: {e}"))),
        Some(other) => Err(D::Error::custom(format!(
            "invalid build section: expected a path or a mapping, found {other:?}"
        ))),
    }
}

/// 文字列（空白区切り）またはリスト
pub(crate) fn command_line<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<StringOrList>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(StringOrList::One(line)) => line.split_whitespace().map(String::from).collect(),
        Some(StringOrList::Many(values)) => values,
    })
}

/// 単一の文字列またはリスト
pub(crate) fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<StringOrList>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(StringOrList::One(value)) => vec![value],
        Some(StringOrList::Many(values)) => values,
    })
}

/// マップ形式または `KEY=VALUE` のリスト（宣言順を保持）
fn pairs<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Map(serde_yaml::Mapping),
        List(Vec<String>),
    }

    let mut result = Vec::new();
    match Option::<Raw>::deserialize(deserializer)? {
        None => {}
        Some(Raw::Map(map)) => {
            for (key, value) in map {
                let key = scalar_to_string(key).map_err(D::Error::custom)?;
                let value = scalar_to_string(value).map_err(D::Error::custom)?;
                result.push((key, value));
            }
        }
        Some(Raw::List(entries)) => {
            for entry in entries {
                // 値のない `KEY` は空文字として扱う
                let (key, value) = entry.split_once('=').unwrap_or((entry.as_str(), ""));
                result.push((key.to_string(), value.to_string()));
            }
        }
    }
    Ok(result)
}

pub(crate) fn environment<'de, D>(deserializer: D) -> Result<Vec<EnvVar>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(pairs(deserializer)?
        .into_iter()
        .map(|(name, value)| EnvVar { name, value })
        .collect())
}

pub(crate) fn key_values<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(pairs(deserializer)?.into_iter().collect())
}

/// 整数（秒）または `1m30s` 形式
pub(crate) fn grace_period<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(0),
        Some(Raw::Seconds(seconds)) => Ok(seconds),
        Some(Raw::Text(text)) => parse_duration_seconds(&text).ok_or_else(|| {
            D::Error::custom(format!("invalid stop_grace_period '{text}'"))
        }),
    }
}

fn parse_duration_seconds(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(seconds) = text.parse::<i64>() {
        return Some(seconds);
    }
    if text.is_empty() {
        return None;
    }
    let caps = DURATION.captures(text)?;
    let part = |i: usize, unit: i64| -> Option<i64> {
        caps.get(i)
            .map_or(Some(0), |m| m.as_str().parse::<i64>().ok())
            .and_then(|v| v.checked_mul(unit))
    };
    part(1, 3600)?
        .checked_add(part(2, 60)?)?
        .checked_add(part(3, 1)?)
}

fn scalar_to_string(value: Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(format!("expected a scalar value, found {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_seconds() {
        assert_eq!(parse_duration_seconds("30"), Some(30));
        assert_eq!(parse_duration_seconds("30s"), Some(30));
        assert_eq!(parse_duration_seconds("1m30s"), Some(90));
        assert_eq!(parse_duration_seconds("2m"), Some(120));
        assert_eq!(parse_duration_seconds("1h"), Some(3600));
        assert_eq!(parse_duration_seconds(""), None);
        assert_eq!(parse_duration_seconds("soon"), None);
        assert_eq!(parse_duration_seconds("1s1m"), None);
    }

    #[derive(Debug, Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "build_spec")]
        build: Option<BuildSpec>,
    }

    fn build_error(yaml: &str) -> String {
        serde_yaml::from_str::<Holder>(yaml).unwrap_err().to_string()
    }

    #[test]
    fn test_build_spec_forms() {
        let short: Holder = serde_yaml::from_str("build: ./api").unwrap();
        assert_eq!(short.build.unwrap().context, PathBuf::from("./api"));

        let long: Holder =
            serde_yaml::from_str("build: {context: web, dockerfile: Dockerfile.prod}").unwrap();
        let long = long.build.unwrap();
        assert_eq!(long.context, PathBuf::from("web"));
        assert_eq!(long.dockerfile, PathBuf::from("Dockerfile.prod"));

        let absent: Holder = serde_yaml::from_str("{}").unwrap();
        assert!(absent.build.is_none());
    }

    #[test]
    fn test_build_spec_errors_name_the_field() {
        let message = build_error("build: {context: ., dockerfil: Dockerfile}");
        assert!(message.contains("dockerfil"), "{message}");
        assert!(!message.contains("untagged"), "{message}");

        let message = build_error("build: {context: ., target: [a, b]}");
        assert!(message.contains("invalid build section"), "{message}");
        assert!(message.contains("sequence"), "{message}");

        let message = build_error("build: [./api]");
        assert!(message.contains("expected a path or a mapping"), "{message}");
    }
}
