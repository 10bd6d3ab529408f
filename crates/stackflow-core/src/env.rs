//! 環境変数の解決
//!
//! `image` と `env_file` のパスに含まれる変数参照を展開し、
//! env_file の内容をサービスの `environment` にマージします。

use crate::error::{Result, StackError};
use crate::model::{EnvVar, Service, Stack};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, instrument};

/// env_file のキーとして許可される形式
static ENV_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("static regex"));

/// プロセス環境変数で `$VAR` / `${VAR}` / `${VAR:-default}` を展開
pub fn expand_env(input: &str) -> Result<String> {
    expand_with(input, |name| std::env::var(name).ok())
}

/// 任意の参照関数で変数を展開
///
/// - 未設定の変数は空文字列
/// - `${VAR:-default}` は未設定または空のとき default
/// - `${VAR-default}` は未設定のときだけ default
/// - `$$` は `$` そのもの
pub fn expand_with<F>(input: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek().copied() {
            Some((_, '$')) => {
                chars.next();
                out.push('$');
            }
            Some((start, '{')) => {
                chars.next();
                let body_start = start + 1;
                let Some(close) = input[body_start..].find('}') else {
                    return Err(StackError::Expand {
                        input: input.to_string(),
                        message: "unterminated '${' reference".to_string(),
                    });
                };
                let body = &input[body_start..body_start + close];
                out.push_str(&expand_braced(input, body, &lookup)?);
                while chars.next_if(|(i, _)| *i <= body_start + close).is_some() {}
            }
            Some((start, next)) if next == '_' || next.is_ascii_alphabetic() => {
                let mut end = start;
                while let Some((i, ch)) = chars.next_if(|(_, ch)| *ch == '_' || ch.is_ascii_alphanumeric()) {
                    end = i + ch.len_utf8();
                }
                out.push_str(&lookup(&input[start..end]).unwrap_or_default());
            }
            _ => out.push('$'),
        }
    }

    Ok(out)
}

fn expand_braced<F>(input: &str, body: &str, lookup: &F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let (name, default, empty_is_unset) = if let Some((name, default)) = body.split_once(":-") {
        (name, Some(default), true)
    } else if let Some((name, default)) = body.split_once('-') {
        (name, Some(default), false)
    } else {
        (body, None, false)
    };

    let valid_name = name
        .chars()
        .next()
        .is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
        && name.chars().all(|c| c == '_' || c.is_ascii_alphanumeric());
    if !valid_name {
        return Err(StackError::Expand {
            input: input.to_string(),
            message: format!("invalid variable name '{name}'"),
        });
    }

    let value = lookup(name);
    let expanded = match (value, default) {
        (Some(v), Some(d)) if v.is_empty() && empty_is_unset => d.to_string(),
        (Some(v), _) => v,
        (None, Some(d)) => d.to_string(),
        (None, None) => String::new(),
    };
    Ok(expanded)
}

/// dotenv 形式のファイルを読み込み、宣言順の `(KEY, VALUE)` を返す
pub fn parse_env_file(path: &Path) -> Result<Vec<(String, String)>> {
    let content = std::fs::read_to_string(path).map_err(|e| StackError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_env_content(&content, path)
}

fn parse_env_content(content: &str, path: &Path) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();

        // 空行とコメント行をスキップ
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fail = |message: String| StackError::EnvFile {
            path: path.to_path_buf(),
            line: Some(index + 1),
            message,
        };

        let line = line.strip_prefix("export ").map_or(line, str::trim_start);
        let Some((key, value)) = line.split_once('=') else {
            return Err(fail(format!("expected KEY=VALUE, got '{line}'")));
        };
        let key = key.trim();
        if !ENV_KEY.is_match(key) {
            return Err(fail(format!("invalid variable name '{key}'")));
        }

        let value = parse_value(value.trim()).map_err(fail)?;
        pairs.push((key.to_string(), value));
    }

    Ok(pairs)
}

fn parse_value(value: &str) -> std::result::Result<String, String> {
    if let Some(rest) = value.strip_prefix('"') {
        let mut out = String::new();
        let mut chars = rest.chars();
        while let Some(c) = chars.next() {
            match c {
                '"' => return Ok(out),
                '\\' => match chars.next() {
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some(other) => out.push(other),
                    None => break,
                },
                other => out.push(other),
            }
        }
        return Err("unterminated double-quoted value".to_string());
    }

    if let Some(rest) = value.strip_prefix('\'') {
        return rest
            .find('\'')
            .map(|end| rest[..end].to_string())
            .ok_or_else(|| "unterminated single-quoted value".to_string());
    }

    // クォートなしの値は ` #` 以降をコメントとして捨てる
    let value = value.split_once(" #").map_or(value, |(v, _)| v);
    Ok(value.trim_end().to_string())
}

impl Stack {
    /// プロセス環境変数を使って全サービスの環境変数を解決
    pub fn resolve_environment(&mut self) -> Result<()> {
        self.resolve_environment_with(|name| std::env::var(name).ok())
    }

    /// 任意の参照関数で全サービスの環境変数を解決
    #[instrument(skip_all, fields(stack = %self.name))]
    pub fn resolve_environment_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        for (name, service) in self.services.iter_mut() {
            service.resolve_environment(&self.dir, &lookup)?;
            debug!(
                service = %name,
                variables = service.environment.len(),
                "Resolved service environment"
            );
        }
        info!(services = self.services.len(), "Environment resolved");
        Ok(())
    }
}

impl Service {
    fn resolve_environment<F>(&mut self, stack_dir: &Path, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.image = expand_with(&self.image, lookup)?;

        // 後のファイルが前のファイルを上書きする
        let mut merged: BTreeMap<String, String> = BTreeMap::new();
        for env_file in std::mem::take(&mut self.env_files) {
            let path = PathBuf::from(expand_with(&env_file, lookup)?);
            let path = if path.is_relative() {
                stack_dir.join(path)
            } else {
                path
            };
            let pairs = parse_env_file(&path)?;
            debug!(env_file = %path.display(), variables = pairs.len(), "Loaded env_file");
            merged.extend(pairs);
        }

        // 明示的な environment は常に優先
        for var in std::mem::take(&mut self.environment) {
            merged.insert(var.name, var.value);
        }

        self.environment = merged
            .into_iter()
            .map(|(name, value)| EnvVar { name, value })
            .collect();
        Ok(())
    }
}
