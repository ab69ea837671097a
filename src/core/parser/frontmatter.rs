//! YAML Frontmatter 解析模块
//!
//! 解析 Markdown 文件头部的 YAML 元数据，并转换为 JSON 值映射
//!
//! ## Frontmatter 格式
//!
//! ```yaml
//! ---
//! title: 节点标题
//! tags: [哲学, 心灵]
//! publish: true
//! ---
//! ```
//!
//! 起始行必须是文件第一行的 `---`，结束行为 `---` 或 `...`。

use crate::storage::Metadata;
use anyhow::{bail, Context, Result};
use serde_json::{Number, Value};
use yaml_rust2::{Yaml, YamlLoader};

/// 从内容中拆分 frontmatter 与正文
///
/// # Returns
///
/// (frontmatter_yaml, body)
pub fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let rest = match content
        .strip_prefix("---\r\n")
        .or_else(|| content.strip_prefix("---\n"))
    {
        Some(rest) => rest,
        None => return (None, content),
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed == "---" || trimmed == "..." {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(yaml), body);
        }
        offset += line.len();
    }

    (None, content)
}

/// 解析 frontmatter
///
/// # Arguments
///
/// * `content` - Markdown 文件全文
///
/// # Returns
///
/// (元数据, 正文)。没有 frontmatter 时元数据为空
pub fn parse_frontmatter(content: &str) -> Result<(Metadata, &str)> {
    let (yaml, body) = split_frontmatter(content);
    let yaml = match yaml {
        Some(yaml) if !yaml.trim().is_empty() => yaml,
        _ => return Ok((Metadata::new(), body)),
    };

    let docs = YamlLoader::load_from_str(yaml).context("Invalid YAML in front matter")?;
    let metadata = match docs.into_iter().next() {
        None | Some(Yaml::Null) => Metadata::new(),
        Some(Yaml::Hash(hash)) => hash
            .into_iter()
            .map(|(k, v)| (yaml_key(&k), yaml_to_json(v)))
            .collect(),
        Some(_) => bail!("Front matter must be a key/value mapping"),
    };

    Ok((metadata, body))
}

/// 将 YAML 值转换为 JSON 值
pub fn yaml_to_json(yaml: Yaml) -> Value {
    match yaml {
        Yaml::Null | Yaml::BadValue | Yaml::Alias(_) => Value::Null,
        Yaml::Boolean(b) => Value::Bool(b),
        Yaml::Integer(i) => Value::Number(i.into()),
        Yaml::Real(s) => s
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::String(s)),
        Yaml::String(s) => Value::String(s),
        Yaml::Array(items) => Value::Array(items.into_iter().map(yaml_to_json).collect()),
        Yaml::Hash(hash) => Value::Object(
            hash.into_iter()
                .map(|(k, v)| (yaml_key(&k), yaml_to_json(v)))
                .collect(),
        ),
    }
}

/// 非字符串键按字面量转为字符串
fn yaml_key(key: &Yaml) -> String {
    match key {
        Yaml::String(s) | Yaml::Real(s) => s.clone(),
        Yaml::Integer(i) => i.to_string(),
        Yaml::Boolean(b) => b.to_string(),
        Yaml::Null => "null".to_string(),
        other => format!("{:?}", other),
    }
}
