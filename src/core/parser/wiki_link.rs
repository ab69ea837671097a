//! Wiki 链接解析模块
//!
//! 解析 Markdown 中的 `[[目标|显示文本]]` 格式链接，并改写为标准 Markdown 链接
//!
//! ## 链接格式
//!
//! ```markdown
//! [[目标]]                 # 显示文本由解析回调决定
//! [[目标|显示文本]]        # 指定显示文本
//! [[目标#标题]]            # 带锚点
//! ![[图片.png]]            # 嵌入
//! ```
//!
//! 改写结果为 `[显示文本](/编码后的路径)`，嵌入链接保留前缀 `!`。

use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;

static WIKI_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(!)?\[\[([^\]]+)\]\]").expect("valid wiki link regex"));

/// Wiki 链接结构
///
/// 表示一个解析后的 wiki 链接
#[derive(Debug, Clone, PartialEq)]
pub struct WikiLink {
    /// 链接目标（可能带 `#锚点`）
    pub target: String,
    /// 显示文本覆盖
    pub display: Option<String>,
    /// 是否为嵌入（`![[...]]`）
    pub embed: bool,
}

impl WikiLink {
    fn from_captures(embed: bool, inner: &str) -> Self {
        let mut parts = inner.trim().split('|');
        let target = parts.next().unwrap_or_default().trim().to_string();
        let display = parts
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Self { target, display, embed }
    }
}

/// 链接目标的解析结果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Resolution {
    /// 解析后的路径（含锚点，未编码）
    pub href: String,
    /// 默认显示文本
    pub display: Option<String>,
}

impl Resolution {
    pub fn new(href: impl Into<String>, display: Option<String>) -> Self {
        Self {
            href: href.into(),
            display,
        }
    }
}

/// 改写正文中的 wiki 链接
///
/// 从左到右处理每个不重叠的匹配，匹配之外的文本原样保留。
/// 回调出错时立即返回错误，不产生部分结果。
///
/// # Arguments
///
/// * `content` - Markdown 正文
/// * `resolve` - 目标解析回调，参数为链接目标（含锚点）
///
/// # Returns
///
/// 改写后的正文
pub fn transform_wiki_links<F>(content: &str, mut resolve: F) -> Result<String>
where
    F: FnMut(&str) -> Result<Resolution>,
{
    let mut markdown = String::with_capacity(content.len());
    let mut start = 0;

    for cap in WIKI_LINK_RE.captures_iter(content) {
        let Some(whole) = cap.get(0) else { continue };
        let link = WikiLink::from_captures(cap.get(1).is_some(), &cap[2]);
        let resolved = resolve(&link.target)?;

        let display = link
            .display
            .as_deref()
            .or(resolved.display.as_deref())
            .unwrap_or(&resolved.href);

        markdown.push_str(&content[start..whole.start()]);
        if link.embed {
            markdown.push('!');
        }
        markdown.push_str(&format!("[{}](/{})", display, encode_uri(&resolved.href)));
        start = whole.end();
    }

    markdown.push_str(&content[start..]);
    Ok(markdown)
}

/// 对 URI 进行 percent 编码
///
/// 保留 URI 中的保留字符（`/`、`#`、`?` 等），其余非安全字符按 UTF-8 字节编码
pub fn encode_uri(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() || "-_.~!$&'()*+,;=:@/#?".contains(c) {
            result.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).as_bytes() {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}
