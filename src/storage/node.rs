//! 节点数据模型定义
//!
//! 定义索引中的节点类型：文档（Markdown 笔记）与附件（二进制文件）。
//! 节点以 `type` 字段区分变体，持久化时采用内部标签格式。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 文档元数据（来自 front matter）
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// 索引节点
///
/// 只有 `Document` 与 `Attachment` 会被持久化；
/// 目录树在展示层临时构建，不属于索引。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Node {
    /// Markdown 文档
    Document(Document),
    /// 二进制附件
    Attachment(Attachment),
}

impl Node {
    /// 节点名称（文件名去掉扩展名）
    pub fn name(&self) -> &str {
        match self {
            Node::Document(doc) => &doc.name,
            Node::Attachment(att) => &att.name,
        }
    }

    /// 展示路径
    pub fn path(&self) -> &str {
        match self {
            Node::Document(doc) => &doc.path,
            Node::Attachment(att) => &att.path,
        }
    }

    /// 构建时记录的修改时间（毫秒）
    pub fn timestamp(&self) -> i64 {
        match self {
            Node::Document(doc) => doc.timestamp,
            Node::Attachment(att) => att.timestamp,
        }
    }

    /// 类型标签
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Document(_) => NodeKind::Document,
            Node::Attachment(_) => NodeKind::Attachment,
        }
    }

    /// 附件的内容摘要，文档返回 `None`
    pub fn hash(&self) -> Option<&str> {
        match self {
            Node::Document(_) => None,
            Node::Attachment(att) => Some(&att.hash),
        }
    }
}

/// 节点类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Attachment,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Document => write!(f, "Document"),
            NodeKind::Attachment => write!(f, "Attachment"),
        }
    }
}

/// 文档节点
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// 文件名（不含扩展名）
    #[serde(default)]
    pub name: String,

    /// 展示路径（percent 编码，不含 `.md`）
    #[serde(default)]
    pub path: String,

    /// front matter 键值对
    #[serde(default)]
    pub metadata: Metadata,

    /// 链接改写后的正文
    #[serde(default)]
    pub content: String,

    /// 出链占位字段
    ///
    /// 出链可以从 `Index::links` 反向索引推导，这里始终为空
    #[serde(default)]
    pub links: Vec<String>,

    /// 源文件修改时间（Unix 毫秒）
    #[serde(default)]
    pub timestamp: i64,
}

impl Document {
    /// 创建新文档
    ///
    /// # Arguments
    ///
    /// * `name` - 文件名（不含扩展名）
    /// * `path` - 展示路径
    /// * `metadata` - front matter
    /// * `content` - 改写后的正文
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        metadata: Metadata,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            metadata,
            content: content.into(),
            links: Vec::new(),
            timestamp: 0,
        }
    }

    /// 设置修改时间
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// front matter 中的标题，缺省时使用文件名
    pub fn title(&self) -> &str {
        self.metadata
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.name)
    }
}

/// 附件节点
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// 文件名（不含扩展名）
    #[serde(default)]
    pub name: String,

    /// 内容摘要（小写十六进制）
    #[serde(default)]
    pub hash: String,

    /// 展示路径（库内相对路径）
    #[serde(default)]
    pub path: String,

    /// 小写扩展名
    #[serde(default)]
    pub extension: String,

    /// 源文件修改时间（Unix 毫秒）
    #[serde(default)]
    pub timestamp: i64,
}

impl Attachment {
    pub fn new(
        name: impl Into<String>,
        hash: impl Into<String>,
        path: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            hash: hash.into(),
            path: path.into(),
            extension: extension.into(),
            timestamp: 0,
        }
    }

    /// 设置修改时间
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 按扩展名判断可渲染的媒体类型
    pub fn media(&self) -> MediaKind {
        match self.extension.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "svg" | "webp" | "avif" => MediaKind::Image,
            "mp3" | "wav" | "m4a" | "ogg" | "flac" | "3gp" | "webm" => MediaKind::Audio,
            "mp4" | "mkv" | "mov" | "ogv" => MediaKind::Video,
            "pdf" => MediaKind::Pdf,
            _ => MediaKind::Other,
        }
    }
}

/// 附件的媒体分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    Pdf,
    Other,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Pdf => "pdf",
            MediaKind::Other => "other",
        };
        f.write_str(name)
    }
}
