//! 索引数据结构
//!
//! `Index` 是构建产物的根：
//!
//! - `metadata` - 展示层需要的构建配置子集
//! - `object` - 库内相对路径 → 节点
//! - `links` - 目标路径 → 引用它的源文档列表（反向邻接表）

use super::node::Node;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// 索引元数据
///
/// 从配置文件原样带入，索引器本身不解释这些字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// 在导航树中隐藏的路径
    #[serde(default)]
    pub hidden: Vec<String>,

    /// 特殊路由映射
    #[serde(default)]
    pub routes: BTreeMap<String, String>,

    /// 其余配置项，原样写入索引
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// 索引
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Index {
    #[serde(default)]
    pub metadata: IndexMetadata,

    #[serde(default)]
    pub object: BTreeMap<String, Node>,

    #[serde(default)]
    pub links: BTreeMap<String, Vec<String>>,
}

impl Index {
    /// 创建空索引
    pub fn new(metadata: IndexMetadata) -> Self {
        Self {
            metadata,
            object: BTreeMap::new(),
            links: BTreeMap::new(),
        }
    }

    /// 登记一条 `source → target` 的链接
    ///
    /// 同一条边只记录一次，列表保持插入顺序
    ///
    /// # Returns
    ///
    /// 是否新增了边
    pub fn link_with(&mut self, source: &str, target: &str) -> bool {
        let sources = self.links.entry(target.to_string()).or_default();
        if sources.iter().any(|s| s == source) {
            return false;
        }
        sources.push(source.to_string());
        true
    }

    /// 按路径查找节点
    ///
    /// 去掉开头的 `/`，找不到时再尝试补上 `.md`
    pub fn get_object(&self, path: &str) -> Option<&Node> {
        let key = self.resolve_key(path, |k| self.object.contains_key(k))?;
        self.object.get(&key)
    }

    /// 引用该路径的文档列表
    pub fn backlinks(&self, path: &str) -> &[String] {
        self.resolve_key(path, |k| self.links.contains_key(k))
            .and_then(|key| self.links.get(&key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 一次性构建全部文档的出链表
    ///
    /// 每个源文档对应的目标按 `links` 的键序排列
    pub fn forward_links(&self) -> HashMap<&str, Vec<&str>> {
        let mut forward: HashMap<&str, Vec<&str>> = HashMap::new();
        for (target, sources) in &self.links {
            for source in sources {
                forward.entry(source.as_str()).or_default().push(target.as_str());
            }
        }
        forward
    }

    /// 当前索引引用的全部附件摘要
    pub fn attachment_hashes(&self) -> BTreeSet<&str> {
        self.object.values().filter_map(Node::hash).collect()
    }

    /// 边的总数
    pub fn edge_count(&self) -> usize {
        self.links.values().map(Vec::len).sum()
    }

    fn resolve_key(&self, path: &str, exists: impl Fn(&str) -> bool) -> Option<String> {
        let path = path.strip_prefix('/').unwrap_or(path);
        if exists(path) {
            return Some(path.to_string());
        }
        let with_ext = format!("{}.md", path);
        exists(&with_ext).then_some(with_ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::node::{Attachment, Document, Metadata};

    fn sample() -> Index {
        let mut index = Index::default();
        index.object.insert(
            "a.md".to_string(),
            Node::Document(Document::new("a", "a", Metadata::new(), "")),
        );
        index.object.insert(
            "dir/b.md".to_string(),
            Node::Document(Document::new("b", "dir/b", Metadata::new(), "")),
        );
        index.object.insert(
            "img.png".to_string(),
            Node::Attachment(Attachment::new("img", "ff00", "img.png", "png")),
        );
        index
    }

    #[test]
    fn test_link_with_dedup() {
        let mut index = Index::default();
        assert!(index.link_with("a.md", "b.md"));
        assert!(!index.link_with("a.md", "b.md"));
        assert!(index.link_with("c.md", "b.md"));

        assert_eq!(index.links["b.md"], vec!["a.md", "c.md"]);
        assert_eq!(index.edge_count(), 2);
    }

    #[test]
    fn test_get_object_fallback() {
        let index = sample();
        assert!(index.get_object("a.md").is_some());
        assert!(index.get_object("/a").is_some());
        assert!(index.get_object("dir/b").is_some());
        assert!(index.get_object("/img.png").is_some());
        assert!(index.get_object("missing").is_none());
    }

    #[test]
    fn test_backlinks_and_forward_links() {
        let mut index = sample();
        index.link_with("a.md", "dir/b.md");

        assert_eq!(index.backlinks("/dir/b"), ["a.md".to_string()]);
        assert!(index.backlinks("a").is_empty());

        let forward = index.forward_links();
        assert_eq!(forward["a.md"], vec!["dir/b.md"]);
    }

    #[test]
    fn test_attachment_hashes() {
        let index = sample();
        let hashes = index.attachment_hashes();
        assert_eq!(hashes.len(), 1);
        assert!(hashes.contains("ff00"));
    }
}
