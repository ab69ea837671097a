//! 索引编解码
//!
//! 索引以 CBOR 格式存为单个二进制文件。CBOR 是自描述格式，
//! 旧版本写出的索引缺少某些字段时按默认值读取。

use super::index::Index;
use anyhow::{Context, Result};
use std::fs;
use std::io::{BufReader, Write};
use std::path::Path;

/// 将索引编码为字节
pub fn encode(index: &Index) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(index, &mut buf).context("Failed to encode index")?;
    Ok(buf)
}

/// 从字节解码索引
pub fn decode(bytes: &[u8]) -> Result<Index> {
    ciborium::from_reader(bytes).context("Failed to decode index")
}

/// 读取已有的索引文件
///
/// # Returns
///
/// 文件不存在时返回 `None`；文件存在但无法解码时报错
pub fn read_index(path: &Path) -> Result<Option<Index>> {
    if !path.exists() {
        return Ok(None);
    }

    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open index at {:?}", path))?;
    let index = ciborium::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to decode index at {:?}", path))?;

    Ok(Some(index))
}

/// 写出索引文件
///
/// 先写入同目录的临时文件，再原子替换目标
pub fn write_index(path: &Path, index: &Index) -> Result<()> {
    let bytes = encode(index)?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {:?}", dir))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {:?}", dir))?;
    tmp.write_all(&bytes)?;
    tmp.flush()?;
    tmp.persist(path)
        .with_context(|| format!("Failed to write index to {:?}", path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::index::IndexMetadata;
    use crate::storage::node::{Attachment, Document, Metadata, Node};
    use tempfile::TempDir;

    fn sample_index() -> Index {
        let mut metadata = Metadata::new();
        metadata.insert("title".to_string(), serde_json::json!("首页"));
        metadata.insert("tags".to_string(), serde_json::json!(["a", "b"]));
        metadata.insert("draft".to_string(), serde_json::json!(false));
        metadata.insert("weight".to_string(), serde_json::json!(3));

        let mut index = Index::new(IndexMetadata {
            hidden: vec!["private".to_string()],
            routes: [("/".to_string(), "index".to_string())].into_iter().collect(),
            extra: [("theme".to_string(), serde_json::json!({ "dark": true, "accent": 3 }))]
                .into_iter()
                .collect(),
        });
        index.object.insert(
            "index.md".to_string(),
            Node::Document(
                Document::new("index", "index", metadata, "see [b](/b)").with_timestamp(1_700_000_000_123),
            ),
        );
        index.object.insert(
            "b.md".to_string(),
            Node::Document(Document::new("b", "b", Metadata::new(), "")),
        );
        index.object.insert(
            "pic.png".to_string(),
            Node::Attachment(Attachment::new("pic", "00ff", "pic.png", "png").with_timestamp(42)),
        );
        index.link_with("index.md", "b.md");
        index
    }

    #[test]
    fn test_round_trip() {
        let index = sample_index();
        let bytes = encode(&index).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, index);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let index = sample_index();
        assert_eq!(encode(&index).unwrap(), encode(&index.clone()).unwrap());
    }

    #[test]
    fn test_decode_missing_optional_fields() {
        // 旧版本索引：没有 links，节点没有 timestamp / metadata
        let legacy = serde_json::json!({
            "object": {
                "a.md": { "type": "Document", "name": "a", "path": "a", "content": "x" },
                "f.bin": { "type": "Attachment", "name": "f", "hash": "ab", "path": "f.bin", "extension": "bin" }
            }
        });
        let mut bytes = Vec::new();
        ciborium::into_writer(&legacy, &mut bytes).unwrap();

        let index = decode(&bytes).unwrap();
        assert!(index.links.is_empty());
        assert_eq!(index.metadata, IndexMetadata::default());

        let doc = index.get_object("a").unwrap();
        assert_eq!(doc.timestamp(), 0);
        match doc {
            Node::Document(doc) => assert!(doc.metadata.is_empty()),
            other => panic!("Expected Document, got {:?}", other.kind()),
        }
        assert_eq!(index.get_object("f.bin").unwrap().hash(), Some("ab"));
    }

    #[test]
    fn test_decode_unknown_type_fails() {
        let bad = serde_json::json!({
            "object": { "x": { "type": "Folder", "name": "x" } }
        });
        let mut bytes = Vec::new();
        ciborium::into_writer(&bad, &mut bytes).unwrap();
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_read_write_index() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".objects/index");

        assert!(read_index(&path).unwrap().is_none());

        let index = sample_index();
        write_index(&path, &index).unwrap();
        assert_eq!(read_index(&path).unwrap(), Some(index));
    }

    #[test]
    fn test_read_corrupt_index_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index");
        std::fs::write(&path, b"\xff\xff not cbor").unwrap();
        assert!(read_index(&path).is_err());
    }
}
