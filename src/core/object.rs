//! 对象存储模块
//!
//! 附件按内容的 SHA-256 摘要存放在 `<output>/.objects/<摘要>`，
//! 相同内容只保存一份。索引文件与对象位于同一目录，
//! 因此所有按摘要定位文件的操作都先校验摘要格式。

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// SHA-256 十六进制摘要的长度
const DIGEST_LEN: usize = 64;

/// 计算内容摘要（小写十六进制）
pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// 是否为合法的对象摘要：64 位小写十六进制
pub fn is_digest(hash: &str) -> bool {
    hash.len() == DIGEST_LEN && hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// 对象存储
#[derive(Debug, Clone)]
pub struct ObjectStore {
    dir: PathBuf,
}

impl ObjectStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 摘要对应的对象路径，摘要不合法时返回 `None`
    fn object_path(&self, hash: &str) -> Option<PathBuf> {
        is_digest(hash).then(|| self.dir.join(hash))
    }

    /// 对象文件是否存在
    pub fn contains(&self, hash: &str) -> bool {
        self.object_path(hash).is_some_and(|p| p.is_file())
    }

    /// 写入对象
    ///
    /// 同摘要的对象已存在时不重复写入
    ///
    /// # Returns
    ///
    /// (摘要, 是否写入了新文件)
    pub fn write_object(&self, content: &[u8]) -> Result<(String, bool)> {
        let hash = hash_content(content);
        let object_path = self.dir.join(&hash);
        if object_path.exists() {
            return Ok((hash, false));
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create object store {:?}", self.dir))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("Failed to create temporary file in {:?}", self.dir))?;
        tmp.write_all(content)?;
        tmp.flush()?;

        match tmp.persist_noclobber(&object_path) {
            Ok(_) => {
                debug!("Wrote object {}", hash);
                Ok((hash, true))
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok((hash, false)),
            Err(e) => Err(e.error)
                .with_context(|| format!("Failed to write object {:?}", object_path)),
        }
    }

    /// 删除对象
    ///
    /// 文件不存在不算错误；不合法的摘要不会被当作路径使用
    ///
    /// # Returns
    ///
    /// 实际删除的文件数
    pub fn remove_objects<'a, I>(&self, hashes: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut removed = 0;
        for hash in hashes {
            let Some(object_path) = self.object_path(hash) else {
                warn!("Skipping invalid object digest {:?}", hash);
                continue;
            };
            match fs::remove_file(&object_path) {
                Ok(()) => {
                    debug!("Removed object {}", hash);
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to remove object {:?}", object_path))
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hash_content_is_stable() {
        assert_eq!(
            hash_content(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash_content(b"abc"), hash_content(b"abc"));
        assert_ne!(hash_content(b"abc"), hash_content(b"abd"));
        assert!(is_digest(&hash_content(b"abc")));
    }

    #[test]
    fn test_is_digest() {
        assert!(!is_digest("index"));
        assert!(!is_digest("../precious.txt"));
        assert!(!is_digest("deadbeef"));
        assert!(!is_digest(&"A".repeat(64)));
        assert!(is_digest(&"a".repeat(64)));
    }

    #[test]
    fn test_write_object_once() {
        let temp_dir = TempDir::new().unwrap();
        let store = ObjectStore::new(temp_dir.path().join(".objects"));

        let (hash, written) = store.write_object(b"same bytes").unwrap();
        assert!(written);
        let (again, written) = store.write_object(b"same bytes").unwrap();
        assert!(!written);
        assert_eq!(hash, again);

        let files: Vec<_> = fs::read_dir(store.dir()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(fs::read(store.dir().join(&hash)).unwrap(), b"same bytes");
    }

    #[test]
    fn test_existing_blob_not_rewritten() {
        let temp_dir = TempDir::new().unwrap();
        let store = ObjectStore::new(temp_dir.path());
        let hash = hash_content(b"payload");
        fs::write(temp_dir.path().join(&hash), b"sentinel").unwrap();

        let (_, written) = store.write_object(b"payload").unwrap();
        assert!(!written);
        assert_eq!(fs::read(temp_dir.path().join(&hash)).unwrap(), b"sentinel");
    }

    #[test]
    fn test_remove_objects_best_effort() {
        let temp_dir = TempDir::new().unwrap();
        let store = ObjectStore::new(temp_dir.path());
        let (hash, _) = store.write_object(b"gone soon").unwrap();
        let absent = hash_content(b"never stored");

        let removed = store.remove_objects([hash.as_str(), absent.as_str()]).unwrap();
        assert_eq!(removed, 1);
        assert!(!store.contains(&hash));
        assert_eq!(store.remove_objects([hash.as_str()]).unwrap(), 0);
    }

    #[test]
    fn test_remove_objects_rejects_invalid_digest() {
        let temp_dir = TempDir::new().unwrap();
        let store_dir = temp_dir.path().join(".objects");
        fs::create_dir_all(&store_dir).unwrap();
        fs::write(store_dir.join("index"), b"index").unwrap();
        fs::write(temp_dir.path().join("precious.txt"), b"keep").unwrap();

        let store = ObjectStore::new(&store_dir);
        let removed = store.remove_objects(["index", "../precious.txt"]).unwrap();
        assert_eq!(removed, 0);
        assert!(store_dir.join("index").exists());
        assert!(temp_dir.path().join("precious.txt").exists());
        assert!(!store.contains("index"));
        assert!(!store.contains("../precious.txt"));
    }
}
