//! 库目录遍历模块
//!
//! 深度优先遍历库目录，跳过以忽略前缀（默认 `.` 和 `_`）开头的条目，
//! 被忽略的目录整棵子树都不会进入。同级条目按文件名排序，保证遍历顺序稳定。
//!
//! 符号链接会被跟随：指向目录的链接按普通目录遍历，构成环的链接跳过。

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// 默认忽略前缀
pub const DEFAULT_IGNORE: &[&str] = &[".", "_"];

/// 单个文件的遍历上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContext {
    /// 库根目录
    pub root: PathBuf,
    /// 所在目录（库内相对路径，根目录下为空串）
    pub parent: String,
    /// 文件名
    pub name: String,
    /// 文件系统绝对路径
    pub path: PathBuf,
    /// 库内相对路径，作为索引键
    pub relpath: String,
    /// 小写扩展名，没有时为空串
    pub extension: String,
    /// 文件名去掉扩展名
    pub short: String,
    /// 修改时间（Unix 毫秒）
    pub timestamp: i64,
}

impl FileContext {
    /// 是否为 Markdown 文档
    pub fn is_markdown(&self) -> bool {
        self.extension == "md"
    }

    /// 展示路径：`parent/short`
    pub fn display_path(&self) -> String {
        join_rel(&self.parent, &self.short)
    }
}

/// 拆分文件名为 (扩展名, 主干)
///
/// 扩展名取最后一个 `.` 之后的部分并转为小写
pub fn bisect(filename: &str) -> (String, String) {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (ext.to_lowercase(), stem.to_string()),
        _ => (String::new(), filename.to_string()),
    }
}

/// 以 `/` 连接两段相对路径，忽略空段
pub fn join_rel(parent: &str, name: &str) -> String {
    match (parent.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => parent.to_string(),
        (false, false) => format!("{}/{}", parent, name),
    }
}

/// 修改时间转为 Unix 毫秒，早于纪元的时间为负数
pub fn mtime_millis(time: SystemTime) -> Result<i64> {
    let millis = match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_millis())?,
        Err(before) => -i64::try_from(before.duration().as_millis())?,
    };
    Ok(millis)
}

/// 库目录遍历器
#[derive(Debug, Clone)]
pub struct Walker {
    root: PathBuf,
    subpath: String,
    ignore: Vec<String>,
}

impl Walker {
    /// 创建遍历器，使用默认忽略前缀
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            subpath: String::new(),
            ignore: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// 只遍历某个子目录（库内相对路径）
    pub fn subpath(mut self, subpath: impl Into<String>) -> Self {
        self.subpath = subpath.into().trim_matches('/').to_string();
        self
    }

    /// 设置忽略前缀
    pub fn ignore<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore = markers.into_iter().map(Into::into).collect();
        self
    }

    /// 惰性遍历所有文件
    ///
    /// 任何无法读取的目录或文件（包括失效的符号链接）都会产生错误项
    pub fn iter(&self) -> impl Iterator<Item = Result<FileContext>> + '_ {
        let base = if self.subpath.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&self.subpath)
        };

        WalkDir::new(base)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !self.is_ignored(entry))
            .filter_map(move |entry| match entry {
                Ok(entry) if entry.file_type().is_file() => Some(self.context(entry.path())),
                // 目录以及 FIFO、套接字等特殊文件
                Ok(_) => None,
                Err(e) if e.loop_ancestor().is_some() => {
                    warn!("Skipping symlink loop at {:?}", e.path());
                    None
                }
                Err(e) => Some(Err(anyhow::Error::new(e).context(format!(
                    "Failed to walk vault {:?}",
                    self.root
                )))),
            })
    }

    /// 遍历直到访问函数返回 `true`
    ///
    /// 命中后立即停止，不再进入后续目录
    ///
    /// # Returns
    ///
    /// 命中的文件上下文
    pub fn walk_until<F>(&self, mut visit: F) -> Result<Option<FileContext>>
    where
        F: FnMut(&FileContext) -> bool,
    {
        for ctx in self.iter() {
            let ctx = ctx?;
            if visit(&ctx) {
                return Ok(Some(ctx));
            }
        }
        Ok(None)
    }

    /// 文件或目录名是否以忽略前缀开头
    pub fn ignores(&self, name: &str) -> bool {
        self.ignore.iter().any(|marker| !marker.is_empty() && name.starts_with(marker.as_str()))
    }

    fn is_ignored(&self, entry: &DirEntry) -> bool {
        self.ignores(&entry.file_name().to_string_lossy())
    }

    fn context(&self, path: &Path) -> Result<FileContext> {
        let metadata = fs::metadata(path)
            .with_context(|| format!("Failed to stat {:?}", path))?;
        let modified = metadata
            .modified()
            .with_context(|| format!("Failed to read modification time of {:?}", path))?;
        let timestamp = mtime_millis(modified)
            .with_context(|| format!("Modification time of {:?} is out of range", path))?;

        let relative = path
            .strip_prefix(&self.root)
            .with_context(|| format!("{:?} is outside vault {:?}", path, self.root))?;
        let relpath = relative.to_string_lossy().replace('\\', "/");
        let (parent, name) = match relpath.rsplit_once('/') {
            Some((parent, name)) => (parent.to_string(), name.to_string()),
            None => (String::new(), relpath.clone()),
        };
        let (extension, short) = bisect(&name);

        Ok(FileContext {
            root: self.root.clone(),
            parent,
            name,
            path: path.to_path_buf(),
            relpath,
            extension,
            short,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel).unwrap();
    }

    fn relpaths(walker: &Walker) -> Vec<String> {
        walker.iter().map(|c| c.unwrap().relpath).collect()
    }

    #[test]
    fn test_bisect() {
        assert_eq!(bisect("note.md"), ("md".to_string(), "note".to_string()));
        assert_eq!(bisect("Photo.PNG"), ("png".to_string(), "Photo".to_string()));
        assert_eq!(bisect("archive.tar.gz"), ("gz".to_string(), "archive.tar".to_string()));
        assert_eq!(bisect("README"), (String::new(), "README".to_string()));
    }

    #[test]
    fn test_join_rel() {
        assert_eq!(join_rel("", "a"), "a");
        assert_eq!(join_rel("dir", "a"), "dir/a");
        assert_eq!(join_rel("dir", ""), "dir");
    }

    #[test]
    fn test_walk_skips_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "a.md");
        touch(root, "b/c.md");
        touch(root, "b/_draft.md");
        touch(root, ".obsidian/workspace.json");
        touch(root, "_templates/t.md");
        touch(root, "img/pic.png");

        let walker = Walker::new(root);
        assert_eq!(relpaths(&walker), vec!["a.md", "b/c.md", "img/pic.png"]);
    }

    #[test]
    fn test_walk_custom_ignore() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "a.md");
        touch(root, "_b.md");
        touch(root, "~tmp.md");

        let walker = Walker::new(root).ignore(["~"]);
        assert_eq!(relpaths(&walker), vec!["_b.md", "a.md"]);
    }

    #[test]
    fn test_ignores() {
        let walker = Walker::new("vault");
        assert!(walker.ignores(".obsidian"));
        assert!(walker.ignores("_drafts"));
        assert!(!walker.ignores("notes"));
        assert!(!Walker::new("vault").ignore(Vec::<String>::new()).ignores(".git"));
    }

    #[test]
    fn test_mtime_millis() {
        use std::time::Duration;

        assert_eq!(mtime_millis(UNIX_EPOCH + Duration::from_millis(2_500)).unwrap(), 2_500);
        assert_eq!(mtime_millis(UNIX_EPOCH - Duration::from_millis(1_500)).unwrap(), -1_500);
        assert_eq!(mtime_millis(UNIX_EPOCH).unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_follows_symlinked_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("vault");
        touch(&root, "a.md");
        touch(temp_dir.path(), "shared/b.md");
        std::os::unix::fs::symlink(temp_dir.path().join("shared"), root.join("linked")).unwrap();

        let walker = Walker::new(&root);
        assert_eq!(relpaths(&walker), vec!["a.md", "linked/b.md"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_skips_symlink_loop() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "dir/a.md");
        std::os::unix::fs::symlink(root.join("dir"), root.join("dir/again")).unwrap();

        let walker = Walker::new(root);
        assert_eq!(relpaths(&walker), vec!["dir/a.md"]);
    }

    #[test]
    fn test_walk_subpath() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "a.md");
        touch(root, "sub/x.md");
        touch(root, "sub/deep/y.md");

        let walker = Walker::new(root).subpath("sub");
        assert_eq!(relpaths(&walker), vec!["sub/deep/y.md", "sub/x.md"]);
    }

    #[test]
    fn test_file_context_fields() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "notes/Idea.MD");

        let ctx = Walker::new(root).iter().next().unwrap().unwrap();
        assert_eq!(ctx.parent, "notes");
        assert_eq!(ctx.name, "Idea.MD");
        assert_eq!(ctx.relpath, "notes/Idea.MD");
        assert_eq!(ctx.extension, "md");
        assert_eq!(ctx.short, "Idea");
        assert_eq!(ctx.display_path(), "notes/Idea");
        assert_eq!(ctx.path, root.join("notes/Idea.MD"));
        assert!(ctx.timestamp > 0);
        assert!(ctx.is_markdown());
    }

    #[test]
    fn test_walk_until_stops_early() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "a/target.md");
        touch(root, "b/other.md");

        let mut visited = Vec::new();
        let found = Walker::new(root)
            .walk_until(|ctx| {
                visited.push(ctx.relpath.clone());
                ctx.name == "target.md"
            })
            .unwrap();

        assert_eq!(found.unwrap().relpath, "a/target.md");
        assert_eq!(visited, vec!["a/target.md"]);
    }

    #[test]
    fn test_walk_missing_root_fails() {
        let temp_dir = TempDir::new().unwrap();
        let walker = Walker::new(temp_dir.path().join("nope"));
        assert!(walker.walk_until(|_| false).is_err());
    }
}
