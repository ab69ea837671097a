//! 索引模块
//!
//! 遍历库目录，构建包含全部文档、附件与链接关系的索引
//!
//! ## 功能
//!
//! - 全量构建
//! - 基于修改时间的增量构建：未修改的条目连同出链原样沿用
//! - wiki 链接解析与改写
//! - 附件按内容摘要去重存储，清理不再被引用的对象

use crate::core::config::Config;
use crate::core::object::ObjectStore;
use crate::core::parser::{encode_uri, parse_markdown, Resolution};
use crate::core::walker::{bisect, FileContext, Walker};
use crate::source::prepare_vault;
use crate::storage::{codec, Attachment, Document, Index, IndexMetadata, Node, NodeKind};
use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// 索引器
///
/// 负责将库目录中的文件构建为索引
pub struct Indexer {
    /// 库根目录
    vault: PathBuf,
    /// 附件对象存储
    store: ObjectStore,
    /// 目录遍历器
    walker: Walker,
    /// 写入索引的元数据
    metadata: IndexMetadata,
    /// 是否沿用旧索引中未修改的条目
    reuse: bool,
}

impl Indexer {
    /// 创建新的索引器
    ///
    /// # Arguments
    ///
    /// * `vault` - 库根目录
    /// * `objects_dir` - 对象存储目录
    pub fn new(vault: impl Into<PathBuf>, objects_dir: impl Into<PathBuf>) -> Self {
        let vault = vault.into();
        Self {
            walker: Walker::new(vault.clone()),
            vault,
            store: ObjectStore::new(objects_dir),
            metadata: IndexMetadata::default(),
            reuse: true,
        }
    }

    /// 按配置创建索引器
    pub fn from_config(config: &Config, vault: impl Into<PathBuf>) -> Self {
        Self::new(vault, config.objects_dir())
            .with_metadata(config.metadata.clone())
            .with_ignore(config.ignore.clone())
    }

    /// 设置索引元数据
    pub fn with_metadata(mut self, metadata: IndexMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// 设置忽略前缀
    pub fn with_ignore(mut self, markers: Vec<String>) -> Self {
        self.walker = self.walker.ignore(markers);
        self
    }

    /// 强制全量构建
    ///
    /// 旧索引只用于清理对象，不沿用任何条目
    pub fn full(mut self, full: bool) -> Self {
        self.reuse = !full;
        self
    }

    /// 构建索引
    ///
    /// 任一文件处理失败都会中止整个构建
    ///
    /// # Arguments
    ///
    /// * `legacy` - 上一次构建的索引
    ///
    /// # Returns
    ///
    /// 新索引与构建汇总
    pub fn build(&self, legacy: Option<&Index>) -> Result<(Index, BuildSummary)> {
        let mut index = Index::new(self.metadata.clone());
        let mut summary = BuildSummary::default();

        let forward = legacy.map(Index::forward_links).unwrap_or_default();
        let mut matched: HashSet<&str> = HashSet::new();

        for ctx in self.walker.iter() {
            let ctx = ctx?;

            let prior = legacy.and_then(|l| l.object.get_key_value(&ctx.relpath));
            if let Some((key, entry)) = prior {
                matched.insert(key.as_str());

                if self.reuse && self.is_unchanged(entry, &ctx) {
                    debug!("Reusing {}", ctx.relpath);
                    index.object.insert(ctx.relpath.clone(), entry.clone());
                    for target in forward.get(key.as_str()).into_iter().flatten() {
                        if index.link_with(&ctx.relpath, target) {
                            summary.edges += 1;
                        }
                    }
                    summary.add(IndexResult::Reused);
                    continue;
                }
            }

            let result = self
                .build_object(&mut index, &ctx)
                .with_context(|| format!("Failed to index {}", ctx.relpath))?;
            summary.add(result);
        }

        if let Some(legacy) = legacy {
            let orphans = legacy
                .object
                .keys()
                .filter(|k| !matched.contains(k.as_str()))
                .count();
            summary.orphans = orphans;

            // 两个路径可能共享同一个对象，仍被引用的摘要不能删除
            let live = index.attachment_hashes();
            let superseded: BTreeSet<&str> = legacy
                .attachment_hashes()
                .into_iter()
                .filter(|h| !live.contains(h))
                .collect();
            summary.blobs_removed = self.store.remove_objects(superseded)?;
        }

        Ok((index, summary))
    }

    /// 构建单个文件的条目并写入索引
    ///
    /// Markdown 文件生成文档，其他文件生成附件
    pub fn build_object(&self, index: &mut Index, ctx: &FileContext) -> Result<IndexResult> {
        if ctx.is_markdown() {
            self.build_document(index, ctx)
        } else {
            self.build_attachment(index, ctx)
        }
    }

    fn is_unchanged(&self, entry: &Node, ctx: &FileContext) -> bool {
        if entry.timestamp() != ctx.timestamp {
            return false;
        }
        match entry {
            Node::Document(_) => ctx.is_markdown(),
            // 对象文件丢失时重新写入
            Node::Attachment(att) => !ctx.is_markdown() && self.store.contains(&att.hash),
        }
    }

    fn build_document(&self, index: &mut Index, ctx: &FileContext) -> Result<IndexResult> {
        let source = fs::read_to_string(&ctx.path)
            .with_context(|| format!("Failed to read {:?}", ctx.path))?;

        // 先收集出链，整篇文档解析成功后再写入索引
        let mut targets = Vec::new();
        let mut dangling = 0;
        let parsed = parse_markdown(&source, |href| {
            self.resolve(ctx, href, &mut targets, &mut dangling)
        })?;

        let mut edges = 0;
        for target in &targets {
            if index.link_with(&ctx.relpath, target) {
                edges += 1;
            }
        }

        let document = Document::new(
            ctx.short.clone(),
            encode_uri(&ctx.display_path()),
            parsed.metadata,
            parsed.content,
        )
        .with_timestamp(ctx.timestamp);
        index.object.insert(ctx.relpath.clone(), Node::Document(document));

        debug!("Indexed document {} ({} links)", ctx.relpath, edges);
        Ok(IndexResult::Built {
            kind: NodeKind::Document,
            edges,
            dangling,
            written: false,
        })
    }

    fn build_attachment(&self, index: &mut Index, ctx: &FileContext) -> Result<IndexResult> {
        let content = fs::read(&ctx.path)
            .with_context(|| format!("Failed to read {:?}", ctx.path))?;
        let (hash, written) = self.store.write_object(&content)?;

        let attachment = Attachment::new(
            ctx.short.clone(),
            hash,
            ctx.relpath.clone(),
            ctx.extension.clone(),
        )
        .with_timestamp(ctx.timestamp);
        index.object.insert(ctx.relpath.clone(), Node::Attachment(attachment));

        debug!("Indexed attachment {}", ctx.relpath);
        Ok(IndexResult::Built {
            kind: NodeKind::Attachment,
            edges: 0,
            dangling: 0,
            written,
        })
    }

    /// 解析链接目标
    ///
    /// - 无扩展名时视为 `.md`
    /// - 指向自身（或为空）时直接返回当前文档路径
    /// - 含 `/` 的目标相对库根目录解析
    /// - 不含 `/` 的目标遍历整个库，取第一个同名文件
    ///
    /// 只有指向 Markdown 文档的目标才会记录到 `targets`
    fn resolve(
        &self,
        ctx: &FileContext,
        href: &str,
        targets: &mut Vec<String>,
        dangling: &mut usize,
    ) -> Result<Resolution> {
        let (path, fragment) = match href.split_once('#') {
            Some((path, fragment)) => (path, Some(fragment)),
            None => (href, None),
        };
        let path = path.trim().trim_start_matches('/');
        let with_fragment = |p: String| match fragment {
            Some(f) if !f.is_empty() => format!("{}#{}", p, f),
            _ => p,
        };

        let last = path.rsplit('/').next().unwrap_or(path);
        let (extension, _) = bisect(last);
        let needle = if extension.is_empty() {
            format!("{}.md", path)
        } else {
            path.to_string()
        };

        if path.is_empty() || needle == ctx.name || needle == ctx.relpath {
            return Ok(Resolution::new(
                with_fragment(ctx.display_path()),
                Some(ctx.short.clone()),
            ));
        }

        if !needle.contains('/') {
            let found = self
                .walker
                .walk_until(|candidate| candidate.name == needle)
                .with_context(|| format!("Failed to resolve link [[{}]]", href))?;

            return Ok(match found {
                Some(target) if target.is_markdown() => {
                    targets.push(target.relpath.clone());
                    Resolution::new(with_fragment(target.display_path()), Some(target.short))
                }
                Some(target) => Resolution::new(with_fragment(target.relpath), Some(target.short)),
                None => {
                    warn!("{}: unresolved link [[{}]]", ctx.relpath, href);
                    *dangling += 1;
                    Resolution::new(with_fragment(path.to_string()), None)
                }
            });
        }

        if !self.exists_in_vault(&needle) {
            warn!("{}: unresolved link [[{}]]", ctx.relpath, href);
            *dangling += 1;
            return Ok(Resolution::new(with_fragment(path.to_string()), None));
        }

        let (extension, short) = bisect(&needle);
        if extension == "md" {
            targets.push(needle.clone());
            return Ok(Resolution::new(with_fragment(short), None));
        }
        Ok(Resolution::new(with_fragment(needle), None))
    }

    /// 目标文件存在于库中且不在忽略路径下
    fn exists_in_vault(&self, relpath: &str) -> bool {
        let ignored = relpath
            .split('/')
            .any(|segment| segment.is_empty() || segment == ".." || self.walker.ignores(segment));
        !ignored && self.vault.join(relpath).is_file()
    }
}

/// 运行一次完整构建
///
/// 准备库目录、读取旧索引、构建并写出新索引
///
/// # Arguments
///
/// * `config` - 构建配置
/// * `full` - 是否忽略旧索引中的条目
pub fn build_vault(config: &Config, full: bool) -> Result<BuildSummary> {
    if let Some(name) = &config.name {
        info!("Building {}", name);
    }

    let vault = prepare_vault(&config.vault)?;
    let index_path = config.index_path();
    let legacy = match codec::read_index(&index_path) {
        Ok(legacy) => legacy,
        // 全量构建不依赖旧索引，无法解码时直接丢弃
        Err(e) if full => {
            warn!("Discarding unreadable index: {:#}", e);
            None
        }
        Err(e) => return Err(e),
    };

    match (&legacy, full) {
        (None, _) => info!("No index at {:?}, building from scratch", index_path),
        (Some(_), true) => info!("Full rebuild requested"),
        (Some(legacy), false) => info!("Incremental build over {} entries", legacy.object.len()),
    }

    let indexer = Indexer::from_config(config, vault).full(full);
    let (index, summary) = indexer.build(legacy.as_ref())?;

    codec::write_index(&index_path, &index)?;
    info!("Wrote index with {} entries to {:?}", index.object.len(), index_path);
    info!("{}", summary);

    Ok(summary)
}

/// 单个文件的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum IndexResult {
    /// 重新构建
    Built {
        /// 节点类型
        kind: NodeKind,
        /// 新增的边数
        edges: usize,
        /// 无法解析的链接数
        dangling: usize,
        /// 是否写入了新的对象文件
        written: bool,
    },
    /// 沿用旧条目
    Reused,
}

/// 构建汇总
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BuildSummary {
    /// 重新构建的文档数
    pub documents: usize,
    /// 重新构建的附件数
    pub attachments: usize,
    /// 沿用的条目数
    pub reused: usize,
    /// 新写入的对象文件数
    pub blobs_written: usize,
    /// 删除的对象文件数
    pub blobs_removed: usize,
    /// 登记的边数
    pub edges: usize,
    /// 无法解析的链接数
    pub dangling: usize,
    /// 旧索引中未被访问到的条目数
    pub orphans: usize,
}

impl BuildSummary {
    /// 添加单个文件的处理结果
    pub fn add(&mut self, result: IndexResult) {
        match result {
            IndexResult::Built { kind, edges, dangling, written } => {
                match kind {
                    NodeKind::Document => self.documents += 1,
                    NodeKind::Attachment => self.attachments += 1,
                }
                self.edges += edges;
                self.dangling += dangling;
                if written {
                    self.blobs_written += 1;
                }
            }
            IndexResult::Reused => self.reused += 1,
        }
    }

    /// 处理过的文件总数
    pub fn files(&self) -> usize {
        self.documents + self.attachments + self.reused
    }
}

impl std::fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} files ({} documents, {} attachments built, {} reused), {} links ({} unresolved), {} objects written, {} removed, {} orphans",
            self.files(),
            self.documents,
            self.attachments,
            self.reused,
            self.edges,
            self.dangling,
            self.blobs_written,
            self.blobs_removed,
            self.orphans,
        )
    }
}
