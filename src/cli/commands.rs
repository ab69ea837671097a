use super::*;
use crate::core::config::Config;
use crate::core::indexer::build_vault;
use crate::storage::{read_index, Index, Node};
use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::info;

pub fn build(config_path: &Path, args: BuildArgs) -> Result<()> {
    let config = Config::load(config_path)?;
    if args.full {
        info!("Full build of {:?}", config.vault);
    } else {
        info!("Incremental build of {:?}", config.vault);
    }

    let summary = build_vault(&config, args.full)?;

    // 打印结果
    println!("\n=== Build Summary ===");
    println!("Documents built:    {}", summary.documents);
    println!("Attachments built:  {}", summary.attachments);
    println!("Entries reused:     {}", summary.reused);
    println!("Objects written:    {}", summary.blobs_written);
    println!("Objects removed:    {}", summary.blobs_removed);
    println!("Links registered:   {}", summary.edges);
    println!("Unresolved links:   {}", summary.dangling);
    Ok(())
}

pub fn show(config_path: &Path, args: ShowArgs) -> Result<()> {
    let index = open_index(config_path)?;

    let Some(path) = args.path else {
        let documents = index
            .object
            .values()
            .filter(|n| matches!(n, Node::Document(_)))
            .count();
        println!("Entries:     {}", index.object.len());
        println!("Documents:   {}", documents);
        println!("Attachments: {}", index.object.len() - documents);
        println!("Links:       {}", index.edge_count());
        return Ok(());
    };

    let node = match index.get_object(&path) {
        Some(node) => node,
        None => bail!("{}: not found in index", path),
    };
    println!("{}", describe(node));
    println!("{}", serde_json::to_string_pretty(node)?);
    Ok(())
}

/// 节点的一行摘要：文档显示标题，附件显示媒体类型
fn describe(node: &Node) -> String {
    match node {
        Node::Document(doc) => format!("Document \"{}\" at /{}", doc.title(), doc.path),
        Node::Attachment(att) => format!("Attachment ({}) {}", att.media(), att.hash),
    }
}

pub fn links(config_path: &Path, args: LinksArgs) -> Result<()> {
    let index = open_index(config_path)?;

    // 已删除的目标仍可能被未修改的文档引用，不要求它存在于 object 中
    let backlinks = index.backlinks(&args.path);
    if backlinks.is_empty() {
        println!("No documents link to {}", args.path);
    }
    for source in backlinks {
        println!("{}", source);
    }
    Ok(())
}

fn open_index(config_path: &Path) -> Result<Index> {
    let config = Config::load(config_path)?;
    let index_path = config.index_path();
    read_index(&index_path)?
        .with_context(|| format!("No index at {:?}, run `vaultpack build` first", index_path))
}
