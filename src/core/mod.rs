pub mod config;
pub mod indexer;
pub mod object;
pub mod parser;
pub mod walker;

// 重新导出 config 模块中的公共 API
pub use config::{Config, S3Config, VaultConfig};

// 重新导出 parser 模块中的公共 API
pub use parser::{
    parse_markdown, ParsedDoc, Resolution, WikiLink,
    frontmatter::{parse_frontmatter, split_frontmatter},
    wiki_link::{encode_uri, transform_wiki_links},
};

// 重新导出 indexer 模块中的公共 API
pub use indexer::{build_vault, BuildSummary, IndexResult, Indexer};

pub use object::{hash_content, is_digest, ObjectStore};
pub use walker::{FileContext, Walker};
