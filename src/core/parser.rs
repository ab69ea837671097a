pub mod frontmatter;
pub mod wiki_link;

use crate::storage::Metadata;
use anyhow::Result;

pub use frontmatter::{parse_frontmatter, split_frontmatter};
pub use wiki_link::{encode_uri, transform_wiki_links, Resolution, WikiLink};

#[derive(Debug)]
pub struct ParsedDoc {
    pub metadata: Metadata,
    pub content: String,
}

/// Splits front matter off a markdown source and rewrites the body's wiki links.
pub fn parse_markdown<F>(source: &str, resolve: F) -> Result<ParsedDoc>
where
    F: FnMut(&str) -> Result<Resolution>,
{
    let (metadata, body) = parse_frontmatter(source)?;
    let content = transform_wiki_links(body, resolve)?;

    Ok(ParsedDoc { metadata, content })
}
