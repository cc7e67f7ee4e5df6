//! Paper index adapter (arXiv query API).
//!
//! `source_url` is a full arXiv API query URL returning Atom, e.g.
//! `http://export.arxiv.org/api/query?search_query=cat:cs.AI&sortBy=submittedDate`.
//! Title, authors, primary category and abstract form the body; the url is
//! the abstract page.

use std::sync::Arc;

use aidigest_shared::{AiDigestError, RawItem, Result, SourceConfig, SourceKind};
use async_trait::async_trait;
use feed_rs::model::Entry;

use super::SourceAdapter;
use crate::http::HttpClient;
use crate::text::{clean_markup, collapse_whitespace};

/// Authors listed before the rest are summarized as "et al.".
const MAX_AUTHORS: usize = 5;

pub struct PaperAdapter {
    http: Arc<HttpClient>,
    max_items: usize,
}

impl PaperAdapter {
    pub fn new(http: Arc<HttpClient>, max_items: usize) -> Self {
        Self { http, max_items }
    }
}

#[async_trait]
impl SourceAdapter for PaperAdapter {
    fn name(&self) -> &str {
        "paper"
    }

    async fn try_fetch(&self, source: &SourceConfig) -> Result<Vec<RawItem>> {
        let body = self.http.get_text(&source.source_url).await?;
        parse_papers(&body, source, self.max_items)
    }
}

pub(crate) fn parse_papers(content: &str, source: &SourceConfig, max_items: usize) -> Result<Vec<RawItem>> {
    let feed = feed_rs::parser::parse(content.as_bytes())
        .map_err(|e| AiDigestError::parse(format!("failed to parse arXiv response: {e}")))?;

    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| paper_to_item(entry, source))
        .take(max_items)
        .collect())
}

fn paper_to_item(entry: Entry, source: &SourceConfig) -> Option<RawItem> {
    // arXiv titles wrap across lines.
    let title = collapse_whitespace(&entry.title.as_ref()?.content);
    let abstract_text = clean_markup(&entry.summary.as_ref()?.content);
    if title.is_empty() || abstract_text.is_empty() {
        return None;
    }

    let mut authors: Vec<&str> = entry
        .authors
        .iter()
        .take(MAX_AUTHORS)
        .map(|a| a.name.as_str())
        .collect();
    if entry.authors.len() > MAX_AUTHORS {
        authors.push("et al.");
    }
    let category = entry
        .categories
        .first()
        .map(|c| c.term.as_str())
        .unwrap_or("unknown");

    let body = format!(
        "Title: {title}\nAuthors: {}\nCategory: {category}\n\nAbstract: {abstract_text}",
        authors.join(", ")
    );

    let url = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.clone())
        .unwrap_or_else(|| entry.id.clone());

    Some(
        RawItem::new(SourceKind::Paper, &source.source_name, title, body)
            .with_url(url)
            .with_published_at(entry.published.or(entry.updated)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATOM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query</title>
  <id>http://arxiv.org/api/query</id>
  <updated>2026-10-15T00:00:00Z</updated>
  <entry>
    <id>http://arxiv.org/abs/2610.00001v1</id>
    <updated>2026-10-15T00:00:00Z</updated>
    <published>2026-10-14T17:00:00Z</published>
    <title>Scaling Laws for
      Sparse Mixtures</title>
    <summary>  We study how sparse mixtures scale.
    </summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
    <link href="http://arxiv.org/abs/2610.00001v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2610.00001v1" rel="related" type="application/pdf"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2610.00002v1</id>
    <updated>2026-10-15T00:00:00Z</updated>
    <title>No abstract here</title>
  </entry>
</feed>"#;

    #[test]
    fn parses_arxiv_entries() {
        let source = SourceConfig::new(SourceKind::Paper, "arXiv AI/ML Papers", "http://arxiv.test");
        let items = parse_papers(ATOM, &source, 10).expect("parse");
        assert_eq!(items.len(), 1);

        let paper = &items[0];
        assert_eq!(paper.title, "Scaling Laws for Sparse Mixtures");
        assert_eq!(paper.url.as_deref(), Some("http://arxiv.org/abs/2610.00001v1"));
        assert!(paper.body.contains("Authors: Ada Lovelace, Alan Turing"));
        assert!(paper.body.contains("Category: cs.LG"));
        assert!(paper.body.ends_with("We study how sparse mixtures scale."));
        assert_eq!(paper.source_type, SourceKind::Paper);
    }
}
