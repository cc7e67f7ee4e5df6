//! In-batch deduplication of fetched items.
//!
//! One pass in input order; the first occurrence wins.
//!
//! - url present: kept unless the url was already seen.
//! - url absent, title present and unseen: kept, title recorded.
//! - otherwise: dropped when its [`RawItem::dedup_prefix`] contains, or is
//!   contained in, the prefix of any item accepted so far.

use std::collections::HashSet;

use aidigest_shared::RawItem;
use tracing::debug;

pub fn dedupe(items: Vec<RawItem>) -> Vec<RawItem> {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut seen_titles: HashSet<String> = HashSet::new();
    let mut accepted: Vec<RawItem> = Vec::with_capacity(items.len());
    // Prefixes of `accepted`, index-aligned.
    let mut prefixes: Vec<String> = Vec::with_capacity(items.len());

    for item in items {
        let keep = match &item.url {
            Some(url) => seen_urls.insert(url.clone()),
            None if !item.title.is_empty() && !seen_titles.contains(&item.title) => {
                seen_titles.insert(item.title.clone());
                true
            }
            None => {
                let prefix = item.dedup_prefix();
                !prefixes
                    .iter()
                    .any(|p| p.contains(prefix.as_str()) || prefix.contains(p.as_str()))
            }
        };

        if keep {
            prefixes.push(item.dedup_prefix());
            accepted.push(item);
        } else {
            debug!(title = %item.title, source = %item.source_name, "dropping duplicate item");
        }
    }

    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use aidigest_shared::SourceKind;

    fn item(title: &str, body: &str, url: Option<&str>) -> RawItem {
        let item = RawItem::new(SourceKind::Feed, "blog", title, body);
        match url {
            Some(u) => item.with_url(u),
            None => item,
        }
    }

    fn titles(items: &[RawItem]) -> Vec<&str> {
        items.iter().map(|i| i.title.as_str()).collect()
    }

    #[test]
    fn first_url_occurrence_wins() {
        let out = dedupe(vec![
            item("A", "a", Some("https://x.test/u1")),
            item("B", "b", Some("https://x.test/u1")),
            item("C", "c", Some("https://x.test/u2")),
        ]);
        assert_eq!(titles(&out), ["A", "C"]);
    }

    #[test]
    fn seen_url_is_dropped_even_with_new_title() {
        let out = dedupe(vec![
            item("Launch", "body", Some("https://x.test/1")),
            item("Launch (updated)", "other", Some("https://x.test/1")),
        ]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn urlless_items_dedupe_by_title() {
        let out = dedupe(vec![
            item("Same title", "first body", None),
            // Repeated title whose prefix is contained in the first item's.
            item("Same title", "first", None),
            item("Other title", "x", None),
        ]);
        assert_eq!(titles(&out), ["Same title", "Other title"]);
        assert_eq!(out[0].body, "first body");
    }

    #[test]
    fn repeated_title_with_new_body_is_kept() {
        let out = dedupe(vec![
            item("Same title", "first body", None),
            item("Same title", "completely different body", None),
        ]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn urlless_untitled_items_use_prefix_containment() {
        let long = "x".repeat(150);
        let out = dedupe(vec![
            item("", "Model weights released today", None),
            // Shorter prefix contained in the first.
            item("", "Model weights", None),
            // Longer prefix containing the first one's.
            item("", &format!("Model weights released today{long}"), None),
            item("", "Unrelated post", None),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].body, "Model weights released today");
        assert_eq!(out[1].body, "Unrelated post");
    }

    #[test]
    fn repeated_title_falls_back_to_containment() {
        // Title already seen, but the prefix differs from everything accepted.
        let out = dedupe(vec![
            item("Weekly", "issue one", None),
            item("Weekly", "issue two", None),
            item("Weekly", "issue one", None),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].body, "issue two");
    }

    #[test]
    fn url_items_take_part_in_containment() {
        let out = dedupe(vec![
            item("", "Shared announcement text", Some("https://x.test/a")),
            item("", "Shared announcement", None),
        ]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn empty_input() {
        assert!(dedupe(Vec::new()).is_empty());
    }
}
