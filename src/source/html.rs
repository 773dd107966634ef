use std::collections::BTreeMap;

use scraper::{Html, Selector};

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Outer HTML of the issue's description block, with the quote/edit links
/// container detached from the tree before serializing.
pub fn description_block(page: &str) -> Option<String> {
    let mut document = Html::parse_document(page);
    let description = selector("div.description")?;
    let contextual = document
        .select(&description)
        .next()?
        .select(&selector("div.contextual")?)
        .next()
        .map(|el| el.id());
    if let Some(mut node) = contextual.and_then(|id| document.tree.get_mut(id)) {
        node.detach();
    }
    document.select(&description).next().map(|el| el.html())
}

/// Outer HTML of each requested journal body, keyed by journal id. Ids whose
/// block is absent from the page are left out.
pub fn note_blocks(page: &str, note_ids: &[u64]) -> BTreeMap<u64, String> {
    let document = Html::parse_document(page);
    let history = selector("div.tab-content").and_then(|s| document.select(&s).next());

    note_ids
        .iter()
        .filter_map(|id| {
            let sel = selector(&format!("div[id=\"journal-{id}-notes\"]"))?;
            let found = match history {
                Some(block) => block.select(&sel).next(),
                None => document.select(&sel).next(),
            };
            found.map(|el| (*id, el.html()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::tests::redmine_page;

    #[test]
    fn description_drops_contextual_links() {
        let html = description_block(&redmine_page(&[])).unwrap();
        assert!(html.starts_with("<div class=\"description\">"));
        assert!(html.contains("/attachments/download/31/trace.log"));
        assert!(!html.contains("contextual"));
        assert!(!html.contains("Quote"));
    }

    #[test]
    fn nested_contextual_is_detached_and_content_kept() {
        let page = "<html><body><div class=\"description\">\
                    <div class=\"wiki\"><div id=\"ctx\" class=\"contextual\" title=\"edit\">\
                    <a href=\"/quote\">Quote</a></div><p>Body &amp; more</p></div>\
                    <p>Tail</p></div></body></html>";
        let html = description_block(page).unwrap();
        assert!(!html.contains("ctx"));
        assert!(!html.contains("Quote"));
        assert!(html.contains("<p>Body &amp; more</p>"));
        assert!(html.contains("<p>Tail</p>"));
        assert!(html.ends_with("</div>"));
    }

    #[test]
    fn description_missing_is_none() {
        assert_eq!(description_block("<html><body><p>x</p></body></html>"), None);
    }

    #[test]
    fn notes_are_found_by_journal_id() {
        let blocks = note_blocks(&redmine_page(&[501, 502]), &[501, 502, 999]);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[&501].contains("note 501"));
        assert!(blocks[&502].starts_with("<div "));
        assert!(blocks[&502].contains("journal-502-notes"));
    }

    #[test]
    fn notes_outside_history_tab_are_still_found_without_one() {
        let page = "<html><body><div id=\"journal-4-notes\"><p>hi</p></div></body></html>";
        let blocks = note_blocks(page, &[4]);
        assert!(blocks[&4].contains("hi"));
    }
}
