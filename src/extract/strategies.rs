//! The three extraction strategies plus page-metadata harvesting.
//!
//! Parsing is synchronous: `scraper::Html` is not `Send`, so each strategy
//! awaits the page body first and only then builds the DOM.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use super::fetch::Page;
use super::{ExtractionStrategy, StrategyOutput};

fn sel(s: &str) -> Selector {
    Selector::parse(s).expect("static selector")
}

/// Collapse all whitespace runs to one space.
fn squash(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn text_of(el: ElementRef<'_>) -> String {
    squash(&el.text().collect::<Vec<_>>().join(" "))
}

fn meta_content(doc: &Html, selector: &str) -> Option<String> {
    doc.select(&sel(selector))
        .next()
        .and_then(|m| m.value().attr("content"))
        .map(squash)
        .filter(|s| !s.is_empty())
}

fn document_title(doc: &Html) -> String {
    doc.select(&sel("title"))
        .next()
        .map(text_of)
        .filter(|s| !s.is_empty())
        .or_else(|| doc.select(&sel("h1")).next().map(text_of))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// structured
// ---------------------------------------------------------------------------

/// JSON-LD `NewsArticle`/`Article` first, `<article>` paragraphs second.
pub struct StructuredStrategy;

#[async_trait]
impl ExtractionStrategy for StructuredStrategy {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn harvests_metadata(&self) -> bool {
        true
    }

    async fn extract(&self, page: &Page) -> Result<Option<StrategyOutput>> {
        let html = page.body().await?;
        Ok(parse_structured(html))
    }
}

fn is_article_type(v: &Value) -> bool {
    let is_article = |t: &str| matches!(t, "NewsArticle" | "Article" | "ReportageNewsArticle");
    match v.get("@type") {
        Some(Value::String(t)) => is_article(t.as_str()),
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).any(is_article),
        _ => false,
    }
}

/// Walks plain objects, top-level arrays and `@graph` lists.
fn find_article_ld(v: &Value) -> Option<&Value> {
    match v {
        Value::Array(items) => items.iter().find_map(find_article_ld),
        Value::Object(map) => {
            if is_article_type(v) {
                return Some(v);
            }
            map.get("@graph").and_then(find_article_ld)
        }
        _ => None,
    }
}

fn ld_names(v: Option<&Value>) -> Vec<String> {
    let names: Vec<String> = match v {
        Some(Value::String(s)) => vec![squash(s)],
        Some(Value::Object(o)) => o
            .get("name")
            .and_then(Value::as_str)
            .map(|s| vec![squash(s)])
            .unwrap_or_default(),
        Some(Value::Array(items)) => items.iter().flat_map(|i| ld_names(Some(i))).collect(),
        _ => Vec::new(),
    };
    names.into_iter().filter(|s| !s.is_empty()).collect()
}

fn ld_keywords(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::String(s)) => split_keywords(s),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(squash)
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn split_keywords(s: &str) -> Vec<String> {
    s.split(',')
        .map(squash)
        .filter(|k| !k.is_empty())
        .collect()
}

fn ld_str(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(Value::as_str)
        .map(squash)
        .filter(|s| !s.is_empty())
}

pub(crate) fn parse_structured(html: &str) -> Option<StrategyOutput> {
    let doc = Html::parse_document(html);
    let mut out = StrategyOutput::default();

    let ld = doc
        .select(&sel(r#"script[type="application/ld+json"]"#))
        .filter_map(|s| serde_json::from_str::<Value>(&s.text().collect::<String>()).ok())
        .find_map(|v| find_article_ld(&v).cloned());

    if let Some(item) = &ld {
        out.title = ld_str(item, "headline").unwrap_or_default();
        out.content = item
            .get("articleBody")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        out.authors = ld_names(item.get("author"));
        out.publish_date = ld_str(item, "datePublished");
        out.description = ld_str(item, "description");
        out.keywords = ld_keywords(item.get("keywords"));
    }

    if out.content.is_empty() {
        let paragraphs: Vec<String> = doc
            .select(&sel("article p"))
            .map(text_of)
            .filter(|t| !t.is_empty())
            .collect();
        out.content = paragraphs.join("\n\n");
    }

    if out.title.is_empty() {
        out.title = meta_content(&doc, r#"meta[property="og:title"]"#)
            .unwrap_or_else(|| document_title(&doc));
    }

    if ld.is_none() && out.content.is_empty() {
        return None;
    }
    Some(out)
}

// ---------------------------------------------------------------------------
// boilerplate
// ---------------------------------------------------------------------------

const BOILERPLATE_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "form", "noscript",
];

/// Picks the element whose direct `<p>` children carry the most text,
/// ignoring anything under navigation/chrome elements.
pub struct BoilerplateStrategy;

#[async_trait]
impl ExtractionStrategy for BoilerplateStrategy {
    fn name(&self) -> &'static str {
        "boilerplate"
    }

    async fn extract(&self, page: &Page) -> Result<Option<StrategyOutput>> {
        let html = page.body().await?;
        Ok(parse_boilerplate(html))
    }
}

fn in_boilerplate(el: &ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| BOILERPLATE_TAGS.contains(&a.value().name()))
}

pub(crate) fn parse_boilerplate(html: &str) -> Option<StrategyOutput> {
    let doc = Html::parse_document(html);

    let mut scores = HashMap::new();
    for p in doc.select(&sel("p")) {
        if in_boilerplate(&p) {
            continue;
        }
        let Some(parent) = p.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        let len = text_of(p).chars().count();
        scores.entry((*parent).id()).or_insert((parent, 0usize)).1 += len;
    }

    let (best, _) = scores.into_values().max_by_key(|(_, score)| *score)?;
    let paragraphs: Vec<String> = best
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|c| c.value().name() == "p")
        .map(text_of)
        .filter(|t| !t.is_empty())
        .collect();

    Some(StrategyOutput {
        title: document_title(&doc),
        content: paragraphs.join("\n\n"),
        ..StrategyOutput::default()
    })
}

// ---------------------------------------------------------------------------
// readability
// ---------------------------------------------------------------------------

/// Last resort: the whole document rendered to text.
pub struct ReadabilityStrategy;

#[async_trait]
impl ExtractionStrategy for ReadabilityStrategy {
    fn name(&self) -> &'static str {
        "readability"
    }

    async fn extract(&self, page: &Page) -> Result<Option<StrategyOutput>> {
        let html = page.body().await?;
        Ok(parse_readability(html))
    }
}

pub(crate) fn parse_readability(html: &str) -> Option<StrategyOutput> {
    let title = document_title(&Html::parse_document(html));
    let text = squash(&html2text::from_read(html.as_bytes(), 120));
    if text.is_empty() {
        return None;
    }
    Some(StrategyOutput {
        title,
        content: text,
        ..StrategyOutput::default()
    })
}

// ---------------------------------------------------------------------------
// metadata
// ---------------------------------------------------------------------------

/// OpenGraph / meta-tag fields used to fill gaps after a non-structured win.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub published: Option<String>,
    pub authors: Vec<String>,
    pub keywords: Vec<String>,
}

pub fn page_metadata(html: &str) -> PageMetadata {
    let doc = Html::parse_document(html);
    PageMetadata {
        title: meta_content(&doc, r#"meta[property="og:title"]"#),
        description: meta_content(&doc, r#"meta[property="og:description"]"#)
            .or_else(|| meta_content(&doc, r#"meta[name="description"]"#)),
        published: meta_content(&doc, r#"meta[property="article:published_time"]"#),
        authors: doc
            .select(&sel(r#"meta[property="article:author"], meta[name="author"]"#))
            .filter_map(|m| m.value().attr("content"))
            .map(squash)
            .filter(|s| !s.is_empty())
            .collect(),
        keywords: meta_content(&doc, r#"meta[name="keywords"]"#)
            .map(|k| split_keywords(&k))
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LD_PAGE: &str = r#"<html><head><title>Site | Story</title>
<script type="application/ld+json">
{"@context":"https://schema.org","@graph":[
  {"@type":"WebSite","name":"Site"},
  {"@type":"NewsArticle","headline":"Bridge reopens after repairs",
   "articleBody":"The bridge reopened on Monday after a year of repairs. Officials said traffic would return to normal within a week.",
   "author":[{"@type":"Person","name":"Ana Ruiz"},{"@type":"Person","name":"Tom Lee"}],
   "datePublished":"2024-03-04T08:00:00Z","keywords":"bridge, traffic"}
]}
</script></head><body><p>ignored</p></body></html>"#;

    #[test]
    fn structured_reads_json_ld_graph() {
        let out = parse_structured(LD_PAGE).unwrap();
        assert_eq!(out.title, "Bridge reopens after repairs");
        assert!(out.content.starts_with("The bridge reopened"));
        assert_eq!(out.authors, vec!["Ana Ruiz", "Tom Lee"]);
        assert_eq!(out.publish_date.as_deref(), Some("2024-03-04T08:00:00Z"));
        assert_eq!(out.keywords, vec!["bridge", "traffic"]);
    }

    #[test]
    fn structured_falls_back_to_article_paragraphs() {
        let html = "<html><body><article><h1>T</h1><p>First   para.</p><p>Second para.</p></article></body></html>";
        let out = parse_structured(html).unwrap();
        assert_eq!(out.content, "First para.\n\nSecond para.");
        assert_eq!(out.title, "T");
    }

    #[test]
    fn structured_without_any_signal_is_none() {
        assert!(parse_structured("<html><body><div>x</div></body></html>").is_none());
    }

    #[test]
    fn boilerplate_skips_nav_and_picks_densest_block() {
        let html = r#"<html><head><title>Story</title></head><body>
<nav><div><p>Home</p><p>World news and a long menu entry that should never be picked up by anything</p></div></nav>
<div id="side"><p>short</p></div>
<div id="main"><p>Paragraph one has several words in it.</p><p>Paragraph two adds more.</p></div>
<footer><p>Copyright notice that is also rather long but lives in the footer region</p></footer>
</body></html>"#;
        let out = parse_boilerplate(html).unwrap();
        assert_eq!(
            out.content,
            "Paragraph one has several words in it.\n\nParagraph two adds more."
        );
        assert_eq!(out.title, "Story");
    }

    #[test]
    fn readability_collapses_whitespace() {
        let out = parse_readability("<html><body><div>Hello\n\n   world</div></body></html>").unwrap();
        assert!(out.content.contains("Hello world"));
    }

    #[test]
    fn metadata_reads_opengraph() {
        let html = r#"<html><head>
<meta property="og:title" content="OG Title">
<meta property="og:description" content="OG desc">
<meta property="article:published_time" content="2024-01-02T03:04:05Z">
<meta property="article:author" content="Kim Park">
<meta name="keywords" content="a, b ,c">
</head><body></body></html>"#;
        let m = page_metadata(html);
        assert_eq!(m.title.as_deref(), Some("OG Title"));
        assert_eq!(m.description.as_deref(), Some("OG desc"));
        assert_eq!(m.published.as_deref(), Some("2024-01-02T03:04:05Z"));
        assert_eq!(m.authors, vec!["Kim Park"]);
        assert_eq!(m.keywords, vec!["a", "b", "c"]);
    }
}
