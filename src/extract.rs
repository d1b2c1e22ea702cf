//! Main-content extraction from HTML pages.
//!
//! The extension's content script runs the same heuristic in the page; the
//! [`ExtractionPolicy`] is the part that travels between the two as data.
//! Containers are tried in priority order and the first one with enough
//! visible text wins, falling back to `<body>`. Denylisted subtrees never
//! contribute text.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::truncate_chars;

// Create static selectors to avoid recompiling them each time
static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("body").expect("Failed to parse body selector")
});

static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("title").expect("Failed to parse title selector")
});

static DESCRIPTION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[name="description"], meta[property="og:description"]"#)
        .expect("Failed to parse description selector")
});

/// Elements whose content is never rendered as text.
const INVISIBLE_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "iframe", "canvas", "head",
];

/// Elements that start a new line in rendered text.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "ol",
    "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Invalid CSS selector in extraction policy: {0}")]
    InvalidSelector(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionPolicy {
    /// Main-content container selectors, highest priority first.
    pub content_selectors: Vec<String>,
    /// Subtrees removed from the chosen container.
    pub excluded_selectors: Vec<String>,
    /// Visible characters a container needs before it is preferred over `<body>`.
    pub min_container_chars: usize,
    pub max_chars: Option<usize>,
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        Self {
            content_selectors: owned(&[
                "article",
                "main",
                r#"[role="main"]"#,
                "#main-content",
                "#content",
                ".post-content",
                ".article-content",
                ".article-body",
                ".entry-content",
                ".content",
            ]),
            excluded_selectors: owned(&[
                "nav",
                "aside",
                "footer",
                r#"[role="navigation"]"#,
                r#"[role="complementary"]"#,
                "[hidden]",
                r#"[aria-hidden="true"]"#,
                ".ad",
                ".ads",
                ".advert",
                ".advertisement",
                ".sponsored",
                "#comments",
                ".comments",
                ".comment-section",
                "#disqus_thread",
                ".share",
                ".sharing",
                ".social-share",
                ".share-buttons",
                ".related-posts",
                ".newsletter-signup",
                ".cookie-banner",
            ]),
            min_container_chars: 200,
            max_chars: Some(50_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: String,
    /// Whether `content` was cut to the character limit.
    pub truncated: bool,
}

/// A compiled [`ExtractionPolicy`].
pub struct PageExtractor {
    policy: ExtractionPolicy,
    containers: Vec<Selector>,
    excluded: Vec<Selector>,
}

impl PageExtractor {
    pub fn new(policy: ExtractionPolicy) -> Result<Self, ExtractError> {
        let containers = compile(&policy.content_selectors)?;
        let excluded = compile(&policy.excluded_selectors)?;
        Ok(Self {
            policy,
            containers,
            excluded,
        })
    }

    pub fn policy(&self) -> &ExtractionPolicy {
        &self.policy
    }

    pub fn extract(&self, html: &str) -> ExtractedPage {
        self.extract_with_limit(html, self.policy.max_chars)
    }

    pub fn extract_with_limit(&self, html: &str, max_chars: Option<usize>) -> ExtractedPage {
        let document = Html::parse_document(html);

        let title = document
            .select(&TITLE_SELECTOR)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty());

        let description = document
            .select(&DESCRIPTION_SELECTOR)
            .filter_map(|el| el.value().attr("content"))
            .map(collapse_whitespace)
            .find(|d| !d.is_empty());

        let mut content = self.main_text(&document);
        let mut truncated = false;
        if let Some(limit) = max_chars {
            let cut = truncate_chars(&content, limit);
            if cut.len() < content.len() {
                content = cut.to_string();
                truncated = true;
            }
        }

        ExtractedPage {
            title,
            description,
            content,
            truncated,
        }
    }

    fn main_text(&self, document: &Html) -> String {
        for selector in &self.containers {
            for container in document.select(selector) {
                if self.inside_excluded(container) {
                    continue;
                }
                let text = self.visible_text(container);
                if text.chars().count() >= self.policy.min_container_chars {
                    return text;
                }
            }
        }

        let root = document
            .select(&BODY_SELECTOR)
            .next()
            .unwrap_or_else(|| document.root_element());
        self.visible_text(root)
    }

    fn visible_text(&self, root: ElementRef<'_>) -> String {
        let mut raw = String::new();
        self.collect_text(root, &mut raw);
        format_text(&raw)
    }

    /// Walks the subtree with an explicit stack so nesting depth is bounded
    /// by the heap, not the thread stack.
    fn collect_text(&self, root: ElementRef<'_>, out: &mut String) {
        let mut stack = vec![Walk::Element(root)];

        while let Some(step) = stack.pop() {
            let element = match step {
                Walk::Element(element) => element,
                Walk::Text(text) => {
                    // source line breaks inside inline text are plain spaces
                    out.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
                    continue;
                }
                Walk::Break => {
                    out.push('\n');
                    continue;
                }
            };

            for child in element.children().rev() {
                if let Some(child_el) = ElementRef::wrap(child) {
                    let name = child_el.value().name();
                    if INVISIBLE_TAGS.contains(&name) || self.is_excluded(child_el) {
                        continue;
                    }
                    if BLOCK_TAGS.contains(&name) {
                        stack.push(Walk::Break);
                        stack.push(Walk::Element(child_el));
                        stack.push(Walk::Break);
                    } else {
                        stack.push(Walk::Element(child_el));
                    }
                } else if let Some(text) = child.value().as_text() {
                    stack.push(Walk::Text(&**text));
                }
            }
        }
    }

    /// True when the element or any of its ancestors is denylisted.
    fn inside_excluded(&self, element: ElementRef<'_>) -> bool {
        self.is_excluded(element)
            || element
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|ancestor| self.is_excluded(ancestor))
    }

    fn is_excluded(&self, element: ElementRef<'_>) -> bool {
        self.excluded.iter().any(|selector| selector.matches(&element))
    }
}

enum Walk<'a> {
    Element(ElementRef<'a>),
    Text(&'a str),
    Break,
}

fn compile(selectors: &[String]) -> Result<Vec<Selector>, ExtractError> {
    selectors
        .iter()
        .map(|s| Selector::parse(s).map_err(|_| ExtractError::InvalidSelector(s.clone())))
        .collect()
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trims every line, collapses inner whitespace and drops empty lines.
fn format_text(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    for line in raw.lines() {
        let line = collapse_whitespace(line);
        if line.is_empty() {
            continue;
        }
        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str(&line);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> PageExtractor {
        PageExtractor::new(ExtractionPolicy::default()).unwrap()
    }

    fn long_paragraph(words: usize) -> String {
        (0..words).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn article_wins_and_sibling_nav_is_dropped() {
        let body = long_paragraph(120);
        assert!(body.len() > 500);
        let html = format!(
            "<html><head><title>Story</title></head><body>\
             <nav><a href='/'>Home</a> <a href='/about'>About us</a></nav>\
             <article><h1>Headline</h1><p>{}</p></article>\
             </body></html>",
            body
        );

        let page = extractor().extract(&html);
        assert_eq!(page.title.as_deref(), Some("Story"));
        assert!(page.content.starts_with("Headline\nword0 word1"));
        assert!(page.content.contains("word119"));
        assert!(!page.content.contains("Home"));
        assert!(!page.content.contains("About us"));
        assert!(!page.truncated);
    }

    #[test]
    fn denylisted_widgets_inside_container_are_removed() {
        let html = format!(
            "<body><main>\
             <p>{}</p>\
             <div class='share'>Share on social</div>\
             <section id='comments'>First comment!</section>\
             <div class='ad'>Buy now</div>\
             <script>var tracking = 1;</script>\
             <p>Closing line.</p>\
             </main></body>",
            long_paragraph(60)
        );

        let content = extractor().extract(&html).content;
        assert!(content.ends_with("Closing line."));
        for noise in ["Share on social", "First comment!", "Buy now", "tracking"] {
            assert!(!content.contains(noise), "{noise} leaked into content");
        }
    }

    #[test]
    fn falls_back_to_body_when_no_container_qualifies() {
        let html = "<body><nav>Menu</nav><article>Tiny</article><div><p>Plain page text.</p></div></body>";

        let content = extractor().extract(html).content;
        assert_eq!(content, "Tiny\nPlain page text.");
    }

    #[test]
    fn container_inside_denylisted_subtree_is_skipped() {
        let menu = long_paragraph(60).replace("word", "menu");
        let html = format!(
            "<body><nav><article>{}</article></nav><div><p>{}</p></div></body>",
            menu,
            long_paragraph(20)
        );

        let content = extractor().extract(&html).content;
        assert!(content.starts_with("word0 word1"));
        assert!(!content.contains("menu0"));
    }

    #[test]
    fn deeply_nested_markup_does_not_exhaust_the_stack() {
        let depth = 10_000;
        let html = format!(
            "<body>{}deep text{}</body>",
            "<div>".repeat(depth),
            "</div>".repeat(depth)
        );

        // a small stack, so a walk that recursed per level would overflow
        let content = std::thread::Builder::new()
            .stack_size(512 * 1024)
            .spawn(move || extractor().extract(&html).content)
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(content, "deep text");
    }

    #[test]
    fn priority_order_is_respected() {
        let html = format!(
            "<body><main><p>{}</p><article><p>{}</p></article></main></body>",
            long_paragraph(60),
            long_paragraph(60).replace("word", "inner")
        );

        let content = extractor().extract(&html).content;
        assert!(content.starts_with("inner0"));
        assert!(!content.contains("word0"));
    }

    #[test]
    fn inline_markup_is_joined_with_spaces() {
        let html = "<body><p>Hello <b>bold</b>\n   world</p><p>Second&nbsp;para</p></body>";
        let content = extractor().extract(html).content;
        assert_eq!(content, "Hello bold world\nSecond para");
    }

    #[test]
    fn content_is_truncated_to_limit() {
        let html = format!("<body><p>{}</p></body>", "é".repeat(100));
        let page = extractor().extract_with_limit(&html, Some(10));
        assert_eq!(page.content, "é".repeat(10));
        assert!(page.truncated);
    }

    #[test]
    fn meta_description_is_picked_up() {
        let html = r#"<html><head><meta name="description" content="  A page
            about things "></head><body><p>Text</p></body></html>"#;
        let page = extractor().extract(html);
        assert_eq!(page.description.as_deref(), Some("A page about things"));
        assert_eq!(page.title, None);
    }

    #[test]
    fn invalid_policy_selector_is_rejected() {
        let policy = ExtractionPolicy {
            excluded_selectors: vec!["nav[".to_string()],
            ..ExtractionPolicy::default()
        };
        assert!(matches!(
            PageExtractor::new(policy),
            Err(ExtractError::InvalidSelector(s)) if s == "nav["
        ));
    }

    #[test]
    fn policy_serializes_in_camel_case() {
        let json = serde_json::to_value(ExtractionPolicy::default()).unwrap();
        assert_eq!(json["contentSelectors"][0], "article");
        assert_eq!(json["minContainerChars"], 200);
        assert!(json["excludedSelectors"]
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s == "nav"));
    }
}
