//! HTML link extraction. Anchors are resolved against the page URL,
//! normalized, gated for safety, deduplicated, and classified by where
//! they sit in the document and where they point.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use linkscan_core::{
    ExtractStats, ExtractedPage, LinkAttributes, LinkContext, LinkInfo, LinkType, PageAnalysis,
    PageInfo, UrlCategory,
};

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub include_external: bool,
    pub follow_nofollow: bool,
    pub max_links_per_page: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            include_external: false,
            follow_nofollow: false,
            max_links_per_page: 1000,
        }
    }
}

static NAV_CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)nav|menu|navigation|navbar|breadcrumb|sidebar").unwrap());

static CONTENT_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/blog/|/article/|/post/|/news/|/guide/|/tutorial/|/review/").unwrap());

static CONTENT_CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)post-link|article-link|content-link|entry-link").unwrap());

/// Anchor texts that are navigation chrome wherever they appear.
const COMMON_NAV_TEXT: &[&str] = &[
    "home", "about", "about us", "contact", "contact us", "login", "log in", "register",
    "sign in", "sign up", "logout", "privacy", "privacy policy", "terms", "search", "menu",
    "help", "faq", "sitemap", "next", "previous", "back",
];

const RESOURCE_TEXT_HINTS: &[&str] = &["download", "pdf", "file", "document"];

const CONTENT_TEXT_HINTS: &[&str] = &[
    "read more", "continue reading", "learn more", "full story", "view post", "read article",
];

const ASSET_HREF_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".zip", ".rar", ".gz", ".mp3",
    ".mp4", ".avi", ".mov", ".webm", ".wav", ".woff", ".woff2", ".ttf", ".css", ".js", ".pdf",
    ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx",
];

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

/// Extract links and page metadata from one fetched HTML page.
pub fn extract(html_str: &str, base_url: &Url, current_depth: u32, opts: &ExtractOptions) -> ExtractedPage {
    let document = Html::parse_document(html_str);

    let page_info = extract_page_info(&document, base_url);
    let mut stats = ExtractStats::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut links: Vec<LinkInfo> = Vec::new();

    let Some(anchor_sel) = selector("a[href]") else {
        return ExtractedPage { links, page_info, stats };
    };

    for el in document.select(&anchor_sel) {
        stats.anchors_seen += 1;

        let Some(href) = el.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty()
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
            || href.starts_with('#')
        {
            continue;
        }

        let rel = el.value().attr("rel").map(str::to_string);
        if !opts.follow_nofollow
            && rel.as_deref().map(|r| r.contains("nofollow")).unwrap_or(false)
        {
            continue;
        }

        let Ok(resolved) = base_url.join(href) else {
            continue;
        };
        let normalized = linkscan_policy::normalize(&resolved);

        if !linkscan_policy::is_safe(&normalized).safe {
            stats.skipped_unsafe += 1;
            continue;
        }

        let is_internal = linkscan_policy::is_internal(&normalized, base_url);
        if !is_internal && !opts.include_external {
            stats.skipped_external += 1;
            continue;
        }

        if !seen.insert(normalized.to_string()) {
            stats.deduplicated += 1;
            continue;
        }

        let text = clean_text(&el, 100);
        let in_nav = in_navigation_area(&el);
        let in_content = in_content_area(&el);
        let link_type = classify(&el, &normalized, &text, in_nav, in_content);
        let priority = score_priority(&normalized, &text, in_nav, in_content);

        links.push(LinkInfo {
            url: normalized.to_string(),
            source_url: base_url.to_string(),
            link_text: text,
            is_internal,
            depth: current_depth + 1,
            should_crawl: linkscan_policy::should_crawl(&normalized),
            link_type,
            priority,
            context: if in_nav {
                LinkContext::Navigation
            } else if in_content {
                LinkContext::ContentArea
            } else {
                LinkContext::Body
            },
            attributes: LinkAttributes {
                rel,
                target: el.value().attr("target").map(str::to_string),
                title: el.value().attr("title").map(str::to_string),
                class: el.value().attr("class").map(str::to_string),
                id: el.value().attr("id").map(str::to_string),
            },
        });
    }

    if links.len() > opts.max_links_per_page {
        // Keep content and navigation links first, highest priority first
        links.sort_by_key(|l| {
            let type_rank = match l.link_type {
                LinkType::Content | LinkType::Navigation => 0u8,
                _ => 1,
            };
            (type_rank, 10 - l.priority)
        });
        links.truncate(opts.max_links_per_page);
        stats.capped = true;
        debug!(base = %base_url, cap = opts.max_links_per_page, "link cap applied");
    }

    stats.emitted = links.len();
    ExtractedPage { links, page_info, stats }
}

/// Collapse whitespace and cap length on a char boundary.
fn clean_text(el: &ElementRef, max_chars: usize) -> String {
    let text = el
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    text.chars().take(max_chars).collect()
}

fn element_class(el: &ElementRef) -> String {
    el.value().attr("class").unwrap_or("").to_string()
}

fn parent_element<'a>(el: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    el.parent().and_then(ElementRef::wrap)
}

fn in_navigation_area(el: &ElementRef) -> bool {
    for node in el.ancestors() {
        if let Some(ancestor) = ElementRef::wrap(node) {
            let name = ancestor.value().name();
            if matches!(name, "nav" | "header" | "footer" | "aside") {
                return true;
            }
        }
    }
    if NAV_CLASS_RE.is_match(&element_class(el)) {
        return true;
    }
    parent_element(el)
        .map(|p| NAV_CLASS_RE.is_match(&element_class(&p)))
        .unwrap_or(false)
}

fn in_content_area(el: &ElementRef) -> bool {
    for node in el.ancestors() {
        if let Some(ancestor) = ElementRef::wrap(node) {
            let name = ancestor.value().name();
            if matches!(name, "main" | "article") {
                return true;
            }
            let class = element_class(&ancestor);
            if class.contains("content") || class.contains("post-content") {
                return true;
            }
        }
    }
    false
}

fn is_common_nav_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    COMMON_NAV_TEXT.contains(&lower.as_str())
}

fn classify(
    el: &ElementRef,
    url: &Url,
    text: &str,
    in_nav: bool,
    in_content: bool,
) -> LinkType {
    if in_nav || is_common_nav_text(text) || text.chars().count() < 4 {
        return LinkType::Navigation;
    }

    let path = url.path().to_lowercase();
    let lower_text = text.to_lowercase();
    if ASSET_HREF_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
        || RESOURCE_TEXT_HINTS.iter().any(|h| lower_text.contains(h))
    {
        return LinkType::Resource;
    }

    let own_class = element_class(el);
    let parent_class = parent_element(el).map(|p| element_class(&p)).unwrap_or_default();
    if CONTENT_PATH_RE.is_match(&path)
        || CONTENT_CLASS_RE.is_match(&own_class)
        || CONTENT_CLASS_RE.is_match(&parent_class)
        || (in_content && text.chars().count() > 10)
    {
        return LinkType::Content;
    }

    LinkType::Other
}

fn score_priority(url: &Url, text: &str, in_nav: bool, in_content: bool) -> u8 {
    let mut score: i32 = 5;
    let text_len = text.chars().count();
    let lower = text.to_lowercase();

    if in_content {
        score += 2;
    }
    if text_len > 10 && text_len < 100 {
        score += 1;
    }
    if CONTENT_TEXT_HINTS.iter().any(|h| lower.contains(h)) {
        score += 2;
    }
    if is_common_nav_text(text) {
        score -= 2;
    }
    if in_nav {
        score -= 1;
    }
    if linkscan_policy::classify_by_url(url) == UrlCategory::Pages {
        score += 2;
    }

    score.clamp(1, 10) as u8
}

fn extract_page_info(document: &Html, base_url: &Url) -> PageInfo {
    let title = selector("title")
        .and_then(|s| document.select(&s).next())
        .map(|el| clean_text(&el, 100))
        .filter(|t| !t.is_empty())
        .or_else(|| {
            selector("h1")
                .and_then(|s| document.select(&s).next())
                .map(|el| clean_text(&el, 100))
                .filter(|t| !t.is_empty())
        });

    let meta_description = meta_content(document, "meta[name='description']")
        .or_else(|| meta_content(document, "meta[property='og:description']"))
        .map(|d| d.chars().take(200).collect());

    let canonical_url = selector("link[rel='canonical']")
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| base_url.join(href).ok())
        .map(|u| u.to_string());

    let lang = selector("html")
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("lang").map(str::to_string));

    let robots_meta = meta_content(document, "meta[name='robots']");

    let body_text = selector("body")
        .and_then(|s| document.select(&s).next())
        .map(|el| {
            el.text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    let count = |sel: &str| {
        selector(sel)
            .map(|s| document.select(&s).count())
            .unwrap_or(0)
    };

    let analysis = PageAnalysis {
        word_count: body_text.split_whitespace().count(),
        paragraph_count: count("p"),
        heading_count: count("h1, h2, h3, h4, h5, h6"),
        link_count: count("a[href]"),
        image_count: count("img"),
        has_nav: count("nav") > 0,
        has_main_content: count("main, article, .content, #content") > 0,
        has_schema_markup: count("script[type='application/ld+json']") > 0
            || count("[itemscope]") > 0,
    };

    PageInfo {
        title,
        meta_description,
        canonical_url,
        lang,
        robots_meta,
        analysis,
    }
}

fn meta_content(document: &Html, sel: &str) -> Option<String> {
    selector(sel)
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("content").map(str::to_string))
        .filter(|c| !c.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/blog/post").unwrap()
    }

    fn extract_default(html: &str) -> ExtractedPage {
        extract(html, &base(), 0, &ExtractOptions::default())
    }

    #[test]
    fn resolves_and_normalizes_relative_links() {
        let page = extract_default(r#"<a href="/about/?b=2&a=1#x">About this very site</a>"#);
        assert_eq!(page.links.len(), 1);
        assert_eq!(page.links[0].url, "https://example.com/about?a=1&b=2");
        assert_eq!(page.links[0].depth, 1);
        assert_eq!(page.links[0].source_url, base().as_str());
    }

    #[test]
    fn skips_pseudo_and_fragment_hrefs() {
        let page = extract_default(
            r##"<a href="javascript:void(0)">x</a>
               <a href="mailto:a@b.c">mail</a>
               <a href="tel:+123">call</a>
               <a href="#section">anchor</a>
               <a href="">empty</a>"##,
        );
        assert!(page.links.is_empty());
        assert_eq!(page.stats.anchors_seen, 5);
    }

    #[test]
    fn skips_nofollow_by_default() {
        let html = r#"<a href="/a" rel="nofollow">nofollowed link</a><a href="/b">plain link here</a>"#;
        let page = extract_default(html);
        assert_eq!(page.links.len(), 1);
        assert_eq!(page.links[0].url, "https://example.com/b");

        let opts = ExtractOptions { follow_nofollow: true, ..Default::default() };
        let page = extract(html, &base(), 0, &opts);
        assert_eq!(page.links.len(), 2);
    }

    #[test]
    fn drops_unsafe_targets() {
        let page = extract_default(
            r#"<a href="http://10.0.0.5/internal">private box link</a>
               <a href="http://example.com/fine">a perfectly fine page</a>"#,
        );
        assert_eq!(page.links.len(), 1);
        assert_eq!(page.stats.skipped_unsafe, 1);
    }

    #[test]
    fn external_links_respect_option() {
        let html = r#"<a href="https://other.org/page">external resource page</a>
                      <a href="/internal">internal page here</a>"#;
        let page = extract_default(html);
        assert_eq!(page.links.len(), 1);
        assert!(page.links[0].is_internal);
        assert_eq!(page.stats.skipped_external, 1);

        let opts = ExtractOptions { include_external: true, ..Default::default() };
        let page = extract(html, &base(), 0, &opts);
        assert_eq!(page.links.len(), 2);
        assert!(page.links.iter().any(|l| !l.is_internal));
    }

    #[test]
    fn deduplicates_within_page() {
        let page = extract_default(
            r#"<a href="/a/">duplicate target one</a><a href="/a">duplicate target two</a>"#,
        );
        assert_eq!(page.links.len(), 1);
        assert_eq!(page.stats.deduplicated, 1);
    }

    #[test]
    fn classifies_navigation_by_ancestry_and_text() {
        let page = extract_default(
            r#"<nav><a href="/products">our full product catalog</a></nav>
               <a href="/contact">Contact</a>
               <a href="/x">Go</a>"#,
        );
        assert!(page.links.iter().all(|l| l.link_type == LinkType::Navigation));
        let nav_link = page.links.iter().find(|l| l.url.ends_with("/products")).unwrap();
        assert_eq!(nav_link.context, LinkContext::Navigation);
    }

    #[test]
    fn classifies_resources() {
        let page = extract_default(
            r#"<a href="/files/report.pdf">quarterly earnings report</a>
               <a href="/get">download the installer</a>"#,
        );
        assert!(page.links.iter().all(|l| l.link_type == LinkType::Resource));
        assert!(!page.links[0].should_crawl);
    }

    #[test]
    fn classifies_content_links() {
        let page = extract_default(
            r#"<a href="/blog/rust-tips">ten practical rust tips</a>
               <main><a href="/long-read">a long essay about parsers</a></main>
               <a class="entry-link" href="/entry">go</a>"#,
        );
        let by_url = |suffix: &str| page.links.iter().find(|l| l.url.ends_with(suffix)).unwrap();
        assert_eq!(by_url("/blog/rust-tips").link_type, LinkType::Content);
        assert_eq!(by_url("/long-read").link_type, LinkType::Content);
        // text under 4 chars reads as navigation even with a content class
        assert_eq!(by_url("/entry").link_type, LinkType::Navigation);
    }

    #[test]
    fn priority_favors_content_area_pages() {
        let page = extract_default(
            r#"<main><a href="/guides/setup">read more about the setup guide</a></main>
               <nav><a href="/home">Home</a></nav>"#,
        );
        let content = page.links.iter().find(|l| l.url.ends_with("/guides/setup")).unwrap();
        let nav = page.links.iter().find(|l| l.url.ends_with("/home")).unwrap();
        assert!(content.priority > nav.priority);
        assert!(content.priority <= 10);
        assert!(nav.priority >= 1);
    }

    #[test]
    fn caps_links_preferring_content() {
        let mut html = String::new();
        for i in 0..30 {
            html.push_str(&format!(
                r#"<a href="/misc{i}">miscellaneous entry {i}</a>"#
            ));
        }
        for i in 0..5 {
            html.push_str(&format!(
                r#"<a href="/blog/post-{i}">an interesting blog article {i}</a>"#
            ));
        }
        let opts = ExtractOptions { max_links_per_page: 10, ..Default::default() };
        let page = extract(&html, &base(), 0, &opts);
        assert_eq!(page.links.len(), 10);
        assert!(page.stats.capped);
        let content_kept = page.links.iter().filter(|l| l.link_type == LinkType::Content).count();
        assert_eq!(content_kept, 5);
    }

    #[test]
    fn page_info_extraction() {
        let html = r#"
            <html lang="en"><head>
              <title>My Example Page</title>
              <meta name="description" content="A short description.">
              <meta name="robots" content="index,follow">
              <link rel="canonical" href="/blog/post">
            </head>
            <body>
              <nav><a href="/">Home</a></nav>
              <main><h1>Heading</h1><p>Some words in a paragraph.</p>
                <img src="a.png" alt="a"><img src="b.png">
              </main>
            </body></html>"#;
        let page = extract_default(html);
        let info = &page.page_info;
        assert_eq!(info.title.as_deref(), Some("My Example Page"));
        assert_eq!(info.meta_description.as_deref(), Some("A short description."));
        assert_eq!(info.canonical_url.as_deref(), Some("https://example.com/blog/post"));
        assert_eq!(info.lang.as_deref(), Some("en"));
        assert_eq!(info.robots_meta.as_deref(), Some("index,follow"));
        assert!(info.analysis.has_nav);
        assert!(info.analysis.has_main_content);
        assert_eq!(info.analysis.image_count, 2);
        assert!(info.analysis.word_count > 0);
    }

    #[test]
    fn falls_back_to_h1_when_title_missing() {
        let page = extract_default("<body><h1>Fallback Heading</h1></body>");
        assert_eq!(page.page_info.title.as_deref(), Some("Fallback Heading"));
    }
}
