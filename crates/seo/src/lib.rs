//! On-page SEO heuristics. Works on an already-fetched HTML body; no
//! network I/O. Scoring starts at 100 and subtracts per failed rule.

use scraper::{Html, Selector};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use linkscan_core::{Grade, IssueSeverity, SeoIssue, SeoMetrics, SeoRecord};

/// Only the head of the document matters for the heuristics.
const MAX_ANALYZE_BYTES: usize = 50 * 1024;

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

struct Extracted {
    title: Option<String>,
    meta_description: Option<String>,
    canonical: Option<String>,
    h1_count: usize,
    h2_count: usize,
    h3_count: usize,
    word_count: usize,
    image_count: usize,
    images_missing_alt: usize,
}

fn extract(html_str: &str) -> Extracted {
    let document = Html::parse_document(html_str);

    let title = selector("title")
        .and_then(|s| document.select(&s).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let meta = |sel: &str| {
        selector(sel)
            .and_then(|s| document.select(&s).next())
            .and_then(|el| el.value().attr("content").map(str::trim).map(str::to_string))
            .filter(|c| !c.is_empty())
    };
    let meta_description =
        meta("meta[name='description']").or_else(|| meta("meta[property='og:description']"));

    let canonical = selector("link[rel='canonical']")
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("href").map(str::to_string))
        .filter(|href| !href.is_empty());

    let count = |sel: &str| {
        selector(sel)
            .map(|s| document.select(&s).count())
            .unwrap_or(0)
    };

    let word_count = selector("body")
        .and_then(|s| document.select(&s).next())
        .map(|el| el.text().collect::<Vec<_>>().join(" ").split_whitespace().count())
        .unwrap_or(0);

    let (image_count, images_missing_alt) = selector("img")
        .map(|s| {
            let mut total = 0;
            let mut missing = 0;
            for img in document.select(&s) {
                total += 1;
                let alt = img.value().attr("alt").map(str::trim).unwrap_or("");
                if alt.is_empty() {
                    missing += 1;
                }
            }
            (total, missing)
        })
        .unwrap_or((0, 0));

    Extracted {
        title,
        meta_description,
        canonical,
        h1_count: count("h1"),
        h2_count: count("h2"),
        h3_count: count("h3"),
        word_count,
        image_count,
        images_missing_alt,
    }
}

/// Score one fetched HTML page against the rule table.
pub fn analyze(job_id: Uuid, url: &Url, html: &str, response_time_ms: u64) -> SeoRecord {
    let truncated = if html.len() > MAX_ANALYZE_BYTES {
        let mut cut = MAX_ANALYZE_BYTES;
        while cut > 0 && !html.is_char_boundary(cut) {
            cut -= 1;
        }
        &html[..cut]
    } else {
        html
    };

    let page = extract(truncated);
    let mut score: i32 = 100;
    let mut issues: Vec<SeoIssue> = Vec::new();

    let mut deduct = |points: i32, severity: IssueSeverity, message: String| {
        score -= points;
        issues.push(SeoIssue { severity, message });
    };

    let title_length = page.title.as_deref().map(|t| t.chars().count()).unwrap_or(0);
    match &page.title {
        None => deduct(20, IssueSeverity::Critical, "Missing page title".to_string()),
        Some(_) if title_length > 60 => deduct(
            10,
            IssueSeverity::Warning,
            format!("Title too long ({title_length} characters, recommended max 60)"),
        ),
        Some(_) if title_length < 30 => deduct(
            5,
            IssueSeverity::Warning,
            format!("Title too short ({title_length} characters, recommended min 30)"),
        ),
        Some(_) => {}
    }

    let desc_length = page
        .meta_description
        .as_deref()
        .map(|d| d.chars().count())
        .unwrap_or(0);
    match &page.meta_description {
        None => deduct(15, IssueSeverity::Major, "Missing meta description".to_string()),
        Some(_) if desc_length > 160 => deduct(
            8,
            IssueSeverity::Warning,
            format!("Meta description too long ({desc_length} characters, recommended max 160)"),
        ),
        Some(_) => {}
    }

    if page.h1_count == 0 {
        deduct(15, IssueSeverity::Major, "Missing H1 heading".to_string());
    } else if page.h1_count > 1 {
        deduct(
            10,
            IssueSeverity::Warning,
            format!("Multiple H1 headings ({})", page.h1_count),
        );
    }

    if page.image_count > 0 {
        let with_alt = page.image_count - page.images_missing_alt;
        let coverage = with_alt * 100 / page.image_count;
        if coverage < 80 {
            deduct(
                10,
                IssueSeverity::Warning,
                format!(
                    "Poor image alt coverage ({} of {} images have alt text)",
                    with_alt, page.image_count
                ),
            );
        }
    }

    if url.scheme() != "https" {
        deduct(10, IssueSeverity::Major, "Page is not served over HTTPS".to_string());
    }

    if page.word_count < 200 {
        deduct(
            10,
            IssueSeverity::Warning,
            format!("Low content volume ({} words)", page.word_count),
        );
    }

    if response_time_ms > 3000 {
        deduct(
            10,
            IssueSeverity::Warning,
            format!("Slow response time ({response_time_ms} ms)"),
        );
    }

    if page.canonical.is_none() {
        deduct(5, IssueSeverity::Minor, "Missing canonical URL".to_string());
    }

    let score = score.clamp(0, 100) as u8;
    let grade = Grade::from_score(score);
    debug!(url = %url, score, ?grade, issues = issues.len(), "seo analysis done");

    SeoRecord {
        job_id,
        url: url.to_string(),
        score,
        grade,
        issues,
        metrics: SeoMetrics {
            title: page.title,
            title_length,
            meta_description: page.meta_description,
            meta_description_length: desc_length,
            h1_count: page.h1_count,
            h2_count: page.h2_count,
            h3_count: page.h3_count,
            word_count: page.word_count,
            image_count: page.image_count,
            images_missing_alt: page.images_missing_alt,
            https: url.scheme() == "https",
            canonical: page.canonical,
            response_time_ms,
        },
        error: None,
    }
}

/// Record persisted when analysis itself failed; score 0 with the cause.
pub fn failed_record(job_id: Uuid, url: &Url, message: impl Into<String>) -> SeoRecord {
    SeoRecord {
        job_id,
        url: url.to_string(),
        score: 0,
        grade: Grade::F,
        issues: Vec::new(),
        metrics: SeoMetrics::default(),
        error: Some(message.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Uuid {
        Uuid::new_v4()
    }

    fn https_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    fn filler_words(n: usize) -> String {
        std::iter::repeat("lorem").take(n).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn perfect_page_scores_100() {
        let html = format!(
            r#"<html><head>
                <title>A perfectly sized page title for testing</title>
                <meta name="description" content="A fine description of this page.">
                <link rel="canonical" href="https://example.com/page">
               </head>
               <body><h1>One heading</h1><img src="a.png" alt="pic"><p>{}</p></body></html>"#,
            filler_words(250)
        );
        let record = analyze(job(), &https_url(), &html, 500);
        assert_eq!(record.score, 100);
        assert_eq!(record.grade, Grade::A);
        assert!(record.issues.is_empty());
        assert!(record.metrics.https);
    }

    #[test]
    fn short_title_missing_meta_and_alt_scores_65() {
        // title present but short (-5), no meta description (-15),
        // one h1, all images missing alt (-10), https, fast, 300 words,
        // no canonical (-5) => 65, grade D
        let html = format!(
            r#"<html><head><title>Hi!</title></head>
               <body><h1>H</h1><img src="a.png"><img src="b.png"><p>{}</p></body></html>"#,
            filler_words(300)
        );
        let record = analyze(job(), &https_url(), &html, 500);
        assert_eq!(record.score, 65);
        assert_eq!(record.grade, Grade::D);
        assert_eq!(record.issues.len(), 4);
        assert_eq!(record.metrics.images_missing_alt, 2);
    }

    #[test]
    fn missing_title_is_critical() {
        let html = format!("<html><body><h1>x</h1><p>{}</p></body></html>", filler_words(250));
        let record = analyze(job(), &https_url(), &html, 100);
        assert!(record
            .issues
            .iter()
            .any(|i| i.severity == IssueSeverity::Critical && i.message.contains("title")));
        // -20 title, -15 meta, -5 canonical
        assert_eq!(record.score, 60);
    }

    #[test]
    fn long_title_and_description_warn() {
        let html = format!(
            r#"<html><head>
                <title>{}</title>
                <meta name="description" content="{}">
                <link rel="canonical" href="/page">
               </head><body><h1>ok</h1><p>{}</p></body></html>"#,
            "t".repeat(61),
            "d".repeat(161),
            filler_words(250)
        );
        let record = analyze(job(), &https_url(), &html, 100);
        // -10 long title, -8 long description
        assert_eq!(record.score, 82);
        assert_eq!(record.grade, Grade::B);
    }

    #[test]
    fn multiple_h1_warns_and_plain_http_deducts() {
        let url = Url::parse("http://example.com/x").unwrap();
        let html = format!(
            r#"<html><head><title>A perfectly sized page title here</title>
               <meta name="description" content="desc"><link rel="canonical" href="/x"></head>
               <body><h1>a</h1><h1>b</h1><p>{}</p></body></html>"#,
            filler_words(250)
        );
        let record = analyze(job(), &url, &html, 100);
        // -10 multiple h1, -10 not https
        assert_eq!(record.score, 80);
        assert!(!record.metrics.https);
    }

    #[test]
    fn alt_coverage_at_80_percent_passes() {
        let html = format!(
            r#"<html><head><title>A perfectly sized page title here</title>
               <meta name="description" content="desc"><link rel="canonical" href="/x"></head>
               <body><h1>a</h1>
               <img alt="1"><img alt="2"><img alt="3"><img alt="4"><img>
               <p>{}</p></body></html>"#,
            filler_words(250)
        );
        let record = analyze(job(), &https_url(), &html, 100);
        assert_eq!(record.score, 100, "4 of 5 images with alt is exactly 80%");
    }

    #[test]
    fn slow_response_and_thin_content_warn() {
        let html = r#"<html><head><title>A perfectly sized page title here</title>
            <meta name="description" content="desc"><link rel="canonical" href="/x"></head>
            <body><h1>a</h1><p>few words only</p></body></html>"#;
        let record = analyze(job(), &https_url(), html, 3500);
        // -10 low content, -10 slow response
        assert_eq!(record.score, 80);
    }

    #[test]
    fn score_clamps_at_zero() {
        let record = analyze(job(), &Url::parse("http://x.example/").unwrap(), "", 5000);
        assert!(record.score <= 100);
        assert_eq!(record.grade, Grade::F);
    }

    #[test]
    fn truncates_huge_bodies_before_analysis() {
        let mut html = String::from("<html><head><title>A perfectly sized page title here</title></head><body>");
        html.push_str(&filler_words(60_000));
        html.push_str("</body></html>");
        let record = analyze(job(), &https_url(), &html, 100);
        // words beyond the 50 KB cut are not counted
        assert!(record.metrics.word_count < 60_000);
    }

    #[test]
    fn failed_record_carries_error() {
        let record = failed_record(job(), &https_url(), "body unreadable");
        assert_eq!(record.score, 0);
        assert_eq!(record.error.as_deref(), Some("body unreadable"));
    }
}
