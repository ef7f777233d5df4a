//! Extractor Module
//! Finds remote image references in raw markup text

use regex::Regex;
use std::sync::LazyLock;

/// Which matcher produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// Any absolute URL ending in an image extension, followed by a closing delimiter.
    Generic,
    /// `src` attribute of an `<img>` element.
    ImageSrc,
    /// CSS `background-image: url(...)`.
    BackgroundImage,
}

/// A raw URL found by one pattern match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateReference {
    pub pattern: Pattern,
    /// Exactly as it appears in the text.
    pub raw: String,
}

static GENERIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(https?://[\w#&?./-]*?\.(?:png|jpe?g|svg|ico))[`'")\]]"#)
        .expect("GENERIC_RE is a valid static regex pattern")
});

static IMAGE_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img\b[^>]*?\bsrc\s*=\s*["'](https?://[^"']+)["']"#)
        .expect("IMAGE_SRC_RE is a valid static regex pattern")
});

static BACKGROUND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)background-image\s*:\s*url\(\s*(?:&quot;|["'])?(https?://[^"')\s]+?)(?:&quot;|["'])?\s*\)"#)
        .expect("BACKGROUND_RE is a valid static regex pattern")
});

static MATCHERS: [(Pattern, &LazyLock<Regex>); 3] = [
    (Pattern::Generic, &GENERIC_RE),
    (Pattern::ImageSrc, &IMAGE_SRC_RE),
    (Pattern::BackgroundImage, &BACKGROUND_RE),
];

/// Run every matcher over `text` and return the union of their matches.
///
/// The same URL may show up more than once when patterns overlap; the
/// normalizer collapses duplicates.
pub fn extract(text: &str) -> Vec<CandidateReference> {
    let mut candidates = Vec::new();

    for &(pattern, re) in MATCHERS.iter() {
        for caps in re.captures_iter(text) {
            if let Some(url) = caps.get(1) {
                candidates.push(CandidateReference {
                    pattern,
                    raw: url.as_str().to_string(),
                });
            }
        }
    }

    let count = |p: Pattern| candidates.iter().filter(|c| c.pattern == p).count();
    tracing::debug!(
        "Extractor: {} candidate references ({} generic, {} img src, {} background)",
        candidates.len(),
        count(Pattern::Generic),
        count(Pattern::ImageSrc),
        count(Pattern::BackgroundImage)
    );
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls_for(text: &str, pattern: Pattern) -> Vec<String> {
        extract(text)
            .into_iter()
            .filter(|c| c.pattern == pattern)
            .map(|c| c.raw)
            .collect()
    }

    #[test]
    fn test_generic_requires_extension_and_delimiter() {
        let text = r#"const a = "https://cdn.example.com/a/b.PNG"; const b = 'http://x.io/y.jpeg'; const c = "https://x.io/page.html";"#;
        let urls = urls_for(text, Pattern::Generic);
        assert_eq!(urls, vec!["https://cdn.example.com/a/b.PNG", "http://x.io/y.jpeg"]);
    }

    #[test]
    fn test_generic_skips_urls_continuing_past_extension() {
        let text = r#"<a href="https://x.io/a.png?w=100">"#;
        assert!(urls_for(text, Pattern::Generic).is_empty());
    }

    #[test]
    fn test_image_src_captures_query_strings() {
        let text = r#"<p><img class="hero" src="https://images.unsplash.com/photo-1?w=800&amp;q=80" alt=""></p>"#;
        assert_eq!(
            urls_for(text, Pattern::ImageSrc),
            vec!["https://images.unsplash.com/photo-1?w=800&amp;q=80"]
        );
    }

    #[test]
    fn test_image_src_ignores_relative_sources() {
        let text = r#"<img src="/static/logo.png"><img src='https://x.io/a.jpg'>"#;
        assert_eq!(urls_for(text, Pattern::ImageSrc), vec!["https://x.io/a.jpg"]);
    }

    #[test]
    fn test_background_image_forms() {
        let text = r#"<div style="background-image:url(https://x.io/bg1);"></div>
<div style='background-image: url("https://x.io/bg2.jpg")'></div>
<div style="background-image:url(&quot;https://x.io/bg3&quot;)"></div>"#;
        assert_eq!(
            urls_for(text, Pattern::BackgroundImage),
            vec!["https://x.io/bg1", "https://x.io/bg2.jpg", "https://x.io/bg3"]
        );
    }

    #[test]
    fn test_overlapping_patterns_both_report() {
        let text = r#"<img src="https://x.io/a.jpg">"#;
        let found = extract(text);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| c.raw == "https://x.io/a.jpg"));
    }

    #[test]
    fn test_no_matches_is_empty() {
        assert!(extract("<html><body><p>plain</p></body></html>").is_empty());
    }
}
