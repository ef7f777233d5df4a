//! Normalizer Module
//! Cleans host-specific URL encodings and collapses duplicate references

use std::collections::HashMap;

use crate::extractor::CandidateReference;

/// One unique remote URL referenced by a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    /// Cleaned URL, used for fetching and as the audit key.
    pub url: String,
    /// Every distinct spelling of this URL in the file text, in first-seen order.
    pub spellings: Vec<String>,
}

/// Unescape `&amp;` for URLs served from hosts that emit it inside markup.
pub fn clean_url(raw: &str, cleanup_hosts: &[String]) -> String {
    if cleanup_hosts.iter().any(|host| raw.contains(host.as_str())) {
        raw.replace("&amp;", "&")
    } else {
        raw.to_string()
    }
}

/// Group candidates by cleaned URL, keeping first-seen order.
pub fn dedupe(candidates: Vec<CandidateReference>, cleanup_hosts: &[String]) -> Vec<RemoteRef> {
    let mut refs: Vec<RemoteRef> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for candidate in candidates {
        let url = clean_url(&candidate.raw, cleanup_hosts);
        match index.get(&url) {
            Some(&i) => {
                let spellings = &mut refs[i].spellings;
                if !spellings.contains(&candidate.raw) {
                    spellings.push(candidate.raw);
                }
            }
            None => {
                index.insert(url.clone(), refs.len());
                refs.push(RemoteRef {
                    url,
                    spellings: vec![candidate.raw],
                });
            }
        }
    }

    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::Pattern;

    fn hosts() -> Vec<String> {
        vec!["cdninstagram".to_string(), "amazonaws".to_string()]
    }

    fn candidate(pattern: Pattern, raw: &str) -> CandidateReference {
        CandidateReference {
            pattern,
            raw: raw.to_string(),
        }
    }

    #[test]
    fn test_clean_url_only_for_listed_hosts() {
        assert_eq!(
            clean_url("https://scontent.cdninstagram.com/p.jpg?a=1&amp;b=2", &hosts()),
            "https://scontent.cdninstagram.com/p.jpg?a=1&b=2"
        );
        assert_eq!(
            clean_url("https://images.unsplash.com/p?a=1&amp;b=2", &hosts()),
            "https://images.unsplash.com/p?a=1&amp;b=2"
        );
    }

    #[test]
    fn test_dedupe_collapses_overlapping_matches() {
        let refs = dedupe(
            vec![
                candidate(Pattern::Generic, "https://x.io/a.jpg"),
                candidate(Pattern::ImageSrc, "https://x.io/b.jpg"),
                candidate(Pattern::ImageSrc, "https://x.io/a.jpg"),
            ],
            &hosts(),
        );
        let urls: Vec<_> = refs.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x.io/a.jpg", "https://x.io/b.jpg"]);
        assert_eq!(refs[0].spellings, vec!["https://x.io/a.jpg"]);
    }

    #[test]
    fn test_dedupe_keeps_escaped_and_plain_spellings() {
        let escaped = "https://s3.amazonaws.com/b/k.png?X=1&amp;Y=2";
        let plain = "https://s3.amazonaws.com/b/k.png?X=1&Y=2";
        let refs = dedupe(
            vec![
                candidate(Pattern::ImageSrc, escaped),
                candidate(Pattern::Generic, plain),
            ],
            &hosts(),
        );
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].url, plain);
        assert_eq!(refs[0].spellings, vec![escaped, plain]);
    }
}
