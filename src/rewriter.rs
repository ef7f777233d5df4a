//! Rewriter Module
//! Holds a markup file's working copy and swaps remote URLs for local paths

use std::path::PathBuf;
use std::str::FromStr;

/// How many occurrences of a URL get rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMode {
    First,
    All,
}

impl FromStr for ReplaceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(ReplaceMode::First),
            "all" => Ok(ReplaceMode::All),
            other => Err(format!("unknown replace mode '{}'", other)),
        }
    }
}

/// A markup file read once, mutated in memory, written at most once.
#[derive(Debug)]
pub struct MarkupFile {
    path: PathBuf,
    working: String,
    replacements: usize,
}

impl MarkupFile {
    pub async fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let working = tokio::fs::read_to_string(&path).await?;
        Ok(Self::from_text(path, working))
    }

    pub fn from_text(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            working: text.into(),
            replacements: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.working
    }

    pub fn is_modified(&self) -> bool {
        self.replacements > 0
    }

    /// Replace `needle` in the current working copy and return how many
    /// occurrences were rewritten.
    ///
    /// An occurrence only counts when the character after it ends a URL, so
    /// `https://x.io/a.png` never rewrites the front of `https://x.io/a.png2`.
    pub fn replace(&mut self, needle: &str, replacement: &str, mode: ReplaceMode) -> usize {
        if needle.is_empty() {
            return 0;
        }

        let mut result = String::with_capacity(self.working.len());
        let mut count = 0;
        let mut cursor = 0;

        for (start, _) in self.working.match_indices(needle) {
            if start < cursor {
                continue;
            }
            let end = start + needle.len();
            if !ends_url(&self.working[end..]) {
                continue;
            }
            result.push_str(&self.working[cursor..start]);
            result.push_str(replacement);
            cursor = end;
            count += 1;
            if mode == ReplaceMode::First {
                break;
            }
        }

        if count > 0 {
            result.push_str(&self.working[cursor..]);
            self.working = result;
            self.replacements += count;
        }
        count
    }

    /// Write the working copy back if anything was replaced. Returns whether it wrote.
    pub async fn persist(&self) -> std::io::Result<bool> {
        if !self.is_modified() {
            return Ok(false);
        }
        tokio::fs::write(&self.path, &self.working).await?;
        tracing::info!("Rewriter: rewrote {} ({} references)", self.path.display(), self.replacements);
        Ok(true)
    }
}

/// Escaped quotes that close an attribute or a CSS `url(...)` inside one.
const QUOTE_ENTITIES: [&str; 4] = ["&quot;", "&#34;", "&#39;", "&apos;"];

fn ends_url(rest: &str) -> bool {
    match rest.chars().next() {
        None => true,
        Some('&') => QUOTE_ENTITIES.iter().any(|entity| rest.starts_with(entity)),
        Some(c) => c.is_whitespace() || matches!(c, '"' | '\'' | '`' | ')' | ']' | '<' | '>' | ',' | ';'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_all_occurrences() {
        let mut file = MarkupFile::from_text(
            "index.html",
            r#"<img src="https://x.io/a.jpg"><meta content="https://x.io/a.jpg">"#,
        );
        assert_eq!(file.replace("https://x.io/a.jpg", "/remote/t.remote.webp", ReplaceMode::All), 2);
        assert_eq!(
            file.text(),
            r#"<img src="/remote/t.remote.webp"><meta content="/remote/t.remote.webp">"#
        );
        assert!(file.is_modified());
    }

    #[test]
    fn test_replace_first_only() {
        let mut file = MarkupFile::from_text("index.html", r#""https://x.io/a.jpg" "https://x.io/a.jpg""#);
        assert_eq!(file.replace("https://x.io/a.jpg", "/remote/t", ReplaceMode::First), 1);
        assert_eq!(file.text(), r#""/remote/t" "https://x.io/a.jpg""#);
    }

    #[test]
    fn test_prefix_of_longer_url_is_left_alone() {
        let mut file = MarkupFile::from_text(
            "index.html",
            r#"<img src="https://x.io/a.png?w=2"><img src="https://x.io/a.png">"#,
        );
        assert_eq!(file.replace("https://x.io/a.png", "/remote/t", ReplaceMode::All), 1);
        assert_eq!(file.text(), r#"<img src="https://x.io/a.png?w=2"><img src="/remote/t">"#);
    }

    #[test]
    fn test_escaped_quote_ends_url() {
        let mut file = MarkupFile::from_text(
            "index.html",
            r#"<div style="background-image:url(&quot;https://x.io/bg.png&quot;)"></div>"#,
        );
        assert_eq!(file.replace("https://x.io/bg.png", "/remote/bg", ReplaceMode::All), 1);
        assert_eq!(
            file.text(),
            r#"<div style="background-image:url(&quot;/remote/bg&quot;)"></div>"#
        );
    }

    #[test]
    fn test_escaped_ampersand_continues_url() {
        let mut file = MarkupFile::from_text("index.html", r#"<img src="https://x.io/a.png?w=1&amp;h=2">"#);
        assert_eq!(file.replace("https://x.io/a.png?w=1", "/remote/a", ReplaceMode::All), 0);
        assert!(!file.is_modified());
    }

    #[test]
    fn test_replacements_compose_on_working_copy() {
        let mut file = MarkupFile::from_text("index.html", r#"<img src="https://x.io/a.jpg"><img src="https://x.io/b.jpg">"#);
        file.replace("https://x.io/b.jpg", "/remote/b", ReplaceMode::All);
        file.replace("https://x.io/a.jpg", "/remote/a", ReplaceMode::All);
        assert_eq!(file.text(), r#"<img src="/remote/a"><img src="/remote/b">"#);
    }

    #[test]
    fn test_missing_needle_leaves_file_unmodified() {
        let mut file = MarkupFile::from_text("index.html", "<p>nothing</p>");
        assert_eq!(file.replace("https://x.io/a.jpg", "/remote/a", ReplaceMode::All), 0);
        assert!(!file.is_modified());
    }

    #[tokio::test]
    async fn test_persist_only_when_modified() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.html");
        std::fs::write(&path, r#"<img src="https://x.io/a.jpg">"#).unwrap();

        let untouched = MarkupFile::open(&path).await.unwrap();
        assert!(!tokio_test::assert_ok!(untouched.persist().await));

        let mut file = MarkupFile::open(&path).await.unwrap();
        file.replace("https://x.io/a.jpg", "/remote/a", ReplaceMode::All);
        assert!(file.persist().await.unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"<img src="/remote/a">"#);
    }

    #[test]
    fn test_replace_mode_parsing() {
        assert_eq!("ALL".parse::<ReplaceMode>().unwrap(), ReplaceMode::All);
        assert!("some".parse::<ReplaceMode>().is_err());
    }
}
