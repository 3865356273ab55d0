//! Article fetching and text extraction.

use reqwest::Client;
use tracing::info;

use newsreel_models::{slugify, ArticleInfo};

use crate::error::{WorkerError, WorkerResult};

/// Fetches an article and extracts its title and readable text.
pub struct ArticleFetcher {
    client: Client,
}

impl ArticleFetcher {
    pub fn new() -> WorkerResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(concat!("newsreel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WorkerError::ArticleFetchFailed(e.to_string()))?;
        Ok(Self { client })
    }

    /// Fetch the article at `url`. The slug is derived from the URL so it
    /// always matches the job id created at ingest.
    pub async fn fetch(&self, url: &str) -> WorkerResult<ArticleInfo> {
        info!("Fetching article {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WorkerError::ArticleFetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkerError::ArticleFetchFailed(format!(
                "{} returned {}",
                url, status
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| WorkerError::ArticleFetchFailed(e.to_string()))?;

        let title = extract_title(&html).unwrap_or_else(|| url.to_string());
        let text = extract_text(&html);

        if text.is_empty() {
            return Err(WorkerError::ArticleFetchFailed(format!(
                "{} yielded no readable text",
                url
            )));
        }

        Ok(ArticleInfo {
            url: url.to_string(),
            title,
            byline: None,
            published_at: None,
            source: None,
            slug: slugify(url),
            text,
        })
    }
}

/// Byte offset of the first ASCII-case-insensitive match of `needle` at or
/// after `from`. Tag names are ASCII, so matching bytes directly against the
/// original string keeps every offset valid for it — lowercasing the whole
/// document would shift offsets for characters whose lowercase form has a
/// different byte length.
fn find_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let needle = needle.as_bytes();
    haystack.as_bytes()[from..]
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
        .map(|pos| pos + from)
}

fn starts_with_ci(text: &str, prefix: &str) -> bool {
    let prefix = prefix.as_bytes();
    text.len() >= prefix.len() && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn extract_title(html: &str) -> Option<String> {
    let start = find_ci(html, "<title", 0)?;
    let open_end = html[start..].find('>')? + start + 1;
    let close = find_ci(html, "</title>", open_end)?;
    let title = decode_entities(html[open_end..close].trim());
    (!title.is_empty()).then_some(title)
}

/// Strip markup and scripts, collapse whitespace.
fn extract_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len() / 4);
    let mut chars = html.char_indices().peekable();
    let mut skip_until: Option<usize> = None;

    while let Some((i, c)) = chars.next() {
        if let Some(end) = skip_until {
            if i < end {
                continue;
            }
            skip_until = None;
        }

        if c == '<' {
            let rest = &html[i..];
            let skip_tag = if starts_with_ci(rest, "<script") {
                find_ci(rest, "</script>", 0).map(|e| i + e + "</script>".len())
            } else if starts_with_ci(rest, "<style") {
                find_ci(rest, "</style>", 0).map(|e| i + e + "</style>".len())
            } else {
                rest.find('>').map(|e| i + e + 1)
            };
            match skip_tag {
                Some(end) => skip_until = Some(end),
                None => break,
            }
            if !text.ends_with(' ') {
                text.push(' ');
            }
            continue;
        }

        text.push(c);
    }

    let decoded = decode_entities(&text);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title() {
        let html = "<html><head><title> Big News &amp; More </title></head></html>";
        assert_eq!(extract_title(html).unwrap(), "Big News & More");
        assert!(extract_title("<html></html>").is_none());
    }

    #[test]
    fn test_extract_text_strips_markup() {
        let html = "<html><body><script>var x = 1;</script>\
                    <h1>Headline</h1><p>First paragraph.</p></body></html>";
        let text = extract_text(html);
        assert_eq!(text, "Headline First paragraph.");
        assert!(!text.contains("var x"));
    }

    #[test]
    fn test_tag_matching_is_case_insensitive() {
        let html = "<HTML><BODY><SCRIPT>var x = 1;</SCRIPT><P>Upper.</P></BODY></HTML>";
        assert_eq!(extract_text(html), "Upper.");

        let html = "<head><TITLE>Shouted</TITLE></head>";
        assert_eq!(extract_title(html).unwrap(), "Shouted");
    }

    // 'İ' lowercases to two chars and grows by a byte, so offsets taken
    // from a lowercased copy would land mid-character in the original.
    #[test]
    fn test_extract_text_with_multibyte_case_folding() {
        let html = "<html><body><p>aİ<p>next</p></body></html>";
        assert_eq!(extract_text(html), "aİ next");
    }

    #[test]
    fn test_extract_title_after_multibyte_chars() {
        let html = "<html><head><!-- İstanbul desk --><title>News</title></head></html>";
        assert_eq!(extract_title(html).unwrap(), "News");
    }
}
