//! Deterministic job id derivation from article URLs.

/// Maximum slug length. Keeps derived ids usable as document ids and
/// execution-name components.
pub const MAX_SLUG_LEN: usize = 80;

/// Derive a deterministic slug from arbitrary text (usually an article URL).
///
/// Lowercases, maps every non-alphanumeric character to a hyphen, collapses
/// runs of hyphens, strips leading/trailing hyphens, and truncates to
/// [`MAX_SLUG_LEN`]. Re-submitting the same URL therefore always yields the
/// same job id.
pub fn slugify(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            // Unicode lowercasing; some characters expand to several
            cleaned.extend(ch.to_lowercase());
        } else {
            cleaned.push('-');
        }
    }

    let joined = cleaned
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    joined.chars().take(MAX_SLUG_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_url() {
        assert_eq!(
            slugify("https://example.com/story"),
            "https-example-com-story"
        );
    }

    #[test]
    fn test_slugify_collapses_repeats() {
        assert_eq!(slugify("a -- b__c"), "a-b-c");
    }

    #[test]
    fn test_slugify_is_deterministic() {
        let url = "https://news.example.com/2026/08/big-story?ref=home";
        assert_eq!(slugify(url), slugify(url));
    }

    #[test]
    fn test_slugify_truncates() {
        let long = "x".repeat(300);
        assert_eq!(slugify(&long).len(), MAX_SLUG_LEN);
    }

    #[test]
    fn test_slugify_lowercases_non_ascii() {
        assert_eq!(slugify("ÉCLAIR News"), "éclair-news");
        assert_eq!(slugify("Größe"), "größe");
    }

    #[test]
    fn test_slugify_strips_edges() {
        assert_eq!(slugify("--hello--"), "hello");
        assert_eq!(slugify("///"), "");
    }
}
