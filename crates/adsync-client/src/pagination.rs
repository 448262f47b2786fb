//! RFC 5988 `Link` header handling for Megaphone listings.

use reqwest::header::{HeaderMap, LINK};

/// Returns the `rel="next"` target of a `Link` header value.
///
/// # Examples
///
/// ```
/// use adsync_client::pagination::next_link;
///
/// let header = r#"<https://api.test/campaigns?page=2>; rel="next", <https://api.test/campaigns?page=9>; rel="last""#;
/// assert_eq!(next_link(header).as_deref(), Some("https://api.test/campaigns?page=2"));
/// assert_eq!(next_link(r#"<https://api.test/x>; rel="prev""#), None);
/// ```
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';').map(str::trim);
        let target = parts.next()?.strip_prefix('<')?.strip_suffix('>')?;
        let is_next = parts.any(|param| {
            param
                .strip_prefix("rel=")
                .map(|rel| rel.trim_matches('"').split_whitespace().any(|r| r == "next"))
                .unwrap_or(false)
        });
        is_next.then(|| target.to_string())
    })
}

/// Next page URL from a response's headers, if any.
pub fn next_page(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(next_link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_next_among_several_relations() {
        let header = r#"<https://x.test/a?page=1>; rel="first", <https://x.test/a?page=3>; rel="next""#;
        assert_eq!(next_link(header).as_deref(), Some("https://x.test/a?page=3"));
    }

    #[test]
    fn test_unquoted_and_multi_valued_rel() {
        assert_eq!(
            next_link("<https://x.test/b?page=2>; rel=next").as_deref(),
            Some("https://x.test/b?page=2")
        );
        assert_eq!(
            next_link(r#"<https://x.test/b?page=2>; rel="last next""#).as_deref(),
            Some("https://x.test/b?page=2")
        );
    }

    #[test]
    fn test_no_next() {
        assert_eq!(next_link(""), None);
        assert_eq!(next_link(r#"<https://x.test/a?page=1>; rel="first""#), None);
        assert_eq!(next_link(r#"https://x.test/a; rel="next""#), None);
    }

    #[test]
    fn test_next_page_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(next_page(&headers), None);

        headers.insert(
            LINK,
            HeaderValue::from_static(r#"<https://x.test/c?page=2&per_page=100>; rel="next""#),
        );
        assert_eq!(
            next_page(&headers).as_deref(),
            Some("https://x.test/c?page=2&per_page=100")
        );
    }
}
