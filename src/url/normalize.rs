use crate::UrlError;
use url::Url;

/// List of tracking query parameters to remove during normalization
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
];

/// Normalizes a URL into the form used as the link graph's key
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Only HTTP and HTTPS are accepted
/// 3. Lowercase the host
/// 4. Normalize path:
///    - Remove dot segments (. and ..)
///    - Collapse repeated slashes
///    - Remove trailing slash (except for root /)
/// 5. Remove fragment (everything after #)
/// 6. Remove tracking query parameters and sort the rest
/// 7. Percent-decode the result
///
/// The host keeps any `www.` prefix: the site is fetched from the URL we
/// store, so the host must stay resolvable.
///
/// # Examples
///
/// ```
/// use statehouse::url::normalize_url;
///
/// let url = normalize_url("https://Legis.Example.GOV/Bills/Detail/?id=5#top").unwrap();
/// assert_eq!(url, "https://legis.example.gov/Bills/Detail?id=5");
/// ```
pub fn normalize_url(url_str: &str) -> Result<String, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url
        .host_str()
        .map(|h| h.to_lowercase())
        .ok_or(UrlError::MissingDomain)?;
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            let query_string = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query_string));
        }
    }

    Ok(percent_decode(url.as_str()))
}

/// Resolves a link href against the page it was found on
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - anything that does not resolve to HTTP(S)
pub fn resolve_link(href: &str, base_url: &str) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    let base = Url::parse(base_url).ok()?;
    let absolute = base.join(href).ok()?;
    if absolute.scheme() == "http" || absolute.scheme() == "https" {
        normalize_url(absolute.as_str()).ok()
    } else {
        None
    }
}

/// Returns true if the string looks like an absolute or site-relative URL
pub fn looks_like_url(value: &str) -> bool {
    let value = value.trim();
    value.starts_with("http://") || value.starts_with("https://") || value.starts_with('/')
}

/// Compares two URLs by their normalized path and query
///
/// Sites reference the same page through slightly different forms (absolute
/// or site-relative, different hosts, a mounted prefix such as
/// `/legislation`). Two URLs match when their lowercased path-and-query are
/// equal, or when the shorter one is a whole-segment suffix of the longer.
///
/// # Examples
///
/// ```
/// use statehouse::url::urls_match;
///
/// assert!(urls_match("https://a.gov/Bills/Detail?id=5", "/bills/detail?id=5"));
/// assert!(urls_match("https://a.gov/legis/Bills/Detail?id=5", "/Bills/Detail?id=5"));
/// assert!(!urls_match("/Bills/Detail?id=5", "/Bills/Detail?id=15"));
/// ```
pub fn urls_match(a: &str, b: &str) -> bool {
    let a = path_and_query(a);
    let b = path_and_query(b);

    if a == b {
        return true;
    }

    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let tail = shorter.trim_start_matches('/');
    if tail.is_empty() {
        return false;
    }

    longer.ends_with(&format!("/{}", tail))
}

/// Extracts the lowercased path and query used for URL comparison
pub fn path_and_query(value: &str) -> String {
    let value = value.trim();
    let raw = match Url::parse(value) {
        Ok(url) => match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        },
        Err(_) => value.split('#').next().unwrap_or_default().to_string(),
    };

    let mut decoded = percent_decode(&raw).to_lowercase();
    while decoded.len() > 1 && decoded.ends_with('/') {
        decoded.pop();
    }
    decoded
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut normalized_segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                normalized_segments.pop();
            }
            _ => normalized_segments.push(segment),
        }
    }

    if normalized_segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", normalized_segments.join("/"))
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort();
    params
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}

/// Decodes `%XX` escapes; invalid escapes are kept verbatim
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi * 16 + lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_scheme() {
        let result = normalize_url("http://example.com/page").unwrap();
        assert_eq!(result, "http://example.com/page");
    }

    #[test]
    fn test_remove_trailing_slash() {
        let result = normalize_url("https://example.com/page/").unwrap();
        assert_eq!(result, "https://example.com/page");
    }

    #[test]
    fn test_keep_root_slash() {
        let result = normalize_url("https://example.com/").unwrap();
        assert_eq!(result, "https://example.com/");
    }

    #[test]
    fn test_remove_fragment() {
        let result = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(result, "https://example.com/page");
    }

    #[test]
    fn test_remove_tracking_params() {
        let result = normalize_url("https://example.com/page?utm_source=twitter").unwrap();
        assert_eq!(result, "https://example.com/page");
    }

    #[test]
    fn test_sort_query_params() {
        let result = normalize_url("https://example.com/page?b=2&a=1").unwrap();
        assert_eq!(result, "https://example.com/page?a=1&b=2");
    }

    #[test]
    fn test_percent_decoded() {
        let result = normalize_url("https://example.com/Members/Jane%20Doe").unwrap();
        assert_eq!(result, "https://example.com/Members/Jane Doe");
    }

    #[test]
    fn test_normalize_path_with_dots() {
        let result = normalize_url("https://example.com/a/../b/./c").unwrap();
        assert_eq!(result, "https://example.com/b/c");
    }

    #[test]
    fn test_lowercase_domain_keeps_path_case() {
        let result = normalize_url("https://EXAMPLE.COM/Bills").unwrap();
        assert_eq!(result, "https://example.com/Bills");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let once = normalize_url("https://example.com//Bills/./Detail/?id=7&GA=103").unwrap();
        let twice = normalize_url(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://example.com/page");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url() {
        assert!(normalize_url("not a url").is_err());
    }

    #[test]
    fn test_resolve_relative_link() {
        let resolved = resolve_link("/Bills/Detail?id=1", "https://example.com/Bills").unwrap();
        assert_eq!(resolved, "https://example.com/Bills/Detail?id=1");
    }

    #[test]
    fn test_resolve_skips_special_schemes() {
        let base = "https://example.com/page";
        assert!(resolve_link("javascript:void(0)", base).is_none());
        assert!(resolve_link("mailto:clerk@example.com", base).is_none());
        assert!(resolve_link("tel:+15555555555", base).is_none());
        assert!(resolve_link("#section", base).is_none());
        assert!(resolve_link("", base).is_none());
    }

    #[test]
    fn test_urls_match_absolute_and_relative() {
        assert!(urls_match(
            "https://example.com/Committees/Detail?id=9",
            "/committees/detail?id=9"
        ));
    }

    #[test]
    fn test_urls_match_requires_whole_segments() {
        assert!(!urls_match("/Committees/Detail?id=9", "/Committees/Detail?id=19"));
        assert!(!urls_match("https://example.com/", "https://example.com/Bills"));
    }

    #[test]
    fn test_urls_match_mounted_prefix() {
        assert!(urls_match(
            "https://example.com/legislation/Bills/Detail?id=2",
            "https://other.example.com/Bills/Detail?id=2"
        ));
    }

    #[test]
    fn test_looks_like_url() {
        assert!(looks_like_url("https://example.com"));
        assert!(looks_like_url("/Bills"));
        assert!(!looks_like_url("Jane Doe"));
    }
}
