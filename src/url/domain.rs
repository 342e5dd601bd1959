use url::Url;

/// Lowercased host of a URL
///
/// The port is not part of the domain, so every port on a host shares one
/// rate-limit bucket and one HTTP session.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use statehouse::url::extract_domain;
///
/// let url = Url::parse("https://example.com/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Extracts the domain from a URL string, the rate limiter's bucket key
pub fn domain_of(url: &str) -> Option<String> {
    Url::parse(url).ok().as_ref().and_then(extract_domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_simple_domain() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_no_host() {
        let url = Url::parse("file:///tmp/page.html").unwrap();
        assert_eq!(extract_domain(&url), None);
    }

    #[test]
    fn test_extract_subdomain() {
        let url = Url::parse("https://ilga.example.gov/Bills").unwrap();
        assert_eq!(extract_domain(&url), Some("ilga.example.gov".to_string()));
    }

    #[test]
    fn test_extract_with_port() {
        let url = Url::parse("https://example.com:8080/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_mixed_case() {
        let url = Url::parse("https://Example.COM/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_domain_of_string() {
        assert_eq!(
            domain_of("http://127.0.0.1:4000/Bills"),
            Some("127.0.0.1".to_string())
        );
        assert_eq!(domain_of("not a url"), None);
    }
}
