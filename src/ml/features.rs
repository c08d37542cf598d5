use crate::error::{PipelineError, Result};
use ndarray::Array2;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tldextract::{TldExtractor, TldOption};
use tracing::debug;

/// Version of the lexical feature schema; bump whenever `FEATURE_NAMES` changes
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Lexical feature names, in column order
pub const FEATURE_NAMES: [&str; 14] = [
    "length",
    "domain_length",
    "subdomain_length",
    "path_length",
    "num_directories",
    "num_digits",
    "num_dots",
    "num_hyphens",
    "num_underscores",
    "num_parameters",
    "has_https",
    "num_subdomains",
    "count_suspicious",
    "has_ip_pattern",
];

/// Number of lexical features
pub const N_LEXICAL_FEATURES: usize = FEATURE_NAMES.len();

/// Keywords common in credential-harvesting URLs
pub const SUSPICIOUS_KEYWORDS: [&str; 9] = [
    "login", "signin", "account", "bank", "confirm", "secure", "webscr", "update", "banking",
];

static IPV4_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+\.\d+").expect("IPv4 pattern is a valid regex")
});

static TLD_EXTRACTOR: Lazy<TldExtractor> = Lazy::new(|| TldExtractor::new(TldOption::default()));

/// Hand-crafted lexical and structural features of one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LexicalFeatures {
    pub length: u32,
    pub domain_length: u32,
    pub subdomain_length: u32,
    pub path_length: u32,
    pub num_directories: u32,
    pub num_digits: u32,
    pub num_dots: u32,
    pub num_hyphens: u32,
    pub num_underscores: u32,
    pub num_parameters: u32,
    pub has_https: u8,
    pub num_subdomains: u32,
    pub count_suspicious: u32,
    pub has_ip_pattern: u8,
}

impl LexicalFeatures {
    /// Values in `FEATURE_NAMES` order
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.length as f64,
            self.domain_length as f64,
            self.subdomain_length as f64,
            self.path_length as f64,
            self.num_directories as f64,
            self.num_digits as f64,
            self.num_dots as f64,
            self.num_hyphens as f64,
            self.num_underscores as f64,
            self.num_parameters as f64,
            self.has_https as f64,
            self.num_subdomains as f64,
            self.count_suspicious as f64,
            self.has_ip_pattern as f64,
        ]
    }

    /// (name, value) pairs in column order
    pub fn named(&self) -> Vec<(&'static str, f64)> {
        FEATURE_NAMES.iter().copied().zip(self.to_vec()).collect()
    }
}

/// Host split into registrable domain label and subdomain
#[derive(Debug, Default, PartialEq)]
struct HostParts {
    domain: String,
    subdomain: String,
    is_ipv4: bool,
}

/// Lexical feature extractor for URLs
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalExtractor;

impl LexicalExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract features; malformed URLs yield all-zero features
    pub fn extract(&self, url: &str) -> LexicalFeatures {
        match self.try_extract(url) {
            Ok(features) => features,
            Err(e) => {
                debug!("Substituting zero features: {}", e);
                LexicalFeatures::default()
            }
        }
    }

    /// Extract features, reporting URLs that cannot be structurally parsed
    ///
    /// Components are measured on the raw text, so percent-encoding, dot
    /// segments and numeric hosts are seen exactly as written.
    pub fn try_extract(&self, url: &str) -> Result<LexicalFeatures> {
        let raw = RawUrl::split(url).ok_or_else(|| PipelineError::ParseDegraded {
            url: url.to_string(),
        })?;

        let parts = Self::split_host(&raw.host);
        let lowered = url.to_lowercase();

        let num_parameters = if raw.query.is_empty() {
            0
        } else {
            raw.query.split('&').count()
        };

        let num_subdomains = if parts.subdomain.is_empty() {
            0
        } else {
            parts.subdomain.split('.').count()
        };

        let count_suspicious = SUSPICIOUS_KEYWORDS
            .iter()
            .filter(|word| lowered.contains(*word))
            .count();

        Ok(LexicalFeatures {
            length: url.chars().count() as u32,
            domain_length: parts.domain.chars().count() as u32,
            subdomain_length: parts.subdomain.chars().count() as u32,
            path_length: raw.path.chars().count() as u32,
            num_directories: raw.path.matches('/').count() as u32,
            num_digits: url.chars().filter(|c| c.is_ascii_digit()).count() as u32,
            num_dots: url.matches('.').count() as u32,
            num_hyphens: url.matches('-').count() as u32,
            num_underscores: url.matches('_').count() as u32,
            num_parameters: num_parameters as u32,
            has_https: u8::from(raw.scheme == "https"),
            num_subdomains: num_subdomains as u32,
            count_suspicious: count_suspicious as u32,
            has_ip_pattern: u8::from(parts.is_ipv4),
        })
    }

    /// Build the dense lexical block, one row per URL
    pub fn extract_matrix<S: AsRef<str>>(&self, urls: &[S]) -> Array2<f64> {
        let mut matrix = Array2::zeros((urls.len(), N_LEXICAL_FEATURES));
        for (i, url) in urls.iter().enumerate() {
            let features = self.extract(url.as_ref()).to_vec();
            for (j, value) in features.into_iter().enumerate() {
                matrix[[i, j]] = value;
            }
        }
        matrix
    }

    /// Column names of the lexical block
    pub fn feature_names(&self) -> Vec<String> {
        FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
    }

    fn split_host(host: &str) -> HostParts {
        // A dotted-quad host has no registrable domain, the whole host counts as the domain
        if IPV4_PATTERN.is_match(host) {
            return HostParts {
                domain: host.to_string(),
                subdomain: String::new(),
                is_ipv4: true,
            };
        }

        // The suffix lookup decodes punycode labels, so only its label counts are
        // used and the lengths come from the labels as written
        let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
        let lookup = match TLD_EXTRACTOR.extract(host) {
            Ok(result) => result,
            Err(e) => {
                debug!("Suffix lookup failed for {}: {}", host, e);
                return HostParts::default();
            }
        };
        if lookup.domain.is_none() {
            return HostParts::default();
        }

        let suffix_labels = lookup.suffix.map_or(0, |s| s.split('.').count());
        match labels.len().checked_sub(suffix_labels + 1) {
            Some(idx) => HostParts {
                domain: labels[idx].to_string(),
                subdomain: labels[..idx].join("."),
                is_ipv4: false,
            },
            None => HostParts::default(),
        }
    }
}

/// URL split into raw components without any normalisation
#[derive(Debug, PartialEq)]
struct RawUrl<'a> {
    scheme: String,
    host: String,
    path: &'a str,
    query: &'a str,
}

impl<'a> RawUrl<'a> {
    /// `scheme ":" "//" authority path ["?" query] ["#" fragment]`
    ///
    /// `None` when the scheme or the host is missing.
    fn split(url: &'a str) -> Option<Self> {
        let colon = url.find(':')?;
        let scheme = &url[..colon];
        let mut chars = scheme.chars();
        let first = chars.next()?;
        if !first.is_ascii_alphabetic()
            || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return None;
        }

        let rest = url[colon + 1..].strip_prefix("//")?;
        let authority_end = rest.find(|c| matches!(c, '/' | '?' | '#')).unwrap_or(rest.len());
        let (authority, rest) = rest.split_at(authority_end);

        let rest = rest.split('#').next().unwrap_or_default();
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));

        let host = Self::host_of(authority).to_lowercase();
        if host.is_empty() {
            return None;
        }

        Some(Self {
            scheme: scheme.to_ascii_lowercase(),
            host,
            path,
            query,
        })
    }

    /// Strip userinfo and port from an authority
    fn host_of(authority: &str) -> &str {
        let host_port = authority.rsplit('@').next().unwrap_or_default();
        if let Some(bracketed) = host_port.strip_prefix('[') {
            return bracketed.split(']').next().unwrap_or_default();
        }
        host_port.split(':').next().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phishing_url_features() {
        let extractor = LexicalExtractor::new();
        let features = extractor.extract("http://paypal-login-secure.badsite.ru/verify");

        assert_eq!(features.length, 44);
        assert_eq!(features.has_https, 0);
        assert_eq!(features.has_ip_pattern, 0);
        assert_eq!(features.num_hyphens, 2);
        assert_eq!(features.num_dots, 2);
        assert_eq!(features.num_subdomains, 1);
        assert_eq!(features.path_length, "/verify".len() as u32);
        assert_eq!(features.num_directories, 1);
        assert!(features.count_suspicious >= 2);
    }

    #[test]
    fn test_https_flag() {
        let extractor = LexicalExtractor::new();
        assert_eq!(extractor.extract("https://example.com/").has_https, 1);
        assert_eq!(extractor.extract("http://example.com/").has_https, 0);
        assert_eq!(extractor.extract("ftp://example.com/").has_https, 0);
        assert_eq!(extractor.extract("httpss://example.com/").has_https, 0);
    }

    #[test]
    fn test_query_parameters() {
        let extractor = LexicalExtractor::new();
        assert_eq!(extractor.extract("https://example.com/").num_parameters, 0);
        assert_eq!(extractor.extract("https://example.com/?").num_parameters, 0);
        assert_eq!(
            extractor.extract("https://example.com/a?x=1").num_parameters,
            1
        );
        assert_eq!(
            extractor
                .extract("https://example.com/a?x=1&y=2&z=3")
                .num_parameters,
            3
        );
    }

    #[test]
    fn test_subdomains() {
        let extractor = LexicalExtractor::new();
        assert_eq!(extractor.extract("https://example.com/").num_subdomains, 0);
        assert_eq!(
            extractor.extract("https://www.example.com/").num_subdomains,
            1
        );
        assert_eq!(
            extractor
                .extract("https://a.b.example.com/")
                .num_subdomains,
            2
        );
    }

    #[test]
    fn test_ip_pattern() {
        let extractor = LexicalExtractor::new();
        let features = extractor.extract("http://192.168.1.1/login");
        assert_eq!(features.has_ip_pattern, 1);
        assert_eq!(features.domain_length, "192.168.1.1".len() as u32);
        assert_eq!(features.num_subdomains, 0);
        assert_eq!(features.count_suspicious, 1);

        // IPv6 literals are not matched
        assert_eq!(extractor.extract("http://[::1]/").has_ip_pattern, 0);
    }

    #[test]
    fn test_suspicious_keywords_case_insensitive() {
        let extractor = LexicalExtractor::new();
        let features = extractor.extract("https://example.com/LOGIN/Account/Update");
        assert_eq!(features.count_suspicious, 3);

        // "banking" also contains "bank"
        let features = extractor.extract("https://example.com/banking");
        assert_eq!(features.count_suspicious, 2);
    }

    #[test]
    fn test_malformed_urls_default_to_zero() {
        let extractor = LexicalExtractor::new();
        for input in ["", "not a url", "://missing-scheme", "http://", "mailto:"] {
            let features = extractor.extract(input);
            assert_eq!(features, LexicalFeatures::default(), "input: {:?}", input);
            assert_eq!(features.to_vec().len(), N_LEXICAL_FEATURES);
            assert!(features.to_vec().iter().all(|v| *v == 0.0));
        }

        let err = extractor.try_extract("not a url").unwrap_err();
        assert!(matches!(err, PipelineError::ParseDegraded { .. }));
    }

    #[test]
    fn test_extract_matrix_shape() {
        let extractor = LexicalExtractor::new();
        let urls = vec!["https://example.com/", "garbage", "http://10.0.0.1/"];
        let matrix = extractor.extract_matrix(&urls);

        assert_eq!(matrix.shape(), &[3, N_LEXICAL_FEATURES]);
        assert_eq!(matrix[[0, 10]], 1.0); // has_https
        assert!(matrix.row(1).iter().all(|v| *v == 0.0));
        assert_eq!(matrix[[2, 13]], 1.0); // has_ip_pattern
    }

    #[test]
    fn test_numeric_hosts_are_not_rewritten() {
        let extractor = LexicalExtractor::new();
        assert_eq!(extractor.extract("http://10.1/").has_ip_pattern, 0);
        assert_eq!(extractor.extract("http://3232235777/").has_ip_pattern, 0);
        assert_eq!(extractor.extract("http://0x7f.0.0.1/").has_ip_pattern, 0);
        assert_eq!(extractor.extract("http://10.0.0.1:8080/").has_ip_pattern, 1);
    }

    #[test]
    fn test_path_measured_as_written() {
        let extractor = LexicalExtractor::new();

        let features = extractor.extract("http://EXAMPLE.com/a/../b");
        assert_eq!(features.path_length, "/a/../b".len() as u32);
        assert_eq!(features.num_directories, 3);

        let features = extractor.extract("http://example.com/café");
        assert_eq!(features.path_length, 5);

        let features = extractor.extract("http://example.com/%41b?x=1#frag&y=2");
        assert_eq!(features.path_length, "/%41b".len() as u32);
        assert_eq!(features.num_parameters, 1);
    }

    #[test]
    fn test_lenient_authority() {
        let extractor = LexicalExtractor::new();

        let features = extractor.extract("http://example.com:99999/login");
        assert_eq!(features.domain_length, "example".len() as u32);
        assert_eq!(features.path_length, "/login".len() as u32);
        assert_eq!(features.count_suspicious, 1);

        let features = extractor.extract("http://user:pw@secure.example.com/");
        assert_eq!(features.domain_length, "example".len() as u32);
        assert_eq!(features.num_subdomains, 1);

        let url = "http://exa mple.com/";
        assert!(extractor.try_extract(url).is_ok());
        assert_eq!(extractor.extract(url).length, url.len() as u32);
    }

    #[test]
    fn test_punycode_domain_keeps_encoded_length() {
        let extractor = LexicalExtractor::new();
        let features = extractor.extract("http://xn--80ak6aa92e.com/");
        assert_eq!(features.domain_length, "xn--80ak6aa92e".len() as u32);
        assert_eq!(features.num_subdomains, 0);
    }

    #[test]
    fn test_raw_url_split() {
        let raw = RawUrl::split("HTTPS://Login.Example.com:443/a/b?x=1&y=2#top").unwrap();
        assert_eq!(raw.scheme, "https");
        assert_eq!(raw.host, "login.example.com");
        assert_eq!(raw.path, "/a/b");
        assert_eq!(raw.query, "x=1&y=2");

        assert_eq!(RawUrl::split("http://[::1]:80/").unwrap().host, "::1");
        assert!(RawUrl::split("1http://example.com/").is_none());
        assert!(RawUrl::split("example.com/path").is_none());
    }

    #[test]
    fn test_named_features() {
        let features = LexicalExtractor::new().extract("https://example.com/");
        let named = features.named();
        assert_eq!(named.len(), N_LEXICAL_FEATURES);
        assert_eq!(named[0].0, "length");
        assert_eq!(named[10], ("has_https", 1.0));
    }
}
