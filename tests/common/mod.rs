//! Common test utilities for pipeline testing
//!
//! Provides a small synthetic corpus of phishing-looking and ordinary URLs.

use baitdetector::ml::Label;

const PHISHING_HOSTS: [&str; 4] = [
    "secure-login.paypa1-verify.ru",
    "account-update.bank-confirm.xyz",
    "signin.webscr-service.tk",
    "10.0.0.7",
];

const LEGITIMATE_HOSTS: [&str; 4] = [
    "www.wikipedia.org",
    "github.com",
    "docs.rust-lang.org",
    "news.ycombinator.com",
];

/// `n` URLs alternating phishing (1) and legitimate (0)
pub fn labeled_urls(n: usize) -> Vec<(String, Label)> {
    (0..n)
        .map(|i| {
            let k = i / 2;
            if i % 2 == 0 {
                let host = PHISHING_HOSTS[k % PHISHING_HOSTS.len()];
                (format!("http://{}/login/verify?session={}&id={}", host, k, k * 7), 1)
            } else {
                let host = LEGITIMATE_HOSTS[k % LEGITIMATE_HOSTS.len()];
                (format!("https://{}/wiki/page{}", host, k), 0)
            }
        })
        .collect()
}
