//! Application URL lookup: validates and suggests `host.domain` URLs against
//! the domains available to the current space.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::error::UrlError;

/// DNS label rule applied to the host part of an application URL.
pub static HOST_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("valid regex")
});

/// A validated application URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationUrl {
    pub host: String,
    pub domain: String,
}

impl std::fmt::Display for ApplicationUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.host, self.domain)
    }
}

/// Domains available for application routes, longest first so that nested
/// domains win over their parents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationUrlLookup {
    domains: Vec<String>,
}

impl ApplicationUrlLookup {
    #[must_use]
    pub fn new(domains: impl IntoIterator<Item = String>) -> Self {
        let mut domains: Vec<String> = domains
            .into_iter()
            .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        domains.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        domains.dedup();
        Self { domains }
    }

    #[must_use]
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Suggest a URL for an application on the shortest (default) domain.
    #[must_use]
    pub fn suggest(&self, app_name: &str) -> Option<ApplicationUrl> {
        let domain = self.domains.iter().min_by_key(|d| d.len())?;
        let host = sanitize_host(app_name);
        if host.is_empty() {
            return None;
        }
        Some(ApplicationUrl {
            host,
            domain: domain.clone(),
        })
    }

    /// Split and check a user supplied URL.
    ///
    /// # Errors
    ///
    /// Fails when the URL is empty, matches no known domain, or has an
    /// invalid host label.
    pub fn validate(&self, url: &str) -> Result<ApplicationUrl, UrlError> {
        let url = strip_scheme(url.trim()).to_ascii_lowercase();
        if url.is_empty() {
            return Err(UrlError::Empty);
        }
        for domain in &self.domains {
            let Some(host) = url.strip_suffix(domain.as_str()) else {
                continue;
            };
            let Some(host) = host.strip_suffix('.') else {
                continue;
            };
            if !HOST_RE.is_match(host) {
                return Err(UrlError::InvalidHost(host.to_string()));
            }
            return Ok(ApplicationUrl {
                host: host.to_string(),
                domain: domain.clone(),
            });
        }
        Err(UrlError::UnknownDomain(url))
    }
}

fn strip_scheme(url: &str) -> &str {
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    url.trim_end_matches('/')
}

fn sanitize_host(name: &str) -> String {
    let mapped: String = name
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let trimmed = mapped.trim_matches('-');
    trimmed.chars().take(63).collect::<String>().trim_end_matches('-').to_string()
}
