//! Candidate stream URLs for a station.
//!
//! Candidates are ordered resolved URL first, then the primary URL, then the
//! alternates. Blank and duplicate entries are dropped, keeping the first
//! occurrence. Every surviving URL is then routed through the CORS proxy
//! unless its host is on the trusted allow-list.
//!
//! Resolution is pure: it depends only on the station and the configuration.

use url::Url;

use crate::{
    config::Config,
    error::{Error, Result},
    station::Station,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolver {
    proxy: Option<String>,
    trusted_hosts: Vec<String>,
}

impl Resolver {
    #[must_use]
    pub fn new<I, S>(proxy: Option<String>, trusted_hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            proxy: proxy.filter(|prefix| !prefix.trim().is_empty()),
            trusted_hosts: trusted_hosts
                .into_iter()
                .map(|host| host.into().to_ascii_lowercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cors_proxy.clone(), config.trusted_hosts.iter().cloned())
    }

    /// Produces the ordered candidate list for `station`.
    ///
    /// URLs that do not parse, that are not HTTP(S), or that cannot be routed
    /// through the proxy cannot be played and are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no candidate remains.
    pub fn candidates(&self, station: &Station) -> Result<Vec<Url>> {
        let mut seen: Vec<Url> = Vec::new();
        for raw in station.stream_urls() {
            let url = match Url::parse(raw) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => url,
                Ok(url) => {
                    warn!("{station}: skipping {} stream {raw}", url.scheme());
                    continue;
                }
                Err(e) => {
                    warn!("{station}: skipping invalid stream url {raw}: {e}");
                    continue;
                }
            };

            if !seen.contains(&url) {
                seen.push(url);
            }
        }

        let candidates: Vec<Url> = seen
            .into_iter()
            .filter_map(|url| match self.route(&url) {
                Ok(routed) => Some(routed),
                Err(e) => {
                    warn!("{station}: skipping {url}, unable to route through proxy: {e}");
                    None
                }
            })
            .collect();

        if candidates.is_empty() {
            return Err(Error::not_found(format!("{station} has no stream urls")));
        }

        Ok(candidates)
    }

    /// Whether `host` or one of its parent domains is trusted.
    #[must_use]
    pub fn is_trusted(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.trusted_hosts.iter().any(|trusted| {
            host == *trusted
                || host
                    .strip_suffix(trusted.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Rewrites `url` through the proxy unless it is trusted or no proxy is
    /// configured.
    fn route(&self, url: &Url) -> Result<Url> {
        let Some(proxy) = &self.proxy else {
            return Ok(url.clone());
        };

        if url.host_str().is_some_and(|host| self.is_trusted(host)) {
            trace!("direct: {url}");
            return Ok(url.clone());
        }

        let proxied = Url::parse(&format!("{proxy}{url}"))?;
        trace!("proxied: {url} -> {proxied}");
        Ok(proxied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROXY: &str = "https://proxy.example.org/?";

    fn resolver() -> Resolver {
        Resolver::new(Some(PROXY.to_owned()), ["radio.example.com"])
    }

    fn urls(candidates: &[Url]) -> Vec<&str> {
        candidates.iter().map(Url::as_str).collect()
    }

    #[test]
    fn orders_resolved_first_and_deduplicates() {
        let station = Station::new("s", "S", "https://b.example.net/live")
            .with_resolved("https://a.example.net/live")
            .with_alternates(["https://b.example.net/live", "https://c.example.net/live"]);

        let candidates = Resolver::default().candidates(&station).unwrap();
        assert_eq!(
            urls(&candidates),
            vec![
                "https://a.example.net/live",
                "https://b.example.net/live",
                "https://c.example.net/live",
            ]
        );
    }

    #[test]
    fn trusted_hosts_bypass_proxy() {
        let station = Station::new("s", "S", "https://radio.example.com/stream")
            .with_alternates(["https://cdn.radio.example.com/stream", "https://other.example/stream"]);

        let candidates = resolver().candidates(&station).unwrap();
        assert_eq!(
            urls(&candidates),
            vec![
                "https://radio.example.com/stream",
                "https://cdn.radio.example.com/stream",
                "https://proxy.example.org/?https://other.example/stream",
            ]
        );
    }

    #[test]
    fn lookalike_hosts_are_not_trusted() {
        let resolver = resolver();
        assert!(resolver.is_trusted("RADIO.example.com"));
        assert!(!resolver.is_trusted("evilradio.example.com"));
        assert!(!resolver.is_trusted("example.com"));
    }

    #[test]
    fn plain_http_is_proxied_too() {
        let station = Station::new("s", "S", "http://insecure.example:8000/;");
        let candidates = resolver().candidates(&station).unwrap();
        assert_eq!(
            urls(&candidates),
            vec!["https://proxy.example.org/?http://insecure.example:8000/;"]
        );
    }

    #[test]
    fn empty_station_has_no_candidates() {
        let station = Station::new("s", "S", "").with_alternates(["", "  "]);
        let err = resolver().candidates(&station).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn unroutable_candidates_do_not_drop_trusted_ones() {
        let resolver = Resolver::new(
            Some("proxy.example.org/?url=".to_owned()),
            ["radio.example.com"],
        );
        let station = Station::new("s", "S", "https://other.example/live")
            .with_alternates(["https://radio.example.com/live"]);

        let candidates = resolver.candidates(&station).unwrap();
        assert_eq!(urls(&candidates), vec!["https://radio.example.com/live"]);

        let untrusted = Station::new("u", "U", "https://other.example/live");
        let err = resolver.candidates(&untrusted).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn unplayable_urls_are_skipped() {
        let station = Station::new("s", "S", "not a url")
            .with_alternates(["rtsp://camera.example/feed", "https://ok.example/"]);
        let candidates = Resolver::default().candidates(&station).unwrap();
        assert_eq!(urls(&candidates), vec!["https://ok.example/"]);
    }
}
