//! Best-effort stream verification.
//!
//! Before a candidate is handed to the audio output, it can be probed with a
//! small ranged `GET`. A probe that fails quickly saves the engine from
//! waiting out the full load timeout on a dead stream.
//!
//! Verification is advisory. It never returns an error: network failures,
//! timeouts and unexpected responses all resolve to `false`. The engine is
//! correct without it.

use std::{sync::Arc, time::Duration};

use futures_util::{future::BoxFuture, FutureExt};
use reqwest::{
    header::{HeaderValue, ACCEPT, CONTENT_TYPE, RANGE},
    StatusCode,
};
use url::Url;

use crate::{
    error::{Error, Result},
    http,
};

/// Decides whether a candidate URL is worth attempting.
pub trait Verify: Send + Sync {
    fn verify<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, bool>;
}

pub struct Verifier {
    client: Arc<http::Client>,
    timeout: Duration,
}

impl Verifier {
    /// Only the first few kilobytes are requested. Servers that ignore the
    /// range still work: the body is dropped after the first chunk.
    const PROBE_RANGE: &'static str = "bytes=0-4095";

    #[must_use]
    pub fn new(client: Arc<http::Client>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn probe(&self, url: &Url) -> Result<()> {
        let mut request = self.client.get(url.clone());
        let headers = request.headers_mut();
        headers.insert(RANGE, HeaderValue::from_static(Self::PROBE_RANGE));
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        let mut response = self.client.execute(request).await?;

        let status = response.status();
        if !(status.is_success() || status == StatusCode::PARTIAL_CONTENT) {
            return Err(Error::unavailable(format!("status {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !is_stream_type(content_type) {
            return Err(Error::unimplemented(format!(
                "unexpected content type \"{content_type}\""
            )));
        }

        match response.chunk().await? {
            Some(chunk) if !chunk.is_empty() => Ok(()),
            _ => Err(Error::data_loss("empty response")),
        }
    }
}

impl Verify for Verifier {
    fn verify<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, bool> {
        async move {
            match tokio::time::timeout(self.timeout, self.probe(url)).await {
                Ok(Ok(())) => {
                    trace!("verified {url}");
                    true
                }
                Ok(Err(e)) => {
                    debug!("verification of {url} failed: {e}");
                    false
                }
                Err(_) => {
                    debug!("verification of {url} timed out after {:?}", self.timeout);
                    false
                }
            }
        }
        .boxed()
    }
}

/// Whether a `Content-Type` can carry audio. A missing header is given the
/// benefit of the doubt, as many Shoutcast servers do not send one.
#[must_use]
pub fn is_stream_type(content_type: &str) -> bool {
    let lower = content_type.trim().to_ascii_lowercase();
    let essence = lower.split(';').next().unwrap_or_default().trim();
    essence.is_empty()
        || essence.starts_with("audio/")
        || essence.starts_with("video/")
        || essence.contains("mpegurl")
        || essence == "application/ogg"
        || essence == "application/octet-stream"
}
