//! Remote acquisition: bounded HTTP fetches feeding the ingestion engine.

use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};

use crate::error::{ApiError, ApiResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:91.0) Gecko/20100101 Firefox/91.0";
const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// A fetched response body with its declared content type.
pub struct Fetched {
    content_type: String,
    body: Vec<u8>,
}

impl Fetched {
    /// (type, subtype) of the declared content type, lowercased and with
    /// parameters stripped: `"image/png; charset=x"` becomes `("image", "png")`.
    pub fn media_type(&self) -> (&str, &str) {
        let essence = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        match essence.split_once('/') {
            Some((kind, subtype)) => (kind, subtype),
            None => (essence, ""),
        }
    }

    pub fn is_image(&self) -> bool {
        self.media_type().0 == "image"
    }

    /// File extension implied by the content type subtype.
    pub fn extension(&self) -> &str {
        self.media_type().1
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

/// HTTP client for pulling remote images. Every request is bounded by
/// connect and total timeouts so a hung origin cannot pin an ingestion slot.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(FETCH_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Plain GET. Non-success statuses and transport failures are errors.
    pub async fn get(&self, url: &str) -> ApiResult<Fetched> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ApiError::UpstreamUnreachable(err.to_string()))?;
        Self::read(response).await
    }

    /// GET with a browser-like header set. Hot-link-protected origins reject
    /// bare clients; the referer is the gallery page the url came from.
    pub async fn get_as_browser(&self, url: &str, referer: &str) -> ApiResult<Fetched> {
        let response = self
            .client
            .get(url)
            .headers(browser_headers(referer))
            .send()
            .await
            .map_err(|err| ApiError::UpstreamUnreachable(err.to_string()))?;
        Self::read(response).await
    }

    async fn read(response: reqwest::Response) -> ApiResult<Fetched> {
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::UpstreamStatus(status.as_u16()));
        }
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let body = response
            .bytes()
            .await
            .map_err(|err| ApiError::UpstreamUnreachable(err.to_string()))?
            .to_vec();
        Ok(Fetched { content_type, body })
    }
}

fn browser_headers(referer: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(header::ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.5"),
    );
    if let Ok(value) = HeaderValue::from_str(referer) {
        headers.insert(header::REFERER, value);
    }
    headers
}
