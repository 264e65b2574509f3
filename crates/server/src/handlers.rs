//! The two ingestion endpoints: direct upload and remote url.

use std::io;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::{Deserialize, Serialize};

use imagehoard_core::{Error as CoreError, Ingested};

use crate::error::{ApiError, ApiResult};
use crate::scrape;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TagQuery {
    pub tag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UrlForm {
    pub url: Option<String>,
}

/// Success body of both endpoints.
#[derive(Debug, Serialize)]
pub struct StoredImage {
    #[serde(rename = "Hash")]
    pub hash: u64,
    #[serde(rename = "Size")]
    pub size: u64,
}

/// `POST /file?tag=<label>` with the raw image as the body; the content type
/// must be `image/<ext>`. 201 with the fingerprint and surviving size.
pub async fn ingest_file(
    State(state): State<AppState>,
    Query(query): Query<TagQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let tag = require_tag(query)?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let ext = image_extension(&content_type).ok_or_else(|| {
        ApiError::BadRequest(format!("content type {content_type:?} is not an image"))
    })?;

    let ingested = ingest_bytes(&state, body.to_vec(), ext.to_string(), tag).await?;
    Ok(created(&ingested))
}

/// `POST /url?tag=<label>` with form field `url`. Fetches the url, falling back
/// to gallery-page scraping for one hop, then ingests and records the
/// resolved url against the surviving image.
pub async fn ingest_url(
    State(state): State<AppState>,
    Query(query): Query<TagQuery>,
    Form(form): Form<UrlForm>,
) -> ApiResult<Response> {
    let tag = require_tag(query)?;
    let url = form
        .url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ApiError::BadRequest("no url found in form".to_string()))?;

    if let Some(response) = already_archived(&state, &url)? {
        return Ok(response);
    }

    let fetched = state.fetcher.get(&url).await?;
    let (resolved_url, fetched) = if fetched.is_image() {
        (url, fetched)
    } else {
        // Not an image: treat the body as a gallery page and follow its
        // first candidate, exactly once.
        let html = String::from_utf8_lossy(fetched.body()).into_owned();
        let candidate = scrape::extract_image_urls(&html)
            .into_iter()
            .next()
            .ok_or(ApiError::NotAnImage)?;
        tracing::debug!(page = %url, image = %candidate, "resolved gallery page");

        if let Some(response) = already_archived(&state, &candidate)? {
            return Ok(response);
        }
        let refetched = state.fetcher.get_as_browser(&candidate, &url).await?;
        if !refetched.is_image() {
            return Err(ApiError::NotAnImage);
        }
        (candidate, refetched)
    };

    let ext = fetched.extension().to_string();
    let ingested = ingest_bytes(&state, fetched.into_body(), ext, tag).await?;

    // A concurrent ingestion of the same url may have won the race; the link
    // exists either way.
    match state.store.add_url(ingested.fingerprint, &resolved_url) {
        Ok(()) | Err(CoreError::DuplicateUrl(_)) => {}
        Err(err) => return Err(err.into()),
    }

    Ok(created(&ingested))
}

fn require_tag(query: TagQuery) -> ApiResult<String> {
    query
        .tag
        .filter(|tag| !tag.is_empty())
        .ok_or_else(|| ApiError::BadRequest("no tag found in query".to_string()))
}

/// Subtype of an `image/*` content type, used as the stored file extension.
fn image_extension(content_type: &str) -> Option<&str> {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    match essence.split_once('/') {
        Some(("image", subtype)) if !subtype.is_empty() => Some(subtype),
        _ => None,
    }
}

/// 208 response if the url is already linked to an archived image.
fn already_archived(state: &AppState, url: &str) -> ApiResult<Option<Response>> {
    match state.store.find_url(url) {
        Ok(fingerprint) => {
            tracing::debug!(%url, fingerprint, "url already archived");
            Ok(Some(
                (StatusCode::ALREADY_REPORTED, "url already archived").into_response(),
            ))
        }
        Err(CoreError::UrlNotFound(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Run the blocking ingest pipeline (file write, decode, store) off the
/// async worker threads.
async fn ingest_bytes(
    state: &AppState,
    bytes: Vec<u8>,
    ext: String,
    tag: String,
) -> ApiResult<Ingested> {
    let ingestor = state.ingestor.clone();
    let ingested = tokio::task::spawn_blocking(move || {
        ingestor.ingest(io::Cursor::new(bytes), &ext, &tag)
    })
    .await
    .map_err(|err| ApiError::Internal(err.to_string()))??;

    tracing::info!(
        fingerprint = ingested.fingerprint,
        size = ingested.size,
        outcome = ?ingested.outcome,
        "ingested image"
    );
    Ok(ingested)
}

fn created(ingested: &Ingested) -> Response {
    (
        StatusCode::CREATED,
        Json(StoredImage {
            hash: ingested.fingerprint,
            size: ingested.size,
        }),
    )
        .into_response()
}
