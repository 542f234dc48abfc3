use js_sys::{Reflect, Uint8Array};
use log::debug;
use url::Url;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{ReadableStreamDefaultReader, Response};

use super::error::{FetchError, describe_js_error};

// Content-Length is only a hint; never reserve more than this up front.
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Opens a request for an audio asset.
#[allow(async_fn_in_trait)]
pub trait Fetcher {
    type Body: FetchBody;

    async fn fetch(&self, url: &Url) -> Result<Self::Body, FetchError>;
}

/// A response body read incrementally.
#[allow(async_fn_in_trait)]
pub trait FetchBody {
    /// Total size announced by the server, if any.
    fn content_length(&self) -> Option<u64>;

    /// Next chunk of the body, `None` once the body is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, FetchError>;
}

/// Percentage of `total` covered by `received`, rounded down and capped at 100.
pub fn progress_percent(received: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    (received.saturating_mul(100) / total).min(100) as u8
}

/// Drains `body` into one contiguous buffer. When the total size is known,
/// `on_progress` receives 0 before the first chunk and the running percentage
/// after each chunk; otherwise it is never called.
pub async fn read_body<B: FetchBody>(
    body: &mut B,
    mut on_progress: impl FnMut(u8),
) -> Result<Vec<u8>, FetchError> {
    let total = body.content_length().filter(|len| *len > 0);
    let capacity = total.map_or(0, |len| len.min(MAX_PREALLOCATION) as usize);
    let mut bytes = Vec::with_capacity(capacity);
    let mut received: u64 = 0;

    if total.is_some() {
        on_progress(0);
    }
    while let Some(chunk) = body.next_chunk().await? {
        received += chunk.len() as u64;
        bytes.extend_from_slice(&chunk);
        if let Some(total) = total {
            on_progress(progress_percent(received, total));
        }
    }
    Ok(bytes)
}

/// Resolves a track's audio source against `base_path`. Absolute URLs are
/// returned as-is.
pub fn normalize_source_url(source: &str, base_path: Option<&Url>) -> Result<Url, FetchError> {
    let slash_norm = source.trim().replace('\\', "/");
    if slash_norm.is_empty() {
        return Err(FetchError::InvalidUrl(source.to_owned()));
    }

    if let Ok(parsed_url) = Url::parse(&slash_norm) {
        if parsed_url.has_host() || parsed_url.scheme() == "data" || parsed_url.scheme() == "blob" {
            return Ok(parsed_url);
        }
    }

    match base_path {
        Some(base_path) => base_path
            .join(&slash_norm)
            .map_err(|_| FetchError::InvalidUrl(source.to_owned())),
        None => Err(FetchError::InvalidUrl(source.to_owned())),
    }
}

/// Browser `fetch()` backed fetcher.
#[derive(Default, Clone, Copy)]
pub struct HttpFetcher;

pub struct HttpBody {
    response: Response,
    reader: Option<ReadableStreamDefaultReader>,
    content_length: Option<u64>,
    drained: bool,
}

impl Fetcher for HttpFetcher {
    type Body = HttpBody;

    async fn fetch(&self, url: &Url) -> Result<HttpBody, FetchError> {
        debug!("fetch {}", url);
        let window =
            web_sys::window().ok_or_else(|| FetchError::Network("no window available".into()))?;

        let resp_value = JsFuture::from(window.fetch_with_str(url.as_str()))
            .await
            .map_err(|err| FetchError::Network(describe_js_error(&err)))?;
        let resp: Response = resp_value
            .dyn_into()
            .map_err(|_| FetchError::Network("fetch did not return a Response".into()))?;
        if !resp.ok() {
            return Err(FetchError::Status(resp.status()));
        }

        let content_length = resp
            .headers()
            .get("content-length")
            .ok()
            .flatten()
            .and_then(|value| value.trim().parse::<u64>().ok());
        let reader = resp
            .body()
            .map(|stream| stream.get_reader().unchecked_into::<ReadableStreamDefaultReader>());

        Ok(HttpBody {
            response: resp,
            reader,
            content_length,
            drained: false,
        })
    }
}

impl FetchBody for HttpBody {
    fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, FetchError> {
        if self.drained {
            return Ok(None);
        }

        let Some(reader) = &self.reader else {
            // No readable stream exposed, take the whole body in one go.
            self.drained = true;
            let promise = self
                .response
                .array_buffer()
                .map_err(|err| FetchError::Body(describe_js_error(&err)))?;
            let buffer = JsFuture::from(promise)
                .await
                .map_err(|err| FetchError::Body(describe_js_error(&err)))?;
            return Ok(Some(Uint8Array::new(&buffer).to_vec()));
        };

        let result = JsFuture::from(reader.read())
            .await
            .map_err(|err| FetchError::Body(describe_js_error(&err)))?;
        let done = Reflect::get(&result, &JsValue::from_str("done"))
            .map(|value| value.is_truthy())
            .unwrap_or(true);
        if done {
            self.drained = true;
            return Ok(None);
        }

        let value = Reflect::get(&result, &JsValue::from_str("value"))
            .map_err(|err| FetchError::Body(describe_js_error(&err)))?;
        Ok(Some(Uint8Array::new(&value).to_vec()))
    }
}
