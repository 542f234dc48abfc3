use std::{cell::RefCell, rc::Rc};

use futures::future::{FutureExt, LocalBoxFuture, Shared};
use log::{debug, error, info};
use url::Url;

use super::{
    audio::AudioDecoder,
    error::LoadError,
    net_task::{Fetcher, read_body},
};

type PendingLoad<B> = Shared<LocalBoxFuture<'static, Result<B, LoadError>>>;

pub type ProgressCallback = Rc<dyn Fn(u8)>;

enum LoadState<B: Clone> {
    NotLoaded,
    Loading(PendingLoad<B>),
    Loaded(B),
}

/// Fetches and decodes one track's audio exactly once and keeps the result
/// for as long as the loader lives. A failed load leaves nothing cached, so
/// the next call starts over.
pub struct AudioSourceLoader<F: Fetcher, D: AudioDecoder> {
    url: Url,
    fetcher: Rc<F>,
    decoder: Rc<D>,
    state: Rc<RefCell<LoadState<D::Buffer>>>,
    on_progress: Option<ProgressCallback>,
}

impl<F, D> AudioSourceLoader<F, D>
where
    F: Fetcher + 'static,
    D: AudioDecoder + 'static,
{
    pub fn new(url: Url, fetcher: Rc<F>, decoder: Rc<D>) -> Self {
        AudioSourceLoader {
            url,
            fetcher,
            decoder,
            state: Rc::new(RefCell::new(LoadState::NotLoaded)),
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*self.state.borrow(), LoadState::Loaded(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(*self.state.borrow(), LoadState::Loading(_))
    }

    pub fn cached(&self) -> Option<D::Buffer> {
        match &*self.state.borrow() {
            LoadState::Loaded(buffer) => Some(buffer.clone()),
            _ => None,
        }
    }

    /// Returns the decoded buffer, fetching and decoding it first if needed.
    /// Callers arriving while a load is in flight wait on that same load.
    pub async fn load(&self) -> Result<D::Buffer, LoadError> {
        let pending = {
            let mut state = self.state.borrow_mut();
            match &*state {
                LoadState::Loaded(buffer) => return Ok(buffer.clone()),
                LoadState::Loading(pending) => {
                    debug!("joining in-flight load of {}", self.url);
                    pending.clone()
                }
                LoadState::NotLoaded => {
                    let pending = self.begin_load();
                    *state = LoadState::Loading(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    fn begin_load(&self) -> PendingLoad<D::Buffer> {
        let url = self.url.clone();
        let fetcher = Rc::clone(&self.fetcher);
        let decoder = Rc::clone(&self.decoder);
        let state = Rc::downgrade(&self.state);
        let on_progress = self.on_progress.clone();

        async move {
            let result = fetch_and_decode(&*fetcher, &*decoder, &url, on_progress).await;
            if let Err(err) = &result {
                error!("Error loading audio from {}: {}", url, err);
            }
            if let Some(state) = state.upgrade() {
                *state.borrow_mut() = match &result {
                    Ok(buffer) => LoadState::Loaded(buffer.clone()),
                    Err(_) => LoadState::NotLoaded,
                };
            }
            result
        }
        .boxed_local()
        .shared()
    }
}

async fn fetch_and_decode<F: Fetcher, D: AudioDecoder>(
    fetcher: &F,
    decoder: &D,
    url: &Url,
    on_progress: Option<ProgressCallback>,
) -> Result<D::Buffer, LoadError> {
    info!("loading audio from {}", url);
    let mut body = fetcher.fetch(url).await?;
    let bytes = read_body(&mut body, |percent| {
        if let Some(on_progress) = &on_progress {
            on_progress(percent);
        }
    })
    .await?;

    debug!("fetched {} bytes from {}, decoding", bytes.len(), url);
    let buffer = decoder.decode(bytes).await?;
    info!("audio from {} ready", url);
    Ok(buffer)
}
