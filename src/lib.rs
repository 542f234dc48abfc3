pub mod catalog;
pub mod config;
mod js_api;
pub mod player;
pub mod utils;

use std::rc::Rc;

use js_api::{JsApi, JsPlaybackObserver};
use log::debug;
use utils::{init_logging, page_base_url, set_panic_hook, volume_label};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

use catalog::TrackDescriptor;
use config::PlayerConfig;
use player::{
    PlaybackController, PlaybackState,
    audio::WebAudioGraph,
    net_task::{HttpFetcher, normalize_source_url},
    timer::WindowScheduler,
};

type WebPlaybackController = PlaybackController<WebAudioGraph, WindowScheduler, HttpFetcher>;

/// Applies page-level settings from a JSON string. Players created
/// afterwards pick them up.
#[wasm_bindgen]
pub fn configure(json: &str) -> Result<(), JsValue> {
    let config = PlayerConfig::from_json(json)
        .map_err(|err| JsValue::from_str(&format!("invalid player config: {}", err)))?;
    init_logging(config.log_level());
    debug!("configured: {:?}", config);
    config::replace(config);
    Ok(())
}

#[wasm_bindgen]
pub fn default_tracks() -> js_sys::Array {
    JsApi::tracks_to_js(&catalog::default_tracks())
}

#[wasm_bindgen]
pub fn parse_tracks(json: &str) -> Result<js_sys::Array, JsValue> {
    let tracks = catalog::parse_tracks(json).map_err(|err| JsValue::from_str(&err))?;
    Ok(JsApi::tracks_to_js(&tracks))
}

/// One track's player as seen by the page. Dropping it (`free()` on the JS
/// side) tears the audio graph down.
#[wasm_bindgen]
pub struct SoundPlayer {
    track_id: u32,
    track: TrackDescriptor,
    controller: WebPlaybackController,
}

#[wasm_bindgen]
impl SoundPlayer {
    #[wasm_bindgen(constructor)]
    pub fn new(
        track_id: u32,
        name: String,
        audio_source: String,
        date: Option<String>,
        place: Option<String>,
    ) -> Result<SoundPlayer, JsValue> {
        let config = config::current();
        let track = TrackDescriptor {
            name,
            audio_source,
            date: date.unwrap_or_default(),
            place: place.unwrap_or_default(),
        };

        let base_url = config.base_url().or_else(page_base_url);
        let url = normalize_source_url(&track.audio_source, base_url.as_ref())
            .map_err(|err| JsValue::from_str(&err.to_string()))?;
        let graph = WebAudioGraph::new().map_err(|err| JsValue::from_str(&err.to_string()))?;

        let controller = PlaybackController::new(
            Rc::new(graph),
            Rc::new(WindowScheduler),
            Rc::new(HttpFetcher),
            url,
            config.initial_volume,
            Rc::new(JsPlaybackObserver { track_id }),
        );

        if config.preload {
            let preload = controller.clone();
            spawn_local(async move { preload.preload().await });
        }

        Ok(SoundPlayer {
            track_id,
            track,
            controller,
        })
    }

    #[wasm_bindgen(getter)]
    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    #[wasm_bindgen(getter)]
    pub fn name(&self) -> String {
        self.track.name.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn date(&self) -> String {
        self.track.date.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn place(&self) -> String {
        self.track.place.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn status(&self) -> String {
        self.controller.state().as_str().to_owned()
    }

    #[wasm_bindgen(getter)]
    pub fn is_playing(&self) -> bool {
        self.controller.state() == PlaybackState::Playing
    }

    #[wasm_bindgen(getter)]
    pub fn is_loading(&self) -> bool {
        self.controller.state() == PlaybackState::Loading
    }

    #[wasm_bindgen(getter)]
    pub fn progress(&self) -> Option<u8> {
        self.controller.progress()
    }

    #[wasm_bindgen(getter)]
    pub fn volume(&self) -> f32 {
        self.controller.volume()
    }

    #[wasm_bindgen(getter)]
    pub fn volume_label(&self) -> String {
        volume_label(self.controller.volume())
    }

    /// Play/stop button handler.
    pub fn toggle(&self) {
        let controller = self.controller.clone();
        spawn_local(async move { controller.toggle().await });
    }

    /// Resolves once the track is sounding, or once loading has failed.
    pub fn start(&self) -> js_sys::Promise {
        let controller = self.controller.clone();
        future_to_promise(async move {
            controller.start().await;
            Ok(JsValue::from_str(controller.state().as_str()))
        })
    }

    pub fn stop(&self) {
        self.controller.stop();
    }

    pub fn set_volume(&self, volume: f32) {
        self.controller.set_volume(volume);
    }

    pub fn dispose(&self) {
        self.controller.dispose();
    }
}

impl Drop for SoundPlayer {
    fn drop(&mut self) {
        self.controller.dispose();
    }
}

#[wasm_bindgen(start)]
pub fn main() {
    set_panic_hook();
    init_logging(PlayerConfig::default().log_level());
}
