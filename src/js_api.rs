use wasm_bindgen::prelude::*;

use crate::{
    catalog::TrackDescriptor,
    player::{LoadError, PlaybackObserver, PlaybackState},
};

pub fn safe_string(s: &str) -> String {
    String::from_utf8_lossy(s.as_bytes()).into_owned()
}

pub fn safe_js_string(s: &str) -> JsValue {
    JsValue::from_str(&safe_string(s))
}

#[wasm_bindgen(module = "ambience-js-api")]
extern "C" {
    pub fn onPlayerStatusChanged(track_id: u32, status: &str);
    pub fn onLoadProgress(track_id: u32, percent: u8);
    pub fn onLoadError(track_id: u32, message: &str);
}

pub struct JsApi {}

impl JsApi {
    pub fn dispatch_status_changed(track_id: u32, state: PlaybackState) {
        onPlayerStatusChanged(track_id, state.as_str());
    }

    pub fn dispatch_load_progress(track_id: u32, percent: u8) {
        onLoadProgress(track_id, percent);
    }

    pub fn dispatch_load_error(track_id: u32, error: &LoadError) {
        onLoadError(track_id, &safe_string(&error.to_string()));
    }

    pub fn track_to_js(track_id: u32, track: &TrackDescriptor) -> js_sys::Object {
        let map = js_sys::Map::new();
        map.str_set("id", &JsValue::from(track_id));
        map.str_set("name", &safe_js_string(&track.name));
        map.str_set("audioSource", &safe_js_string(&track.audio_source));
        map.str_set("date", &safe_js_string(&track.date));
        map.str_set("place", &safe_js_string(&track.place));
        map.to_js_object()
    }

    /// Track ids are 1-based positions in the list.
    pub fn tracks_to_js(tracks: &[TrackDescriptor]) -> js_sys::Array {
        tracks
            .iter()
            .enumerate()
            .map(|(index, track)| JsValue::from(Self::track_to_js(index as u32 + 1, track)))
            .collect()
    }
}

/// Forwards a controller's events to the shell, tagged with the track id.
pub struct JsPlaybackObserver {
    pub track_id: u32,
}

impl PlaybackObserver for JsPlaybackObserver {
    fn state_changed(&self, state: PlaybackState) {
        JsApi::dispatch_status_changed(self.track_id, state);
    }

    fn load_progress(&self, percent: u8) {
        JsApi::dispatch_load_progress(self.track_id, percent);
    }

    fn load_failed(&self, error: &LoadError) {
        JsApi::dispatch_load_error(self.track_id, error);
    }
}

pub trait JsSerializable {
    fn to_js_object(&self) -> js_sys::Object;
}

pub trait JsUtils {
    fn str_set(&self, key: &str, value: &JsValue);
}

impl JsSerializable for js_sys::Map {
    fn to_js_object(&self) -> js_sys::Object {
        js_sys::Object::from_entries(self).unwrap_or_default()
    }
}

impl JsUtils for js_sys::Map {
    fn str_set(&self, key: &str, value: &JsValue) {
        self.set(&safe_js_string(key), value);
    }
}
