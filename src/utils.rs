use url::Url;

pub fn set_panic_hook() {
    // When the `console_error_panic_hook` feature is enabled, we can call the
    // `set_panic_hook` function at least once during initialization, and then
    // we will get better error messages if our code ever panics.
    //
    // For more details see
    // https://github.com/rustwasm/console_error_panic_hook#readme
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Routes `log` records to the browser console. The logger can only be
/// installed once; later calls just move the level.
pub fn init_logging(level: log::Level) {
    console_log::init_with_level(level).unwrap_or(());
    log::set_max_level(level.to_level_filter());
}

/// Directory of `url`, without fragment.
pub fn get_base_url(url: &Url) -> Option<Url> {
    let mut result = url.clone();
    result.set_fragment(None);
    result.set_query(None);
    result.join("./").ok()
}

/// Directory of the page the player is embedded in.
pub fn page_base_url() -> Option<Url> {
    let href = web_sys::window()?.location().href().ok()?;
    get_base_url(&Url::parse(&href).ok()?)
}

/// Slider label, e.g. `Volume: 50%`.
pub fn volume_label(volume: f32) -> String {
    format!("Volume: {}%", (volume * 100.0).round() as u32)
}
