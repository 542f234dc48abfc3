use std::cell::RefCell;

use serde::Deserialize;
use url::Url;

use crate::player::{DEFAULT_VOLUME, clamp_volume};

/// Page-level settings handed over by the shell as JSON, e.g.
/// `{"baseUrl": "https://example.com/", "initialVolume": 0.4, "preload": true}`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerConfig {
    pub base_url: Option<String>,
    pub initial_volume: f32,
    pub preload: bool,
    pub log_level: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            base_url: None,
            initial_volume: DEFAULT_VOLUME,
            preload: false,
            log_level: "warn".to_owned(),
        }
    }
}

impl PlayerConfig {
    pub fn from_json(json: &str) -> Result<PlayerConfig, serde_json::Error> {
        let mut config: PlayerConfig = serde_json::from_str(json)?;
        config.initial_volume = clamp_volume(config.initial_volume);
        Ok(config)
    }

    pub fn log_level(&self) -> log::Level {
        self.log_level.parse().unwrap_or(log::Level::Warn)
    }

    /// Base URL that relative audio sources resolve against, with a
    /// trailing slash so joins keep its last path segment.
    pub fn base_url(&self) -> Option<Url> {
        let base = self.base_url.as_deref()?.trim();
        if base.is_empty() {
            return None;
        }
        let sanitized = if base.ends_with('/') {
            base.to_owned()
        } else {
            format!("{}/", base)
        };
        Url::parse(&sanitized).ok()
    }
}

thread_local! {
    static CONFIG: RefCell<PlayerConfig> = RefCell::new(PlayerConfig::default());
}

pub fn current() -> PlayerConfig {
    CONFIG.with(|config| config.borrow().clone())
}

pub fn replace(config: PlayerConfig) {
    CONFIG.with(|current| *current.borrow_mut() = config);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = PlayerConfig::from_json("{}").unwrap();
        assert_eq!(config, PlayerConfig::default());
        assert_eq!(config.initial_volume, 0.5);
        assert_eq!(config.log_level(), log::Level::Warn);
    }

    #[test]
    fn parses_camel_case_fields() {
        let config = PlayerConfig::from_json(
            r#"{"baseUrl": "https://ambience.example/app", "initialVolume": 0.8, "preload": true, "logLevel": "debug"}"#,
        )
        .unwrap();

        assert_eq!(
            config.base_url().unwrap().as_str(),
            "https://ambience.example/app/"
        );
        assert_eq!(config.initial_volume, 0.8);
        assert!(config.preload);
        assert_eq!(config.log_level(), log::Level::Debug);
    }

    #[test]
    fn clamps_initial_volume_and_tolerates_bad_level() {
        let config = PlayerConfig::from_json(r#"{"initialVolume": 3.0, "logLevel": "loud"}"#).unwrap();
        assert_eq!(config.initial_volume, 1.0);
        assert_eq!(config.log_level(), log::Level::Warn);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(PlayerConfig::from_json("{baseUrl: nope").is_err());
    }

    #[test]
    fn replace_updates_current() {
        replace(PlayerConfig {
            preload: true,
            ..PlayerConfig::default()
        });
        assert!(current().preload);
        replace(PlayerConfig::default());
        assert!(!current().preload);
    }
}
