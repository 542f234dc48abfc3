use serde::Deserialize;

/// One recording shown on the page.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDescriptor {
    pub name: String,
    pub audio_source: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub place: String,
}

impl TrackDescriptor {
    pub fn new(name: &str, audio_source: &str) -> TrackDescriptor {
        TrackDescriptor {
            name: name.to_owned(),
            audio_source: audio_source.to_owned(),
            date: String::new(),
            place: String::new(),
        }
    }
}

pub fn default_tracks() -> Vec<TrackDescriptor> {
    vec![
        TrackDescriptor::new("Sizzling Lasagna", "/sounds/sizzling_lasagna.WAV"),
        TrackDescriptor::new("Odense Å 1", "/sounds/odense_aa1_cleaned.WAV"),
        TrackDescriptor::new("Odense Å 2", "/sounds/odense_aa2_cleaned.WAV"),
    ]
}

/// Parses a JSON array of tracks. Tracks without a name or audio source are
/// rejected.
pub fn parse_tracks(json: &str) -> Result<Vec<TrackDescriptor>, String> {
    let tracks: Vec<TrackDescriptor> =
        serde_json::from_str(json).map_err(|err| format!("invalid track list: {}", err))?;
    if let Some(index) = tracks
        .iter()
        .position(|track| track.name.trim().is_empty() || track.audio_source.trim().is_empty())
    {
        return Err(format!("track #{} needs a name and an audio source", index + 1));
    }
    Ok(tracks)
}
