use std::path::Path;

/// Audio file format constants used across the application
/// These define all audio formats the pipeline will pick up
/// Please update this list when adding new audio formats
/// MP3 sources may be byte-copied when already at or under the target bitrate
pub const MP3_EXTENSIONS: &[&str] = &["mp3"];

/// FLAC sources are always transcoded; tags and art are readable
pub const FLAC_EXTENSIONS: &[&str] = &["flac"];

/// Other formats the transcode engine accepts as input
pub const OTHER_AUDIO_EXTENSIONS: &[&str] = &[
    "m4a", "m4b", "mp4", "aac", "ogg", "oga", "opus", "wav", "aiff", "aif", "wma",
];

/// Format class relevant to the copy-vs-transcode decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioKind {
    Mp3,
    Flac,
    Other,
}

impl AudioKind {
    /// Classify a file by extension alone, for when the file itself cannot be parsed.
    pub fn from_path<P: AsRef<Path>>(path: P) -> AudioKind {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if MP3_EXTENSIONS.contains(&ext.as_str()) {
            AudioKind::Mp3
        } else if FLAC_EXTENSIONS.contains(&ext.as_str()) {
            AudioKind::Flac
        } else {
            AudioKind::Other
        }
    }
}

/// Get all supported audio file extensions as a combined vector
pub fn get_all_audio_extensions() -> Vec<&'static str> {
    MP3_EXTENSIONS
        .iter()
        .chain(FLAC_EXTENSIONS.iter())
        .chain(OTHER_AUDIO_EXTENSIONS.iter())
        .copied()
        .collect()
}

/// Check if a file path has a supported audio extension
pub fn is_audio_file<P: AsRef<Path>>(path: P) -> bool {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    get_all_audio_extensions()
        .iter()
        .any(|&supported_ext| supported_ext == ext)
}
