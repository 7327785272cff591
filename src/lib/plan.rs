use crate::audio::AudioKind;
use crate::sanitize::{sanitize_component, SanitizeRules};
use anyhow::{Context, Result};
use filetime::FileTime;
use lofty::file::{AudioFile, FileType, TaggedFileExt};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Whether a source file is byte-copied or re-encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeAction {
    Copy,
    Transcode,
}

/// Immutable work order for one resolved source file.
#[derive(Debug, Clone)]
pub struct TranscodePlan {
    /// Absolute path of the source file; never written to.
    pub source: PathBuf,
    /// Destination path relative to the output root, already sanitized.
    pub rel_destination: PathBuf,
    /// Absolute destination path under the output root.
    pub destination: PathBuf,
    pub action: TranscodeAction,
    pub target_bitrate: u32,
}

/// What probing learned about a source file.
#[derive(Debug, Clone)]
pub struct SourceAudio {
    pub kind: AudioKind,
    pub bitrate_kbps: Option<u32>,
}

/// Source inspection capability, substitutable in tests.
pub trait MediaProbe: Sync {
    fn probe(&self, path: &Path) -> SourceAudio;
}

/// lofty-backed probe. Falls back to extension classification (with unknown
/// bitrate) when the file cannot be parsed.
pub struct LoftyProbe;

impl MediaProbe for LoftyProbe {
    fn probe(&self, path: &Path) -> SourceAudio {
        match lofty::read_from_path(path) {
            Ok(tagged) => {
                let kind = match tagged.file_type() {
                    FileType::Mpeg => AudioKind::Mp3,
                    FileType::Flac => AudioKind::Flac,
                    _ => AudioKind::Other,
                };
                SourceAudio {
                    kind,
                    bitrate_kbps: tagged.properties().audio_bitrate(),
                }
            }
            Err(_) => SourceAudio {
                kind: AudioKind::from_path(path),
                bitrate_kbps: None,
            },
        }
    }
}

/// Decide copy-vs-transcode and compute the sanitized destination.
///
/// An MP3 source already at or under the target bitrate is byte-copied to
/// avoid a needless re-encode; everything else (including an MP3 whose
/// bitrate could not be read) is transcoded at exactly the target bitrate.
pub fn plan(
    source_root: &Path,
    output_root: &Path,
    rel_source: &Path,
    info: &SourceAudio,
    target_bitrate: u32,
    rules: &SanitizeRules,
    strip_track_numbers: bool,
) -> TranscodePlan {
    let action = match (info.kind, info.bitrate_kbps) {
        (AudioKind::Mp3, Some(kbps)) if kbps <= target_bitrate => TranscodeAction::Copy,
        _ => TranscodeAction::Transcode,
    };

    let mut rel_destination = PathBuf::new();
    if let Some(parent) = rel_source.parent() {
        for component in parent.components() {
            if let Component::Normal(name) = component {
                rel_destination.push(sanitize_component(&name.to_string_lossy(), rules));
            }
        }
    }

    let stem = rel_source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut stem = sanitize_component(&stem, rules);
    if strip_track_numbers {
        stem = strip_leading_track_number(&stem).to_string();
    }
    rel_destination.push(format!("{stem}.mp3"));

    TranscodePlan {
        source: source_root.join(rel_source),
        destination: output_root.join(&rel_destination),
        rel_destination,
        action,
        target_bitrate,
    }
}

/// Remove a leading "NN - " prefix when NN parses as a track number.
fn strip_leading_track_number(stem: &str) -> &str {
    match stem.split_once(" - ") {
        Some((prefix, rest)) if !rest.is_empty() && prefix.trim().parse::<u32>().is_ok() => rest,
        _ => stem,
    }
}

/// True when a prior run already produced this destination from the same
/// source: the destination carries the source's mtime stamp (see
/// [`mark_satisfied`]) and, for a byte copy, the same size.
pub fn already_satisfied(plan: &TranscodePlan) -> Result<bool> {
    let dst = match fs::metadata(&plan.destination) {
        Ok(meta) => meta,
        Err(_) => return Ok(false),
    };
    let src = fs::metadata(&plan.source)
        .with_context(|| format!("Failed to stat source '{}'", plan.source.display()))?;

    if FileTime::from_last_modification_time(&dst) != FileTime::from_last_modification_time(&src) {
        return Ok(false);
    }
    Ok(plan.action != TranscodeAction::Copy || dst.len() == src.len())
}

/// Stamp the destination with the source's mtime so the next run can skip
/// it. Called only after the entry fully completed, so an interrupted run
/// never looks satisfied.
pub fn mark_satisfied(plan: &TranscodePlan) -> Result<()> {
    let src = fs::metadata(&plan.source)
        .with_context(|| format!("Failed to stat source '{}'", plan.source.display()))?;
    filetime::set_file_mtime(
        &plan.destination,
        FileTime::from_last_modification_time(&src),
    )
    .with_context(|| {
        format!(
            "Failed to stamp mtime on '{}'",
            plan.destination.display()
        )
    })
}
