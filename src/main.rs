use anyhow::{bail, Context, Result};
use clap::Parser;
use m3uport::engine::FfmpegCli;
use m3uport::index::FsIndex;
use m3uport::pipeline::{Config, Pipeline};
use m3uport::plan::{self, LoftyProbe, MediaProbe, TranscodeAction};
use m3uport::playlist;
use m3uport::sanitize::SanitizeRules;
use m3uport::tags::LoftyTags;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::Subcommand)]
enum Commands {
    /// Convert every playlist in a directory for the target device
    Convert {
        /// Directory holding the playlists; entries are resolved against it too
        input_dir: String,
        /// The output directory
        #[arg(long, default_value = "output")]
        output_dir: String,
        /// Bitrate of encoded MP3 files, e.g.: 160k, 256k, 320k
        #[arg(long, default_value = "320k")]
        bitrate: String,
        /// Replace characters the device cannot store with this character
        #[arg(long, default_value = "_")]
        replacement_char: char,
        /// Path prefix the device expects on playlist entries
        #[arg(long, default_value = "Music/")]
        device_root: String,
        /// Remove leading "NN - " track numbers from output file names
        #[arg(long)]
        strip_track_numbers: bool,
        /// Concurrent copy/transcode operations
        #[arg(long, default_value_t = 4)]
        jobs: usize,
    },
    /// Show what convert would do without writing anything
    Plan {
        /// Directory holding the playlists; entries are resolved against it too
        input_dir: String,
        /// The output directory the plan is computed against
        #[arg(long, default_value = "output")]
        output_dir: String,
        /// Bitrate of encoded MP3 files, e.g.: 160k, 256k, 320k
        #[arg(long, default_value = "320k")]
        bitrate: String,
        /// Replace characters the device cannot store with this character
        #[arg(long, default_value = "_")]
        replacement_char: char,
        /// Remove leading "NN - " track numbers from output file names
        #[arg(long)]
        strip_track_numbers: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Convert {
            input_dir,
            output_dir,
            bitrate,
            replacement_char,
            device_root,
            strip_track_numbers,
            jobs,
        } => {
            let input_path = expand_existing_dir(&input_dir)?;
            let target_bitrate = parse_bitrate(&bitrate)?;
            let rules = sanitize_rules(replacement_char)?;

            let output_root = PathBuf::from(shellexpand::tilde(&output_dir).into_owned());
            fs::create_dir_all(&output_root).with_context(|| {
                format!("Failed to create output root '{}'", output_root.display())
            })?;

            // A missing encoder should abort before any file is touched.
            let engine = FfmpegCli::locate()?;

            info!("Indexing source files under '{}'", input_path.display());
            let index = FsIndex::build(&input_path, &rules)?;
            info!("Indexed {} files", index.len());

            let playlists = discover_playlists(&input_path)?;
            if playlists.is_empty() {
                warn!("No playlists found in '{}'", input_path.display());
                return Ok(());
            }
            info!(
                "Found {} playlist(s) in '{}'",
                playlists.len(),
                input_path.display()
            );

            let config = Config {
                source_root: input_path,
                output_root,
                target_bitrate,
                device_root,
                rules,
                strip_track_numbers,
                jobs,
            };
            let probe = LoftyProbe;
            let tags = LoftyTags;
            let pipeline = Pipeline::new(&config, &index, &probe, &engine, &tags);

            for playlist_path in &playlists {
                info!("Working on '{}'", playlist_path.display());
                let summary = pipeline.convert(playlist_path)?;
                info!("{summary}");
            }
        }
        Commands::Plan {
            input_dir,
            output_dir,
            bitrate,
            replacement_char,
            strip_track_numbers,
        } => {
            let input_path = expand_existing_dir(&input_dir)?;
            let target_bitrate = parse_bitrate(&bitrate)?;
            let rules = sanitize_rules(replacement_char)?;
            let output_root = PathBuf::from(shellexpand::tilde(&output_dir).into_owned());

            info!("Indexing source files under '{}'", input_path.display());
            let index = FsIndex::build(&input_path, &rules)?;
            info!("Indexed {} files", index.len());

            for playlist_path in discover_playlists(&input_path)? {
                info!("Planning '{}'", playlist_path.display());
                plan_playlist(
                    &playlist_path,
                    &input_path,
                    &output_root,
                    &index,
                    target_bitrate,
                    &rules,
                    strip_track_numbers,
                )?;
            }
        }
    }

    Ok(())
}

/// Print per-entry actions for one playlist without touching the output tree.
fn plan_playlist(
    playlist_path: &Path,
    source_root: &Path,
    output_root: &Path,
    index: &FsIndex,
    target_bitrate: u32,
    rules: &SanitizeRules,
    strip_track_numbers: bool,
) -> Result<()> {
    let probe = LoftyProbe;
    for raw in playlist::read_entries(playlist_path)? {
        match index.resolve(&raw) {
            Ok(rel) => {
                let info = probe.probe(&source_root.join(&rel));
                let plan = plan::plan(
                    source_root,
                    output_root,
                    &rel,
                    &info,
                    target_bitrate,
                    rules,
                    strip_track_numbers,
                );
                match plan.action {
                    TranscodeAction::Copy => info!(
                        "COPY      {} -> {}",
                        plan.source.display(),
                        plan.destination.display()
                    ),
                    TranscodeAction::Transcode => info!(
                        "TRANSCODE {} -> {} ({}kbps)",
                        plan.source.display(),
                        plan.destination.display(),
                        plan.target_bitrate
                    ),
                }
            }
            Err(e) => warn!("SKIP      {raw}: {e}"),
        }
    }
    Ok(())
}

fn expand_existing_dir(dir: &str) -> Result<PathBuf> {
    let expanded = PathBuf::from(shellexpand::tilde(dir).into_owned());
    if !expanded.is_dir() {
        bail!("Input folder '{}' does not exist", expanded.display());
    }
    Ok(expanded)
}

fn sanitize_rules(replacement: char) -> Result<SanitizeRules> {
    if replacement.is_control() || matches!(replacement, '/' | '\\') {
        bail!("Replacement character {replacement:?} is not storable in a file name");
    }
    Ok(SanitizeRules::with_replacement(replacement))
}

/// Accept "320k" or "320"; the original flag format keeps the trailing k.
fn parse_bitrate(raw: &str) -> Result<u32> {
    let kbps: u32 = raw
        .trim()
        .trim_end_matches(['k', 'K'])
        .parse()
        .with_context(|| format!("Invalid bitrate '{raw}' (expected e.g. 256k)"))?;
    if kbps == 0 {
        bail!("Invalid bitrate '{raw}' (expected e.g. 256k)");
    }
    Ok(kbps)
}

/// Playlists directly inside the input directory, sorted for stable runs.
fn discover_playlists(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut playlists = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to read input folder '{}'", dir.display()))?
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if path.is_file() && matches!(ext.as_str(), "m3u" | "m3u8") {
            playlists.push(path);
        }
    }
    playlists.sort();
    Ok(playlists)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bitrate() {
        assert_eq!(parse_bitrate("320k").unwrap(), 320);
        assert_eq!(parse_bitrate("256K").unwrap(), 256);
        assert_eq!(parse_bitrate("192").unwrap(), 192);
        assert!(parse_bitrate("fast").is_err());
        assert!(parse_bitrate("0k").is_err());
        assert!(parse_bitrate("").is_err());
    }

    #[test]
    fn test_sanitize_rules_rejects_unusable_replacement() {
        assert!(sanitize_rules('_').is_ok());
        assert!(sanitize_rules('-').is_ok());
        assert!(sanitize_rules('/').is_err());
        assert!(sanitize_rules('\\').is_err());
        assert!(sanitize_rules('\x07').is_err());
    }

    #[test]
    fn test_discover_playlists() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        fs::write(tmp.path().join("b.m3u"), "")?;
        fs::write(tmp.path().join("a.M3U8"), "")?;
        fs::write(tmp.path().join("notes.txt"), "")?;
        fs::create_dir(tmp.path().join("nested.m3u"))?;

        let found = discover_playlists(tmp.path())?;
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.M3U8", "b.m3u"]);
        Ok(())
    }
}
