use crate::engine::TranscodeEngine;
use crate::index::{FsIndex, ResolveError};
use crate::plan::{self, MediaProbe, TranscodeAction, TranscodePlan};
use crate::playlist;
use crate::sanitize::SanitizeRules;
use crate::tags::{TagOutcome, TagStore};
use anyhow::{Context, Result};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Run-wide configuration, read-only once the pipeline starts.
pub struct Config {
    /// Root the playlist references are resolved against. Never written to.
    pub source_root: PathBuf,
    /// Every destination lies strictly under this directory.
    pub output_root: PathBuf,
    pub target_bitrate: u32,
    /// Prefix the device expects on playlist entries, e.g. "Music/".
    pub device_root: String,
    pub rules: SanitizeRules,
    pub strip_track_numbers: bool,
    /// Concurrent copy/transcode operations.
    pub jobs: usize,
}

/// Terminal state of one playlist entry.
#[derive(Debug, Clone)]
pub enum EntryOutcome {
    /// The destination exists on disk; the entry appears in the output
    /// playlist. A tag warning means metadata was only partially copied.
    Done {
        rel_destination: PathBuf,
        tag_warning: Option<String>,
        /// False when the skip rule found a prior run's output intact.
        regenerated: bool,
    },
    /// The reference could not be repaired; the entry is omitted.
    Skipped(SkipReason),
    /// Copy or transcode failed; the entry is omitted.
    Failed(String),
}

#[derive(Debug, Clone)]
pub enum SkipReason {
    NotFound,
    Ambiguous(Vec<PathBuf>),
}

/// Per-playlist outcome counts reported to the user.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub done: usize,
    pub up_to_date: usize,
    pub not_found: usize,
    pub ambiguous: usize,
    pub failed: usize,
    pub tag_warnings: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} done ({} already up to date), {} skipped ({} unresolved, {} ambiguous), {} failed, {} tag warnings",
            self.done,
            self.up_to_date,
            self.not_found + self.ambiguous,
            self.not_found,
            self.ambiguous,
            self.failed,
            self.tag_warnings
        )
    }
}

/// Sequences resolve -> plan -> execute -> tag over all playlist entries.
///
/// Entries are causally independent once the index snapshot exists, so the
/// unique sources run on a bounded worker pool; the rewritten playlist is
/// assembled afterwards in input order regardless of completion order.
pub struct Pipeline<'a, P, E, T> {
    config: &'a Config,
    index: &'a FsIndex,
    probe: &'a P,
    engine: &'a E,
    tags: &'a T,
}

impl<'a, P: MediaProbe, E: TranscodeEngine, T: TagStore> Pipeline<'a, P, E, T> {
    pub fn new(
        config: &'a Config,
        index: &'a FsIndex,
        probe: &'a P,
        engine: &'a E,
        tags: &'a T,
    ) -> Self {
        Self {
            config,
            index,
            probe,
            engine,
            tags,
        }
    }

    /// Convert one playlist end to end and write its device counterpart.
    pub fn convert(&self, playlist_path: &Path) -> Result<Summary> {
        let entries = playlist::read_entries(playlist_path)?;
        if entries.is_empty() {
            warn!("No songs in '{}', skipping", playlist_path.display());
            return Ok(Summary::default());
        }
        info!(
            "Found {} songs in '{}'",
            entries.len(),
            playlist_path.display()
        );

        fs::create_dir_all(&self.config.output_root).with_context(|| {
            format!(
                "Failed to create output root '{}'",
                self.config.output_root.display()
            )
        })?;

        let outcomes = self.process(&entries)?;

        let lines: Vec<String> = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                EntryOutcome::Done {
                    rel_destination, ..
                } => Some(playlist::device_line(
                    &self.config.device_root,
                    rel_destination,
                )),
                _ => None,
            })
            .collect();

        let stem = playlist_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("playlist");
        let out_path = self.config.output_root.join(format!("{stem}.m3u8"));
        playlist::write_playlist(&out_path, &lines)?;
        info!(
            "Wrote playlist '{}' ({} entries)",
            out_path.display(),
            lines.len()
        );

        Ok(summarize(&entries, &outcomes))
    }

    /// Resolve every entry, run each unique source once on the worker pool,
    /// and hand back outcomes keyed to the original entry order.
    pub fn process(&self, entries: &[String]) -> Result<Vec<EntryOutcome>> {
        let resolved: Vec<Result<PathBuf, ResolveError>> =
            entries.iter().map(|raw| self.index.resolve(raw)).collect();

        // The same track may appear several times in one playlist; each
        // unique source executes once and later occurrences reuse the
        // outcome, keeping destination paths disjoint across workers.
        let mut order: Vec<PathBuf> = Vec::new();
        let mut slot: FxHashMap<PathBuf, usize> = FxHashMap::default();
        for rel in resolved.iter().flatten() {
            if !slot.contains_key(rel) {
                slot.insert(rel.clone(), order.len());
                order.push(rel.clone());
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs.max(1))
            .build()
            .context("Failed to build worker pool")?;
        let executed: Vec<EntryOutcome> =
            pool.install(|| order.par_iter().map(|rel| self.run_one(rel)).collect());

        Ok(resolved
            .into_iter()
            .map(|res| match res {
                Ok(rel) => executed[slot[&rel]].clone(),
                Err(ResolveError::NotFound(_)) => EntryOutcome::Skipped(SkipReason::NotFound),
                Err(ResolveError::Ambiguous { candidates, .. }) => {
                    EntryOutcome::Skipped(SkipReason::Ambiguous(candidates))
                }
            })
            .collect())
    }

    fn run_one(&self, rel_source: &Path) -> EntryOutcome {
        let cfg = self.config;
        let source = cfg.source_root.join(rel_source);
        let info = self.probe.probe(&source);
        let plan = plan::plan(
            &cfg.source_root,
            &cfg.output_root,
            rel_source,
            &info,
            cfg.target_bitrate,
            &cfg.rules,
            cfg.strip_track_numbers,
        );

        let regenerated = match self.execute(&plan) {
            Ok(regenerated) => regenerated,
            Err(e) => {
                warn!("Failed to produce '{}': {e:#}", plan.destination.display());
                return EntryOutcome::Failed(format!("{e:#}"));
            }
        };

        let mut tag_warning = None;
        if regenerated {
            if plan.action == TranscodeAction::Transcode {
                tag_warning = self.propagate(&plan);
            }
            // A failed stamp only costs a redo on the next run.
            if let Err(e) = plan::mark_satisfied(&plan) {
                warn!("{e:#}");
            }
        }

        EntryOutcome::Done {
            rel_destination: plan.rel_destination,
            tag_warning,
            regenerated,
        }
    }

    /// Returns false when the skip rule found the destination up to date.
    fn execute(&self, plan: &TranscodePlan) -> Result<bool> {
        if plan::already_satisfied(plan)? {
            info!("Up to date: {}", plan.destination.display());
            return Ok(false);
        }

        if let Some(parent) = plan.destination.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory '{}'", parent.display())
            })?;
        }

        match plan.action {
            TranscodeAction::Copy => {
                info!(
                    "Copying '{}' (already at or under {}kbps)",
                    plan.source.display(),
                    plan.target_bitrate
                );
                fs::copy(&plan.source, &plan.destination).with_context(|| {
                    format!(
                        "Failed to copy '{}' to '{}'",
                        plan.source.display(),
                        plan.destination.display()
                    )
                })?;
            }
            TranscodeAction::Transcode => {
                info!(
                    "Transcoding '{}' to {}kbps MP3",
                    plan.source.display(),
                    plan.target_bitrate
                );
                self.engine
                    .transcode(&plan.source, &plan.destination, plan.target_bitrate)?;
            }
        }
        Ok(true)
    }

    /// Best-effort tag and cover-art copy; a failure downgrades to a warning
    /// on the entry rather than failing it.
    fn propagate(&self, plan: &TranscodePlan) -> Option<String> {
        let meta = match self.tags.read(&plan.source) {
            Ok(meta) => meta,
            Err(e) => {
                return Some(format!(
                    "could not read tags from '{}': {e:#}",
                    plan.source.display()
                ))
            }
        };
        match self.tags.write(&plan.destination, &meta) {
            Ok(TagOutcome::Partial(reason)) => Some(reason),
            Ok(_) => None,
            Err(e) => Some(format!(
                "could not write tags to '{}': {e:#}",
                plan.destination.display()
            )),
        }
    }
}

fn summarize(entries: &[String], outcomes: &[EntryOutcome]) -> Summary {
    let mut summary = Summary::default();
    for (raw, outcome) in entries.iter().zip(outcomes) {
        match outcome {
            EntryOutcome::Done {
                tag_warning,
                regenerated,
                ..
            } => {
                summary.done += 1;
                if !regenerated {
                    summary.up_to_date += 1;
                }
                if let Some(reason) = tag_warning {
                    summary.tag_warnings += 1;
                    warn!("Tags only partially copied for '{raw}': {reason}");
                }
            }
            EntryOutcome::Skipped(SkipReason::NotFound) => {
                summary.not_found += 1;
                warn!("Skipped '{raw}': no matching file under the source root");
            }
            EntryOutcome::Skipped(SkipReason::Ambiguous(candidates)) => {
                summary.ambiguous += 1;
                let listed = candidates
                    .iter()
                    .map(|c| c.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                warn!("Skipped '{raw}': ambiguous between [{listed}]");
            }
            EntryOutcome::Failed(reason) => {
                summary.failed += 1;
                warn!("Failed '{raw}': {reason}");
            }
        }
    }
    summary
}
