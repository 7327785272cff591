use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};

/// External transcode capability. The real engine is the system ffmpeg
/// binary; tests substitute a fake so no audio tooling is required.
pub trait TranscodeEngine: Sync {
    fn transcode(&self, source: &Path, destination: &Path, bitrate_kbps: u32) -> Result<()>;
}

/// Invokes the ffmpeg binary found on PATH (or at $FFMPEG_PATH).
pub struct FfmpegCli {
    program: String,
}

impl FfmpegCli {
    /// Probe the binary up front so a missing engine aborts the run before
    /// any file is touched.
    pub fn locate() -> Result<Self> {
        let program = std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string());
        let status = Command::new(&program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| {
                format!("Failed to run '{program}'; is ffmpeg installed and on your PATH?")
            })?;
        if !status.success() {
            bail!("'{program} -version' exited with {status}");
        }
        Ok(Self { program })
    }
}

impl TranscodeEngine for FfmpegCli {
    fn transcode(&self, source: &Path, destination: &Path, bitrate_kbps: u32) -> Result<()> {
        let output = Command::new(&self.program)
            .arg("-i")
            .arg(source)
            .arg("-y")
            .arg("-vn")
            .arg("-codec:a")
            .arg("libmp3lame")
            .arg("-b:a")
            .arg(format!("{bitrate_kbps}k"))
            .arg(destination)
            .output()
            .with_context(|| format!("Failed to execute '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "ffmpeg exited with {} for '{}': {}",
                output.status,
                source.display(),
                stderr.lines().last().unwrap_or("no output").trim()
            );
        }
        Ok(())
    }
}
