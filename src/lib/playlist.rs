use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Read the ordered path references from a playlist file.
pub fn read_entries(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read playlist '{}'", path.display()))?;
    Ok(parse_entries(&text))
}

/// One entry per line; anything after '#' is a comment; blanks are skipped.
/// Original order is preserved.
pub fn parse_entries(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Format one output playlist line: the device-root prefix joined with the
/// relative destination path, using the forward slashes the device expects.
pub fn device_line(device_root: &str, rel_destination: &Path) -> String {
    let rel = rel_destination
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    if device_root.is_empty() {
        rel
    } else if device_root.ends_with('/') {
        format!("{device_root}{rel}")
    } else {
        format!("{device_root}/{rel}")
    }
}

/// Write the rewritten playlist, one entry per line.
pub fn write_playlist(path: &Path, lines: &[String]) -> Result<()> {
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    fs::write(path, text)
        .with_context(|| format!("Failed to write playlist '{}'", path.display()))
}
