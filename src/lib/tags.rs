use anyhow::{Context, Result};
use lofty::config::WriteOptions;
use lofty::file::{FileType, TaggedFileExt};
use lofty::picture::{Picture, PictureType};
use lofty::tag::{Tag, TagExt, TagItem, TagType};
use std::path::Path;

/// Tag fields and optional front-cover image read from a source file,
/// written verbatim onto the destination.
#[derive(Debug, Clone, Default)]
pub struct AudioMetadata {
    pub items: Vec<TagItem>,
    pub cover_art: Option<Picture>,
}

impl AudioMetadata {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.cover_art.is_none()
    }
}

/// Result of writing metadata onto a destination file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    /// Everything the source carried was written.
    Copied,
    /// Part of the metadata (typically the cover art) was not written.
    Partial(String),
    /// The source carried no usable tags; nothing to do.
    Empty,
}

/// Tag read/write capability, substitutable in tests.
pub trait TagStore: Sync {
    fn read(&self, path: &Path) -> Result<AudioMetadata>;
    fn write(&self, path: &Path, meta: &AudioMetadata) -> Result<TagOutcome>;
}

/// lofty-backed implementation. Reads FLAC and MP3 sources; any other
/// format yields an empty tag set rather than an error.
pub struct LoftyTags;

impl TagStore for LoftyTags {
    fn read(&self, path: &Path) -> Result<AudioMetadata> {
        let tagged = match lofty::read_from_path(path) {
            Ok(tagged) => tagged,
            Err(_) => return Ok(AudioMetadata::default()),
        };
        if !matches!(tagged.file_type(), FileType::Mpeg | FileType::Flac) {
            return Ok(AudioMetadata::default());
        }
        let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
            return Ok(AudioMetadata::default());
        };

        let cover_art = tag
            .pictures()
            .iter()
            .find(|p| p.pic_type() == PictureType::CoverFront)
            .or_else(|| tag.pictures().first())
            .cloned();

        Ok(AudioMetadata {
            items: tag.items().cloned().collect(),
            cover_art,
        })
    }

    fn write(&self, path: &Path, meta: &AudioMetadata) -> Result<TagOutcome> {
        if meta.is_empty() {
            return Ok(TagOutcome::Empty);
        }

        // Text fields first, art second: a failed art write still leaves a
        // correctly tagged file and is reported instead of hidden.
        let mut tag = Tag::new(TagType::Id3v2);
        for item in &meta.items {
            tag.insert(item.clone());
        }
        tag.save_to_path(path, WriteOptions::default())
            .with_context(|| format!("Failed to write tags to '{}'", path.display()))?;

        if let Some(picture) = &meta.cover_art {
            tag.push_picture(picture.clone());
            if let Err(e) = tag.save_to_path(path, WriteOptions::default()) {
                return Ok(TagOutcome::Partial(format!(
                    "cover art not written to '{}': {e}",
                    path.display()
                )));
            }
        }
        Ok(TagOutcome::Copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lofty::tag::{ItemKey, ItemValue};

    #[test]
    fn test_metadata_is_empty() {
        assert!(AudioMetadata::default().is_empty());

        let meta = AudioMetadata {
            items: vec![TagItem::new(
                ItemKey::TrackTitle,
                ItemValue::Text("Title".to_string()),
            )],
            cover_art: None,
        };
        assert!(!meta.is_empty());
    }

    #[test]
    fn test_read_unparseable_file_yields_empty_set() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, b"not audio at all")?;
        assert!(LoftyTags.read(&path)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_read_missing_file_yields_empty_set() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        assert!(LoftyTags.read(&tmp.path().join("missing.mp3"))?.is_empty());
        Ok(())
    }

    #[test]
    fn test_write_empty_metadata_is_a_noop() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("dest.mp3");
        std::fs::write(&path, b"fake mp3")?;
        let before = std::fs::read(&path)?;

        let outcome = LoftyTags.write(&path, &AudioMetadata::default())?;
        assert_eq!(outcome, TagOutcome::Empty);
        assert_eq!(std::fs::read(&path)?, before);
        Ok(())
    }
}
