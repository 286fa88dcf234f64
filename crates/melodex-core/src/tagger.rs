//! Tagger — embeds metadata into the decrypted audio container, `spec.md`
//! §4.6.
//!
//! No teacher analogue (audio tagging is a concern the teacher's generic
//! downloader never had); implemented with `lofty`, the standard modern
//! Rust audio-tag crate, the way the rest of this workspace reaches for one
//! well-known crate per concern (`sqlx` for the store, `curl` for HTTP).
//! Every fallible step is collected into one [`TagError`] that the pipeline's
//! Tag stage logs and discards — `spec.md` §4.4/§4.6: "tagging failures are
//! non-fatal for the audio".

use std::path::Path;

use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::Accessor;
use lofty::tag::{ItemKey, Tag, TagExt};
use thiserror::Error;

use crate::model::TagSet;

#[derive(Debug, Error)]
pub enum TagError {
    #[error("tag read/write error: {0}")]
    Lofty(#[from] lofty::error::LoftyError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Embed `tags` into the audio file at `path`. Unknown/extra `TagSet` fields
/// beyond §4.6's set are ignored by construction (the struct has no others).
pub fn write_tags(path: &Path, tags: &TagSet) -> Result<(), TagError> {
    let mut tagged_file = lofty::read_from_path(path)?;

    let tag_type = tagged_file.primary_tag_type();
    if tagged_file.primary_tag().is_none() {
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file
        .primary_tag_mut()
        .expect("primary tag was just inserted if absent");

    apply_fields(tag, tags);

    tag.save_to_path(path, WriteOptions::default())?;
    Ok(())
}

fn apply_fields(tag: &mut Tag, tags: &TagSet) {
    if !tags.title.is_empty() {
        tag.set_title(tags.title.clone());
    }
    if !tags.artist.is_empty() {
        tag.set_artist(tags.artist.join("; "));
    }
    if !tags.album.is_empty() {
        tag.set_album(tags.album.clone());
    }
    if let Some(track) = tags.track_number {
        tag.set_track(track);
    }
    if let Some(disc) = tags.disc_number {
        tag.set_disk(disc);
    }
    if let Some(year) = tags.release_date.as_deref().and_then(parse_year) {
        tag.set_year(year);
    }
    if !tags.genres.is_empty() {
        tag.set_genre(tags.genres.join("; "));
    }
    if let Some(cover) = &tags.cover_jpeg {
        tag.remove_picture_type(PictureType::CoverFront);
        let picture = Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::Jpeg),
            None,
            cover.clone(),
        );
        tag.push_picture(picture);
    }
    if let Some(lyrics) = &tags.lyrics_plain {
        tag.insert_text(ItemKey::Lyrics, lyrics.clone());
    }
}

/// Parse a leading 4-digit year out of an ISO-8601-ish date string
/// (`"2019-03-01"`, `"2019"`). Returns `None` rather than failing the whole
/// tag write on an unparsable date — tagging is best-effort per §4.6.
fn parse_year(date: &str) -> Option<u32> {
    date.get(0..4)?.parse().ok()
}

/// Write synced lyrics as an LRC sidecar file next to the audio file,
/// implementing `lyrics.save_separate_file` (`spec.md` §6) — `lofty` has no
/// first-class synced-lyrics frame across all container formats, so the
/// sidecar is the portable fallback the core offers regardless of format.
pub fn write_lrc_sidecar(audio_path: &Path, lrc: &str) -> Result<(), TagError> {
    let sidecar = audio_path.with_extension("lrc");
    std::fs::write(sidecar, lrc)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_leading_year() {
        assert_eq!(parse_year("2019-03-01"), Some(2019));
        assert_eq!(parse_year("2019"), Some(2019));
        assert_eq!(parse_year(""), None);
        assert_eq!(parse_year("abcd-01-01"), None);
    }

    #[test]
    fn lrc_sidecar_written_next_to_audio_file() {
        let dir = tempfile::tempdir().unwrap();
        let audio_path = dir.path().join("track.mp3");
        std::fs::write(&audio_path, b"not really audio").unwrap();
        write_lrc_sidecar(&audio_path, "[00:01.00]line one").unwrap();
        let sidecar = dir.path().join("track.lrc");
        assert!(sidecar.exists());
        assert_eq!(
            std::fs::read_to_string(sidecar).unwrap(),
            "[00:01.00]line one"
        );
    }
}
