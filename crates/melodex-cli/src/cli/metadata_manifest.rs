//! File-backed `MetadataProvider` used by `melodex run` in place of the
//! out-of-scope private API client (`spec.md` §1/§6). Grounded in the
//! teacher's `import_har` command: both bootstrap a local run from a
//! captured JSON/HAR document instead of a live network call, so the CLI
//! stays runnable without shipping a real provider implementation.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use melodex_core::error::CoreError;
use melodex_core::metadata::{MetadataProvider, ResolvedDownload};
use melodex_core::model::{Quality, TagSet};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ManifestTrack {
    url: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    tags: ManifestTags,
}

#[derive(Debug, Default, Deserialize)]
struct ManifestTags {
    #[serde(default)]
    title: String,
    #[serde(default)]
    artist: Vec<String>,
    #[serde(default)]
    album: String,
    #[serde(default)]
    track_number: Option<u32>,
    #[serde(default)]
    disc_number: Option<u32>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    lyrics_plain: Option<String>,
    #[serde(default)]
    lyrics_synced: Option<String>,
}

impl From<ManifestTags> for TagSet {
    fn from(t: ManifestTags) -> Self {
        TagSet {
            title: t.title,
            artist: t.artist,
            album: t.album,
            track_number: t.track_number,
            disc_number: t.disc_number,
            release_date: t.release_date,
            genres: t.genres,
            cover_jpeg: None,
            lyrics_plain: t.lyrics_plain,
            lyrics_synced: t.lyrics_synced,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    tracks: HashMap<String, ManifestTrack>,
    #[serde(default)]
    albums: HashMap<String, Vec<String>>,
    #[serde(default)]
    playlists: HashMap<String, Vec<String>>,
}

/// `MetadataProvider` backed by a manifest document loaded once at startup.
/// `melodex run --metadata-manifest FILE` is the only place this is wired
/// in; the real provider (search/browse/metadata fetch against the
/// streaming service) lives entirely outside this core (`spec.md` §1).
pub struct ManifestMetadataProvider {
    manifest: Manifest,
}

impl ManifestMetadataProvider {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&data)?;
        Ok(Self { manifest })
    }

    pub fn empty() -> Self {
        Self {
            manifest: Manifest::default(),
        }
    }
}

#[async_trait]
impl MetadataProvider for ManifestMetadataProvider {
    async fn resolve_download_url(
        &self,
        track_id: &str,
        _quality: Quality,
    ) -> Result<ResolvedDownload, CoreError> {
        let track = self
            .manifest
            .tracks
            .get(track_id)
            .ok_or_else(|| CoreError::NotFound(format!("track {track_id} not in manifest")))?;
        Ok(ResolvedDownload {
            url: track.url.clone(),
            expected_size: track.size,
            headers: track.headers.clone(),
        })
    }

    async fn get_track_metadata(&self, track_id: &str) -> Result<TagSet, CoreError> {
        let track = self
            .manifest
            .tracks
            .get(track_id)
            .ok_or_else(|| CoreError::NotFound(format!("track {track_id} not in manifest")))?;
        Ok(TagSet::from(ManifestTags {
            title: track.tags.title.clone(),
            artist: track.tags.artist.clone(),
            album: track.tags.album.clone(),
            track_number: track.tags.track_number,
            disc_number: track.tags.disc_number,
            release_date: track.tags.release_date.clone(),
            genres: track.tags.genres.clone(),
            lyrics_plain: track.tags.lyrics_plain.clone(),
            lyrics_synced: track.tags.lyrics_synced.clone(),
        }))
    }

    async fn expand_album(&self, album_id: &str) -> Result<Vec<String>, CoreError> {
        self.manifest
            .albums
            .get(album_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("album {album_id} not in manifest")))
    }

    async fn expand_playlist(&self, playlist_id: &str) -> Result<Vec<String>, CoreError> {
        self.manifest
            .playlists
            .get(playlist_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("playlist {playlist_id} not in manifest")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_track_url_and_tags_from_manifest_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            r#"{
                "tracks": {
                    "t1": {
                        "url": "https://example.invalid/t1.bin",
                        "size": 4096,
                        "tags": { "title": "Song", "artist": ["Artist"] }
                    }
                },
                "albums": { "a1": ["t1"] }
            }"#,
        )
        .unwrap();

        let provider = ManifestMetadataProvider::load(&path).unwrap();
        let resolved = provider
            .resolve_download_url("t1", Quality::Mp3_320)
            .await
            .unwrap();
        assert_eq!(resolved.url, "https://example.invalid/t1.bin");
        assert_eq!(resolved.expected_size, Some(4096));

        let tags = provider.get_track_metadata("t1").await.unwrap();
        assert_eq!(tags.title, "Song");

        let children = provider.expand_album("a1").await.unwrap();
        assert_eq!(children, vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn missing_track_is_not_found() {
        let provider = ManifestMetadataProvider::empty();
        let err = provider
            .resolve_download_url("nope", Quality::Mp3_320)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
