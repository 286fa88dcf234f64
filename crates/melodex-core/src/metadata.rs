//! `MetadataProvider` — the single seam to the private API, `spec.md` §1/§6.
//!
//! Grounded in the teacher's `resolver::Resolver` trait-seam pattern
//! (the core downloader depends only on a trait, never on a concrete
//! resolver format); generalized from a sync, single-method trait into an
//! `async_trait` with the four operations §6 names, since the real
//! implementation (out of scope per §1) talks to a remote API.

use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Mutex;

use crate::error::CoreError;
use crate::model::{Quality, TagSet};

/// Result of resolving a track's stream URL.
#[derive(Debug, Clone)]
pub struct ResolvedDownload {
    pub url: String,
    pub expected_size: Option<u64>,
    pub headers: HashMap<String, String>,
}

/// The four operations the core needs from the provider — `spec.md` §6.
/// Errors are pre-classified by the implementor into `CoreError`'s
/// transient/non-transient taxonomy (§4.2); the core never second-guesses
/// that classification.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn resolve_download_url(
        &self,
        track_id: &str,
        quality: Quality,
    ) -> Result<ResolvedDownload, CoreError>;

    async fn get_track_metadata(&self, track_id: &str) -> Result<TagSet, CoreError>;

    async fn expand_album(&self, album_id: &str) -> Result<Vec<String>, CoreError>;

    async fn expand_playlist(&self, playlist_id: &str) -> Result<Vec<String>, CoreError>;
}

/// In-memory test double used by pipeline and control-surface tests.
/// Registrations are inserted up front; lookups that miss return
/// `NotFound`, matching how a real provider would report an unknown id.
#[derive(Default)]
pub struct StaticMetadataProvider {
    downloads: Mutex<HashMap<String, ResolvedDownload>>,
    tags: Mutex<HashMap<String, TagSet>>,
    albums: Mutex<HashMap<String, Vec<String>>>,
    playlists: Mutex<HashMap<String, Vec<String>>>,
    /// Track ids that should fail `resolve_download_url` with a permanent
    /// `NotFound`, used to exercise the partial-success scenario (`spec.md`
    /// §8 scenario 6).
    missing: Mutex<HashSet<String>>,
}

impl StaticMetadataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_track(self, track_id: impl Into<String>, download: ResolvedDownload, tags: TagSet) -> Self {
        let track_id = track_id.into();
        self.downloads.lock().unwrap().insert(track_id.clone(), download);
        self.tags.lock().unwrap().insert(track_id, tags);
        self
    }

    pub fn with_album(self, album_id: impl Into<String>, track_ids: Vec<String>) -> Self {
        self.albums.lock().unwrap().insert(album_id.into(), track_ids);
        self
    }

    pub fn with_playlist(self, playlist_id: impl Into<String>, track_ids: Vec<String>) -> Self {
        self.playlists
            .lock()
            .unwrap()
            .insert(playlist_id.into(), track_ids);
        self
    }

    /// Mark `track_id` as permanently unresolvable (non-transient `NotFound`).
    pub fn with_missing_track(self, track_id: impl Into<String>) -> Self {
        self.missing.lock().unwrap().insert(track_id.into());
        self
    }
}

#[async_trait]
impl MetadataProvider for StaticMetadataProvider {
    async fn resolve_download_url(
        &self,
        track_id: &str,
        _quality: Quality,
    ) -> Result<ResolvedDownload, CoreError> {
        if self.missing.lock().unwrap().contains(track_id) {
            return Err(CoreError::NotFound(format!("track {track_id}")));
        }
        self.downloads
            .lock()
            .unwrap()
            .get(track_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("track {track_id}")))
    }

    async fn get_track_metadata(&self, track_id: &str) -> Result<TagSet, CoreError> {
        self.tags
            .lock()
            .unwrap()
            .get(track_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("track {track_id}")))
    }

    async fn expand_album(&self, album_id: &str) -> Result<Vec<String>, CoreError> {
        self.albums
            .lock()
            .unwrap()
            .get(album_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("album {album_id}")))
    }

    async fn expand_playlist(&self, playlist_id: &str) -> Result<Vec<String>, CoreError> {
        self.playlists
            .lock()
            .unwrap()
            .get(playlist_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("playlist {playlist_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_download(url: &str) -> ResolvedDownload {
        ResolvedDownload {
            url: url.to_string(),
            expected_size: Some(1024),
            headers: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn resolves_registered_track() {
        let provider = StaticMetadataProvider::new().with_track(
            "t1",
            sample_download("https://example.invalid/t1"),
            TagSet {
                title: "Song".into(),
                ..Default::default()
            },
        );
        let resolved = provider
            .resolve_download_url("t1", Quality::Mp3_320)
            .await
            .unwrap();
        assert_eq!(resolved.url, "https://example.invalid/t1");
        let tags = provider.get_track_metadata("t1").await.unwrap();
        assert_eq!(tags.title, "Song");
    }

    #[tokio::test]
    async fn missing_track_is_not_found() {
        let provider = StaticMetadataProvider::new().with_missing_track("gone");
        let err = provider
            .resolve_download_url("gone", Quality::Mp3_320)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn expands_album_and_playlist() {
        let provider = StaticMetadataProvider::new()
            .with_album("a1", vec!["t1".into(), "t2".into()])
            .with_playlist("p1", vec!["t3".into()]);
        assert_eq!(
            provider.expand_album("a1").await.unwrap(),
            vec!["t1".to_string(), "t2".to_string()]
        );
        assert_eq!(
            provider.expand_playlist("p1").await.unwrap(),
            vec!["t3".to_string()]
        );
    }
}
