mod read;
mod write;

#[cfg(test)]
mod tests {
    use crate::model::{Job, JobKind, JobStatus, Quality};
    use crate::queue::db::QueueStore;

    fn sample_job(id: &str, kind: JobKind, parent_id: Option<&str>, status: JobStatus) -> Job {
        Job {
            id: id.to_string(),
            kind,
            parent_id: parent_id.map(|s| s.to_string()),
            title: Some("Title".into()),
            artist: Some("Artist".into()),
            quality: Quality::Mp3_320,
            status,
            progress: 0,
            bytes_downloaded: 0,
            total_bytes: None,
            error: None,
            created_at: 0,
            updated_at: 0,
            completed_at: None,
            retry_count: 0,
            attempt_token: None,
            total_tracks: if matches!(kind, JobKind::Album | JobKind::Playlist) {
                Some(0)
            } else {
                None
            },
            completed_tracks: if matches!(kind, JobKind::Album | JobKind::Playlist) {
                Some(0)
            } else {
                None
            },
            failed_tracks: if matches!(kind, JobKind::Album | JobKind::Playlist) {
                Some(0)
            } else {
                None
            },
        }
    }

    #[tokio::test]
    async fn insert_and_get_roundtrip() {
        let store = QueueStore::open_memory().await.unwrap();
        let job = sample_job("t1", JobKind::Track, None, JobStatus::Pending);
        store.insert(&job).await.unwrap();
        let fetched = store.get("t1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "t1");
        assert_eq!(fetched.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn duplicate_insert_of_non_terminal_job_is_rejected() {
        let store = QueueStore::open_memory().await.unwrap();
        let job = sample_job("t1", JobKind::Track, None, JobStatus::Pending);
        store.insert(&job).await.unwrap();
        let err = store.insert(&job).await.unwrap_err();
        assert!(matches!(err, crate::error::CoreError::AlreadyQueued(_)));
    }

    #[tokio::test]
    async fn update_status_fails_on_stale_from() {
        let store = QueueStore::open_memory().await.unwrap();
        let job = sample_job("t1", JobKind::Track, None, JobStatus::Pending);
        store.insert(&job).await.unwrap();
        store
            .update_status(
                "t1",
                JobStatus::Pending,
                JobStatus::Downloading,
                None,
                None,
                None,
                None,
                None,
                Some("tok1".into()),
            )
            .await
            .unwrap();

        // `from` no longer matches the stored status (now Downloading).
        let err = store
            .update_status(
                "t1",
                JobStatus::Pending,
                JobStatus::Cancelled,
                None,
                None,
                None,
                None,
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::CoreError::StaleState));
    }

    #[tokio::test]
    async fn dispatch_next_pending_skips_parent_rows_and_respects_cap() {
        let store = QueueStore::open_memory().await.unwrap();
        let album = sample_job("a1", JobKind::Album, None, JobStatus::Downloading);
        store.insert(&album).await.unwrap();

        let t1 = sample_job("t1", JobKind::Track, Some("a1"), JobStatus::Pending);
        let t2 = sample_job("t2", JobKind::Track, Some("a1"), JobStatus::Pending);
        store.insert(&t1).await.unwrap();
        store.insert(&t2).await.unwrap();

        let dispatched = store.dispatch_next_pending(1, "tok1").await.unwrap();
        assert_eq!(dispatched, Some("t1".to_string()));

        // Per-parent cap of 1 is already saturated by t1; t2 must wait and the
        // parent album row itself must never be dispatched.
        let next = store.dispatch_next_pending(1, "tok2").await.unwrap();
        assert_eq!(next, None);
    }

    #[tokio::test]
    async fn increment_parent_counters_accumulates() {
        let store = QueueStore::open_memory().await.unwrap();
        let album = sample_job("a1", JobKind::Album, None, JobStatus::Downloading);
        store.insert(&album).await.unwrap();

        store.increment_parent_counters("a1", 1, 0).await.unwrap();
        let updated = store.increment_parent_counters("a1", 0, 1).await.unwrap();
        assert_eq!(updated.completed_tracks, Some(1));
        assert_eq!(updated.failed_tracks, Some(1));
        assert!(updated.is_partial_success());
    }

    #[tokio::test]
    async fn clear_completed_leaves_other_statuses() {
        let store = QueueStore::open_memory().await.unwrap();
        store
            .insert(&sample_job("t1", JobKind::Track, None, JobStatus::Completed))
            .await
            .unwrap();
        store
            .insert(&sample_job("t2", JobKind::Track, None, JobStatus::Pending))
            .await
            .unwrap();

        let removed = store.clear_completed().await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("t1").await.unwrap().is_none());
        assert!(store.get("t2").await.unwrap().is_some());
    }
}
