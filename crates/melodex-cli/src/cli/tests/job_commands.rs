//! Tests for pause/resume/cancel/retry, list, stats, clear-completed,
//! stop-all, set-download-path.

use super::parse;
use crate::cli::CliCommand;

#[test]
fn cli_parse_pause() {
    match parse(&["melodex", "pause", "t1"]) {
        CliCommand::Pause { job_id } => assert_eq!(job_id, "t1"),
        _ => panic!("expected Pause"),
    }
}

#[test]
fn cli_parse_resume() {
    match parse(&["melodex", "resume", "t1"]) {
        CliCommand::Resume { job_id } => assert_eq!(job_id, "t1"),
        _ => panic!("expected Resume"),
    }
}

#[test]
fn cli_parse_cancel() {
    match parse(&["melodex", "cancel", "t1"]) {
        CliCommand::Cancel { job_id } => assert_eq!(job_id, "t1"),
        _ => panic!("expected Cancel"),
    }
}

#[test]
fn cli_parse_retry() {
    match parse(&["melodex", "retry", "t1"]) {
        CliCommand::Retry { job_id } => assert_eq!(job_id, "t1"),
        _ => panic!("expected Retry"),
    }
}

#[test]
fn cli_parse_list_defaults() {
    match parse(&["melodex", "list"]) {
        CliCommand::List { offset, limit, status } => {
            assert_eq!(offset, 0);
            assert_eq!(limit, 50);
            assert!(status.is_none());
        }
        _ => panic!("expected List"),
    }
}

#[test]
fn cli_parse_list_with_filters() {
    match parse(&["melodex", "list", "--offset", "10", "--limit", "5", "--status", "failed"]) {
        CliCommand::List { offset, limit, status } => {
            assert_eq!(offset, 10);
            assert_eq!(limit, 5);
            assert_eq!(status.as_deref(), Some("failed"));
        }
        _ => panic!("expected List with filters"),
    }
}

#[test]
fn cli_parse_stats() {
    match parse(&["melodex", "stats"]) {
        CliCommand::Stats => {}
        _ => panic!("expected Stats"),
    }
}

#[test]
fn cli_parse_clear_completed() {
    match parse(&["melodex", "clear-completed"]) {
        CliCommand::ClearCompleted => {}
        _ => panic!("expected ClearCompleted"),
    }
}

#[test]
fn cli_parse_stop_all() {
    match parse(&["melodex", "stop-all"]) {
        CliCommand::StopAll => {}
        _ => panic!("expected StopAll"),
    }
}

#[test]
fn cli_parse_set_download_path() {
    match parse(&["melodex", "set-download-path", "/music"]) {
        CliCommand::SetDownloadPath { path } => assert_eq!(path, std::path::Path::new("/music")),
        _ => panic!("expected SetDownloadPath"),
    }
}
