//! Unit tests for the session value object and status parsing.

use chrono::{Duration, TimeZone, Utc};

use orchestragent_client::models::session::{GitStatistics, Session, SessionStatus};
use orchestragent_client::AppError;

fn ts(hour: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap()
}

fn session(id: &str, branch: &str) -> Result<Session, AppError> {
    Session::new(
        id,
        "/work/repo-wt",
        branch,
        SessionStatus::Open,
        GitStatistics::default(),
        ts(9),
        ts(10),
    )
}

#[test]
fn valid_session_exposes_fields() {
    let s = session("s-1", "feature/x").expect("valid session");
    assert_eq!(s.id(), "s-1");
    assert_eq!(s.branch_name(), "feature/x");
    assert_eq!(s.worktree_path(), std::path::Path::new("/work/repo-wt"));
    assert_eq!(s.status(), SessionStatus::Open);
    assert_eq!(s.statistics(), GitStatistics::new(0, 0, 0));
    assert_eq!(s.created_at(), ts(9));
    assert_eq!(s.last_modified(), ts(10));
}

#[test]
fn blank_id_is_rejected() {
    let err = session("   ", "main").expect_err("blank id");
    assert!(matches!(err, AppError::Validation(_)));
}

#[test]
fn blank_branch_is_rejected() {
    let err = session("s-1", "").expect_err("blank branch");
    assert!(matches!(err, AppError::Validation(_)));
}

#[test]
fn created_after_modified_is_rejected() {
    let err = Session::new(
        "s-1",
        "/wt",
        "main",
        SessionStatus::Open,
        GitStatistics::default(),
        ts(11),
        ts(10),
    )
    .expect_err("inverted timestamps");
    assert!(matches!(err, AppError::Validation(_)));
}

#[test]
fn equal_timestamps_are_allowed() {
    let s = Session::new(
        "s-1",
        "/wt",
        "main",
        SessionStatus::Merged,
        GitStatistics::new(3, 1, 2),
        ts(10),
        ts(10),
    );
    assert!(s.is_ok());
}

#[test]
fn modifiers_produce_new_values() {
    let s = session("s-1", "main").unwrap();
    let reviewed = s.clone().with_status(SessionStatus::InReview);
    assert_eq!(reviewed.status(), SessionStatus::InReview);
    assert_eq!(s.status(), SessionStatus::Open);

    let stats = reviewed.with_statistics(GitStatistics::new(10, 2, 4));
    assert_eq!(stats.statistics().lines_added, 10);
    assert_eq!(stats.statistics().files_changed, 4);
}

#[test]
fn touched_rejects_time_before_creation() {
    let s = session("s-1", "main").unwrap();
    assert!(s.clone().touched(ts(9) - Duration::minutes(1)).is_err());
    let later = s.touched(ts(12)).unwrap();
    assert_eq!(later.last_modified(), ts(12));
}

#[test]
fn status_parses_case_insensitively() {
    assert_eq!("IN_REVIEW".parse::<SessionStatus>().unwrap(), SessionStatus::InReview);
    assert_eq!("merged".parse::<SessionStatus>().unwrap(), SessionStatus::Merged);
    assert_eq!(" Closed ".parse::<SessionStatus>().unwrap(), SessionStatus::Closed);
    assert!("PENDING".parse::<SessionStatus>().is_err());
}

#[test]
fn status_display_matches_wire_name() {
    assert_eq!(SessionStatus::InReview.to_string(), "IN_REVIEW");
    assert_eq!(SessionStatus::default(), SessionStatus::Open);
}

#[test]
fn session_serializes_camel_case() {
    let s = session("s-1", "main").unwrap();
    let value = serde_json::to_value(&s).unwrap();
    assert_eq!(value["branchName"], "main");
    assert_eq!(value["status"], "OPEN");
    assert_eq!(value["statistics"]["linesAdded"], 0);
    assert!(value.get("createdAt").is_some());
}
