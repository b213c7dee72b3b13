// libs/appointment-cell/tests/lifecycle_test.rs
// State machine and scheduling-rule logic, no HTTP involved.

use assert_matches::assert_matches;
use chrono::{NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use appointment_cell::models::{AppointmentError, AppointmentStatus};
use appointment_cell::services::conflict::overlaps;
use appointment_cell::services::locks::SlotLockRegistry;
use appointment_cell::services::AppointmentLifecycleService;

#[test]
fn test_pending_can_be_scheduled_or_cancelled() {
    let lifecycle = AppointmentLifecycleService::new();

    assert!(lifecycle
        .validate_transition(AppointmentStatus::Pending, AppointmentStatus::Scheduled)
        .is_ok());
    assert!(lifecycle
        .validate_transition(AppointmentStatus::Pending, AppointmentStatus::Cancelled)
        .is_ok());
}

#[test]
fn test_pending_cannot_complete_directly() {
    let lifecycle = AppointmentLifecycleService::new();

    let err = lifecycle
        .validate_transition(AppointmentStatus::Pending, AppointmentStatus::Completed)
        .unwrap_err();
    assert_matches!(err, AppointmentError::InvalidState(AppointmentStatus::Pending));
}

#[test]
fn test_scheduled_can_complete_or_cancel() {
    let lifecycle = AppointmentLifecycleService::new();

    assert!(lifecycle
        .validate_transition(AppointmentStatus::Scheduled, AppointmentStatus::Completed)
        .is_ok());
    assert!(lifecycle
        .validate_transition(AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
        .is_ok());
}

#[test]
fn test_terminal_states_admit_no_transitions() {
    let lifecycle = AppointmentLifecycleService::new();
    let targets = [
        AppointmentStatus::Pending,
        AppointmentStatus::Scheduled,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    for current in [AppointmentStatus::Completed, AppointmentStatus::Cancelled] {
        assert!(current.is_terminal());
        assert!(lifecycle.valid_transitions(current).is_empty());
        for target in targets {
            assert_matches!(
                lifecycle.validate_transition(current, target),
                Err(AppointmentError::InvalidState(_))
            );
        }
    }
}

fn at(hour: u32, minute: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, hour, minute, 0).unwrap()
}

#[test]
fn test_overlapping_intervals_conflict() {
    // Partial overlap from either side
    assert!(overlaps(at(10, 0), at(11, 0), at(10, 30), at(11, 30)));
    assert!(overlaps(at(10, 30), at(11, 30), at(10, 0), at(11, 0)));

    // Containment, both directions
    assert!(overlaps(at(10, 0), at(12, 0), at(10, 30), at(11, 0)));
    assert!(overlaps(at(10, 30), at(11, 0), at(10, 0), at(12, 0)));

    // Identical
    assert!(overlaps(at(10, 0), at(11, 0), at(10, 0), at(11, 0)));
}

#[test]
fn test_back_to_back_intervals_do_not_conflict() {
    assert!(!overlaps(at(10, 0), at(11, 0), at(11, 0), at(12, 0)));
    assert!(!overlaps(at(11, 0), at(12, 0), at(10, 0), at(11, 0)));
}

#[test]
fn test_disjoint_intervals_do_not_conflict() {
    assert!(!overlaps(at(9, 0), at(10, 0), at(14, 0), at(15, 0)));
}

#[tokio::test]
async fn test_day_lock_serializes_same_therapist_day() {
    let registry = SlotLockRegistry::global();
    let therapist_id = Uuid::new_v4();
    let day = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();

    let guard = registry.acquire(therapist_id, day).await;

    // Same key blocks while the first guard is held
    let contended = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        registry.acquire(therapist_id, day),
    )
    .await;
    assert!(contended.is_err());

    drop(guard);
    let reacquired = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        registry.acquire(therapist_id, day),
    )
    .await;
    assert!(reacquired.is_ok());
}

#[tokio::test]
async fn test_day_lock_registry_drops_released_entries() {
    let registry = SlotLockRegistry::new();
    let therapist_id = Uuid::new_v4();
    let monday = NaiveDate::from_ymd_opt(2025, 1, 13).unwrap();
    let tuesday = NaiveDate::from_ymd_opt(2025, 1, 14).unwrap();

    let guard = registry.acquire(therapist_id, monday).await;
    assert_eq!(registry.tracked().await, 1);
    drop(guard);

    // The released Monday entry is evicted on the next acquire
    let _tuesday_guard = registry.acquire(therapist_id, tuesday).await;
    assert_eq!(registry.tracked().await, 1);
}

#[tokio::test]
async fn test_day_lock_held_entry_survives_other_acquires() {
    let registry = SlotLockRegistry::new();
    let therapist_id = Uuid::new_v4();
    let monday = NaiveDate::from_ymd_opt(2025, 1, 13).unwrap();
    let tuesday = NaiveDate::from_ymd_opt(2025, 1, 14).unwrap();

    let _monday_guard = registry.acquire(therapist_id, monday).await;
    let _tuesday_guard = registry.acquire(therapist_id, tuesday).await;

    // Both guards are live, so both keys stay tracked
    assert_eq!(registry.tracked().await, 2);
}

#[tokio::test]
async fn test_day_lock_distinct_days_independent() {
    let registry = SlotLockRegistry::global();
    let therapist_id = Uuid::new_v4();

    let _monday = registry
        .acquire(therapist_id, NaiveDate::from_ymd_opt(2025, 1, 13).unwrap())
        .await;

    let tuesday = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        registry.acquire(therapist_id, NaiveDate::from_ymd_opt(2025, 1, 14).unwrap()),
    )
    .await;
    assert!(tuesday.is_ok());
}
