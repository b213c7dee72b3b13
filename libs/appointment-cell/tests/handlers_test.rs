// libs/appointment-cell/tests/handlers_test.rs

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::handlers::*;
use appointment_cell::models::{BookAppointmentRequest, CancelAppointmentRequest};
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn mock_config(mock_server: &MockServer) -> Arc<AppConfig> {
    TestConfig::with_supabase_url(&mock_server.uri()).to_arc()
}

fn auth_header(token: &str) -> TypedHeader<Authorization<Bearer>> {
    TypedHeader(Authorization::bearer(token).unwrap())
}

fn user_extension(test_user: &TestUser) -> Extension<User> {
    Extension(test_user.to_user())
}

fn therapist_row(id: Uuid, user_id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "user_id": user_id,
        "full_name": "Dr. Ada Nkemelu",
        "specialization": "CBT",
        "about": null,
        "created_at": chrono::Utc::now().to_rfc3339(),
        "updated_at": chrono::Utc::now().to_rfc3339()
    })
}

fn patient_row(id: Uuid, user_id: &str) -> serde_json::Value {
    json!({ "id": id, "user_id": user_id })
}

// 2025-01-15 in America/New_York; 10:00 local is 15:00 UTC
fn appointment_row(
    id: Uuid,
    patient_id: Uuid,
    therapist_id: Uuid,
    status: &str,
    notes: Option<&str>,
) -> serde_json::Value {
    json!({
        "id": id,
        "patient_id": patient_id,
        "therapist_id": therapist_id,
        "date": "2025-01-15T05:00:00Z",
        "start_time": "2025-01-15T15:00:00Z",
        "end_time": "2025-01-15T16:00:00Z",
        "status": status,
        "notes": notes,
        "created_at": chrono::Utc::now().to_rfc3339(),
        "updated_at": chrono::Utc::now().to_rfc3339()
    })
}

fn book_request(therapist_id: Uuid) -> BookAppointmentRequest {
    BookAppointmentRequest {
        therapist_id,
        date: chrono::NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
        start_time: "10:00".to_string(),
        end_time: "11:00".to_string(),
        notes: None,
    }
}

async fn mount_profile_mocks(
    mock_server: &MockServer,
    patient_id: Uuid,
    patient_user_id: &str,
    therapist_id: Uuid,
    therapist_user_id: &str,
) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!([patient_row(patient_id, patient_user_id)])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/therapists"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!([therapist_row(therapist_id, therapist_user_id)])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_book_appointment_success() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);
    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_token(&user, &config.supabase_jwt_secret);
    let patient_id = Uuid::new_v4();
    let therapist_id = Uuid::new_v4();

    mount_profile_mocks(&mock_server, patient_id, &user.id, therapist_id, "t-user").await;

    // No scheduled appointment occupies the requested window
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.scheduled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            appointment_row(Uuid::new_v4(), patient_id, therapist_id, "pending", None)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/messages"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = book_appointment(
        State(config),
        auth_header(&token),
        user_extension(&user),
        Json(book_request(therapist_id)),
    )
    .await;

    let response = result.expect("book_appointment should succeed").0;
    assert_eq!(response["success"], true);
    assert_eq!(response["appointment"]["status"], "pending");
}

#[tokio::test]
async fn test_book_appointment_slot_taken() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);
    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_token(&user, &config.supabase_jwt_secret);
    let patient_id = Uuid::new_v4();
    let therapist_id = Uuid::new_v4();

    mount_profile_mocks(&mock_server, patient_id, &user.id, therapist_id, "t-user").await;

    // A scheduled appointment already covers 10:00-11:00 local
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.scheduled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(Uuid::new_v4(), Uuid::new_v4(), therapist_id, "scheduled", None)
        ])))
        .mount(&mock_server)
        .await;

    let result = book_appointment(
        State(config),
        auth_header(&token),
        user_extension(&user),
        Json(book_request(therapist_id)),
    )
    .await;

    match result.unwrap_err() {
        AppError::Conflict(msg) => assert!(msg.contains("not available")),
        other => panic!("Expected Conflict, got {:?}", other),
    }
}

#[tokio::test]
async fn test_book_appointment_requires_patient_role() {
    let config = TestConfig::default().to_arc();
    let user = TestUser::therapist("therapist@example.com");
    let token = JwtTestUtils::create_token(&user, &config.supabase_jwt_secret);

    let result = book_appointment(
        State(config),
        auth_header(&token),
        user_extension(&user),
        Json(book_request(Uuid::new_v4())),
    )
    .await;

    assert!(matches!(result.unwrap_err(), AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_book_appointment_rejects_inverted_window() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);
    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_token(&user, &config.supabase_jwt_secret);
    let therapist_id = Uuid::new_v4();

    mount_profile_mocks(&mock_server, Uuid::new_v4(), &user.id, therapist_id, "t-user").await;

    let mut request = book_request(therapist_id);
    request.start_time = "11:00".to_string();
    request.end_time = "10:00".to_string();

    let result = book_appointment(
        State(config),
        auth_header(&token),
        user_extension(&user),
        Json(request),
    )
    .await;

    match result.unwrap_err() {
        AppError::BadRequest(msg) => assert!(msg.contains("before end time")),
        other => panic!("Expected BadRequest, got {:?}", other),
    }
}

#[tokio::test]
async fn test_accept_appointment_success() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);
    let user = TestUser::therapist("therapist@example.com");
    let token = JwtTestUtils::create_token(&user, &config.supabase_jwt_secret);
    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let therapist_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, patient_id, therapist_id, "pending", None)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/therapists"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!([therapist_row(therapist_id, &user.id)])))
        .mount(&mock_server)
        .await;

    // Re-check finds no scheduled appointment holding the slot
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.scheduled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    // The commit must carry the compare-and-set filter on the status
    // the transition was validated against
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.pending"))
        .and(body_partial_json(json!({"status": "scheduled"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, patient_id, therapist_id, "scheduled", None)
        ])))
        .mount(&mock_server)
        .await;

    let result = accept_appointment(
        State(config),
        Path(appointment_id),
        auth_header(&token),
        user_extension(&user),
    )
    .await;

    let response = result.expect("accept_appointment should succeed").0;
    assert_eq!(response["appointment"]["status"], "scheduled");
}

#[tokio::test]
async fn test_accept_appointment_slot_taken_since_request() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);
    let user = TestUser::therapist("therapist@example.com");
    let token = JwtTestUtils::create_token(&user, &config.supabase_jwt_secret);
    let appointment_id = Uuid::new_v4();
    let therapist_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, Uuid::new_v4(), therapist_id, "pending", None)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/therapists"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!([therapist_row(therapist_id, &user.id)])))
        .mount(&mock_server)
        .await;

    // Another pending request for the same window was accepted first
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.scheduled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(Uuid::new_v4(), Uuid::new_v4(), therapist_id, "scheduled", None)
        ])))
        .mount(&mock_server)
        .await;

    let result = accept_appointment(
        State(config),
        Path(appointment_id),
        auth_header(&token),
        user_extension(&user),
    )
    .await;

    assert!(matches!(result.unwrap_err(), AppError::Conflict(_)));
}

#[tokio::test]
async fn test_accept_appointment_wrong_therapist() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);
    let user = TestUser::therapist("other-therapist@example.com");
    let token = JwtTestUtils::create_token(&user, &config.supabase_jwt_secret);
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, Uuid::new_v4(), Uuid::new_v4(), "pending", None)
        ])))
        .mount(&mock_server)
        .await;

    // The caller's profile exists but owns a different therapist id
    Mock::given(method("GET"))
        .and(path("/rest/v1/therapists"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!([therapist_row(Uuid::new_v4(), &user.id)])))
        .mount(&mock_server)
        .await;

    let result = accept_appointment(
        State(config),
        Path(appointment_id),
        auth_header(&token),
        user_extension(&user),
    )
    .await;

    assert!(matches!(result.unwrap_err(), AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_cancel_appends_reason_to_notes() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);
    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_token(&user, &config.supabase_jwt_secret);
    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let therapist_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, patient_id, therapist_id, "pending", Some("Initial note"))
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!([patient_row(patient_id, &user.id)])))
        .mount(&mock_server)
        .await;

    // The PATCH must carry the appended notes trail and the
    // compare-and-set status filter, or no mock matches
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.pending"))
        .and(body_partial_json(json!({
            "status": "cancelled",
            "notes": "Initial note\nCancellation reason: patient has the flu"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, patient_id, therapist_id, "cancelled", None)
        ])))
        .mount(&mock_server)
        .await;

    let result = cancel_appointment(
        State(config),
        Path(appointment_id),
        auth_header(&token),
        user_extension(&user),
        Some(Json(CancelAppointmentRequest {
            reason: Some("patient has the flu".to_string()),
        })),
    )
    .await;

    let response = result.expect("cancel_appointment should succeed").0;
    assert_eq!(response["appointment"]["status"], "cancelled");
}

#[tokio::test]
async fn test_cancel_completed_appointment_rejected() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);
    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_token(&user, &config.supabase_jwt_secret);
    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, patient_id, Uuid::new_v4(), "completed", None)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!([patient_row(patient_id, &user.id)])))
        .mount(&mock_server)
        .await;

    let result = cancel_appointment(
        State(config),
        Path(appointment_id),
        auth_header(&token),
        user_extension(&user),
        None,
    )
    .await;

    match result.unwrap_err() {
        AppError::BadRequest(msg) => assert!(msg.contains("completed")),
        other => panic!("Expected BadRequest, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_foreign_appointment_rejected() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);
    let user = TestUser::patient("other-patient@example.com");
    let token = JwtTestUtils::create_token(&user, &config.supabase_jwt_secret);
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, Uuid::new_v4(), Uuid::new_v4(), "pending", None)
        ])))
        .mount(&mock_server)
        .await;

    // The caller's patient profile does not match the appointment
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!([patient_row(Uuid::new_v4(), &user.id)])))
        .mount(&mock_server)
        .await;

    let result = cancel_appointment(
        State(config),
        Path(appointment_id),
        auth_header(&token),
        user_extension(&user),
        None,
    )
    .await;

    assert!(matches!(result.unwrap_err(), AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_complete_pending_appointment_rejected() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);
    let user = TestUser::therapist("therapist@example.com");
    let token = JwtTestUtils::create_token(&user, &config.supabase_jwt_secret);
    let appointment_id = Uuid::new_v4();
    let therapist_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, Uuid::new_v4(), therapist_id, "pending", None)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/therapists"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!([therapist_row(therapist_id, &user.id)])))
        .mount(&mock_server)
        .await;

    let result = complete_appointment(
        State(config),
        Path(appointment_id),
        auth_header(&token),
        user_extension(&user),
    )
    .await;

    match result.unwrap_err() {
        AppError::BadRequest(msg) => assert!(msg.contains("pending")),
        other => panic!("Expected BadRequest, got {:?}", other),
    }
}

#[tokio::test]
async fn test_complete_scheduled_appointment() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);
    let user = TestUser::therapist("therapist@example.com");
    let token = JwtTestUtils::create_token(&user, &config.supabase_jwt_secret);
    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let therapist_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, patient_id, therapist_id, "scheduled", None)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/therapists"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!([therapist_row(therapist_id, &user.id)])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.scheduled"))
        .and(body_partial_json(json!({"status": "completed"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, patient_id, therapist_id, "completed", None)
        ])))
        .mount(&mock_server)
        .await;

    let result = complete_appointment(
        State(config),
        Path(appointment_id),
        auth_header(&token),
        user_extension(&user),
    )
    .await;

    let response = result.expect("complete_appointment should succeed").0;
    assert_eq!(response["appointment"]["status"], "completed");
}

#[tokio::test]
async fn test_stale_complete_loses_to_concurrent_cancel() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);
    let user = TestUser::therapist("therapist@example.com");
    let token = JwtTestUtils::create_token(&user, &config.supabase_jwt_secret);
    let appointment_id = Uuid::new_v4();
    let therapist_id = Uuid::new_v4();

    // First read observes the row as scheduled; by commit time a
    // concurrent cancellation has already landed
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, Uuid::new_v4(), therapist_id, "scheduled", None)
        ])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, Uuid::new_v4(), therapist_id, "cancelled", None)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/therapists"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_json(json!([therapist_row(therapist_id, &user.id)])))
        .mount(&mock_server)
        .await;

    // The guarded PATCH finds no row still in scheduled state
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.scheduled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = complete_appointment(
        State(config),
        Path(appointment_id),
        auth_header(&token),
        user_extension(&user),
    )
    .await;

    // The cancellation survives; the stale completion is rejected
    match result.unwrap_err() {
        AppError::BadRequest(msg) => assert!(msg.contains("cancelled")),
        other => panic!("Expected BadRequest, got {:?}", other),
    }
}

#[tokio::test]
async fn test_list_appointments_as_admin() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);
    let user = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_token(&user, &config.supabase_jwt_secret);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), "pending", None),
            appointment_row(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), "scheduled", None)
        ])))
        .mount(&mock_server)
        .await;

    let result =
        list_appointments(State(config), auth_header(&token), user_extension(&user)).await;

    let response = result.expect("list_appointments should succeed").0;
    assert_eq!(response["total"], 2);
}

#[tokio::test]
async fn test_list_appointments_patient_without_profile() {
    let mock_server = MockServer::start().await;
    let config = mock_config(&mock_server);
    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_token(&user, &config.supabase_jwt_secret);

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result =
        list_appointments(State(config), auth_header(&token), user_extension(&user)).await;

    let response = result.expect("list_appointments should succeed").0;
    assert_eq!(response["total"], 0);
}
