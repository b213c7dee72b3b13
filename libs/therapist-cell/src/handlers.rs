// libs/therapist-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;

use crate::models::{AvailableSlotsQuery, TherapistError, UpsertWorkingHoursRequest};
use crate::services::{SlotGeneratorService, TherapistService, WorkingHoursService};

fn map_therapist_error(e: TherapistError) -> AppError {
    match e {
        TherapistError::NotFound => AppError::NotFound("Therapist not found".to_string()),
        TherapistError::ProfileNotFound => {
            AppError::NotFound("Therapist profile not found".to_string())
        }
        TherapistError::ValidationError(msg) => AppError::BadRequest(msg),
        TherapistError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// Guard for therapist-only endpoints.
fn require_therapist(user: &User) -> Result<(), AppError> {
    match user.role {
        Role::Therapist => Ok(()),
        Role::Patient | Role::Admin => Err(AppError::Forbidden(
            "Only therapists can access this resource".to_string(),
        )),
    }
}

#[axum::debug_handler]
pub async fn list_therapists(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let therapist_service = TherapistService::new(&state);

    let therapists = therapist_service
        .list(token)
        .await
        .map_err(map_therapist_error)?;

    Ok(Json(json!({
        "therapists": therapists,
        "total": therapists.len()
    })))
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<AvailableSlotsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    // Therapist must exist before slots are computed for it
    let therapist_service = TherapistService::new(&state);
    therapist_service
        .get_by_id(query.therapist_id, token)
        .await
        .map_err(map_therapist_error)?;

    let slot_service = SlotGeneratorService::new(&state);
    let slots = slot_service
        .generate_slots(query.date, query.therapist_id, token)
        .await
        .map_err(map_therapist_error)?;

    Ok(Json(json!(slots)))
}

#[axum::debug_handler]
pub async fn get_working_hours(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_therapist(&user)?;
    let token = auth.token();

    let therapist_service = TherapistService::new(&state);
    let therapist = therapist_service
        .get_by_user_id(&user.id, token)
        .await
        .map_err(map_therapist_error)?;

    let working_hours_service = WorkingHoursService::new(&state);
    let working_hours = working_hours_service
        .get_for_therapist(therapist.id, token)
        .await
        .map_err(map_therapist_error)?;

    Ok(Json(json!({ "working_hours": working_hours })))
}

#[axum::debug_handler]
pub async fn upsert_working_hours(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpsertWorkingHoursRequest>,
) -> Result<Json<Value>, AppError> {
    require_therapist(&user)?;
    let token = auth.token();

    let therapist_service = TherapistService::new(&state);
    let therapist = therapist_service
        .get_by_user_id(&user.id, token)
        .await
        .map_err(map_therapist_error)?;

    let working_hours_service = WorkingHoursService::new(&state);
    let working_hours = working_hours_service
        .upsert(therapist.id, request, token)
        .await
        .map_err(map_therapist_error)?;

    Ok(Json(json!({
        "success": true,
        "working_hours": working_hours
    })))
}

#[axum::debug_handler]
pub async fn get_therapist_stats(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_therapist(&user)?;
    let token = auth.token();

    let therapist_service = TherapistService::new(&state);
    let therapist = therapist_service
        .get_by_user_id(&user.id, token)
        .await
        .map_err(map_therapist_error)?;

    let stats = therapist_service
        .stats(therapist.id, token)
        .await
        .map_err(map_therapist_error)?;

    Ok(Json(json!(stats)))
}
