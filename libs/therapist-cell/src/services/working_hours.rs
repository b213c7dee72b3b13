use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::time::parse_hour_minute;

use crate::models::{TherapistError, UpsertWorkingHoursRequest, WorkingHours};

/// Store for the single recurring availability window each therapist
/// keeps. Writing again replaces the existing record (upsert on
/// therapist_id).
pub struct WorkingHoursService {
    supabase: SupabaseClient,
}

impl WorkingHoursService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_for_therapist(
        &self,
        therapist_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<WorkingHours>, TherapistError> {
        let path = format!("/rest/v1/working_hours?therapist_id=eq.{}", therapist_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| TherapistError::DatabaseError(e.to_string())),
            None => Ok(None),
        }
    }

    pub async fn upsert(
        &self,
        therapist_id: Uuid,
        request: UpsertWorkingHoursRequest,
        auth_token: &str,
    ) -> Result<WorkingHours, TherapistError> {
        debug!("Upserting working hours for therapist {}", therapist_id);

        let start = parse_hour_minute(&request.start_hour)
            .map_err(|e| TherapistError::ValidationError(e.to_string()))?;
        let end = parse_hour_minute(&request.end_hour)
            .map_err(|e| TherapistError::ValidationError(e.to_string()))?;

        if start >= end {
            return Err(TherapistError::ValidationError(
                "Start hour must be before end hour".to_string(),
            ));
        }

        let body = json!({
            "therapist_id": therapist_id,
            "start_day_in_week": request.start_day_in_week,
            "end_day_in_week": request.end_day_in_week,
            "start_hour": request.start_hour,
            "end_hour": request.end_hour,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static(
                "resolution=merge-duplicates,return=representation",
            ),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/working_hours?on_conflict=therapist_id",
                Some(auth_token),
                Some(body),
                Some(headers),
            )
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or_else(|| {
            TherapistError::DatabaseError("Upsert returned no working hours row".to_string())
        })?;

        serde_json::from_value(row).map_err(|e| TherapistError::DatabaseError(e.to_string()))
    }
}
