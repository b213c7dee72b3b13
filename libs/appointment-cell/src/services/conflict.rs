use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError};

/// Half-open interval overlap: touching boundaries do not conflict, so
/// back-to-back appointments are always allowed.
pub fn overlaps(
    candidate_start: DateTime<Utc>,
    candidate_end: DateTime<Utc>,
    existing_start: DateTime<Utc>,
    existing_end: DateTime<Utc>,
) -> bool {
    candidate_start < existing_end && existing_start < candidate_end
}

pub struct ConflictDetectionService {
    supabase: Arc<SupabaseClient>,
}

impl ConflictDetectionService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// First scheduled appointment for the therapist on the given day
    /// whose interval overlaps the candidate one. Only `scheduled` rows
    /// occupy their slot; pending, cancelled and completed never block.
    pub async fn find_conflict(
        &self,
        therapist_id: Uuid,
        date: DateTime<Utc>,
        candidate_start: DateTime<Utc>,
        candidate_end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Option<Appointment>, AppointmentError> {
        debug!(
            "Checking conflicts for therapist {} from {} to {}",
            therapist_id, candidate_start, candidate_end
        );

        let mut query_parts = vec![
            format!("therapist_id=eq.{}", therapist_id),
            format!("date=eq.{}", date.to_rfc3339()),
            "status=eq.scheduled".to_string(),
        ];
        if let Some(exclude_id) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!(
            "/rest/v1/appointments?{}&order=start_time.asc",
            query_parts.join("&")
        );

        let existing: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let conflict = existing.into_iter().find(|appointment| {
            overlaps(
                candidate_start,
                candidate_end,
                appointment.start_time,
                appointment.end_time,
            )
        });

        if let Some(ref appointment) = conflict {
            warn!(
                "Conflict detected for therapist {}: overlapping appointment {}",
                therapist_id, appointment.id
            );
        }

        Ok(conflict)
    }
}
