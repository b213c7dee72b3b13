use std::collections::HashSet;

use chrono::Utc;
use chrono_tz::Tz;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::time;

use crate::models::{Therapist, TherapistError, TherapistStats, TherapistSummary};

pub struct TherapistService {
    supabase: SupabaseClient,
    timezone: Tz,
}

#[derive(Debug, Deserialize)]
struct PatientIdRow {
    patient_id: Uuid,
}

impl TherapistService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            timezone: config.operational_timezone,
        }
    }

    pub async fn list(&self, auth_token: &str) -> Result<Vec<TherapistSummary>, TherapistError> {
        debug!("Listing therapists");

        let path = "/rest/v1/therapists?select=id,full_name,specialization&order=full_name.asc";
        let therapists: Vec<TherapistSummary> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))?;

        Ok(therapists)
    }

    pub async fn get_by_id(
        &self,
        therapist_id: Uuid,
        auth_token: &str,
    ) -> Result<Therapist, TherapistError> {
        let path = format!("/rest/v1/therapists?id=eq.{}", therapist_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(TherapistError::NotFound)?;
        serde_json::from_value(row).map_err(|e| TherapistError::DatabaseError(e.to_string()))
    }

    /// Resolve the therapist profile owned by an authenticated user.
    pub async fn get_by_user_id(
        &self,
        user_id: &str,
        auth_token: &str,
    ) -> Result<Therapist, TherapistError> {
        let path = format!("/rest/v1/therapists?user_id=eq.{}", user_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or(TherapistError::ProfileNotFound)?;
        serde_json::from_value(row).map_err(|e| TherapistError::DatabaseError(e.to_string()))
    }

    /// Dashboard counters: today's confirmed load and how many distinct
    /// patients the therapist has actually seen or will see.
    pub async fn stats(
        &self,
        therapist_id: Uuid,
        auth_token: &str,
    ) -> Result<TherapistStats, TherapistError> {
        let today = Utc::now().with_timezone(&self.timezone).date_naive();
        let today_instant = time::day_instant(today, self.timezone)
            .map_err(|e| TherapistError::ValidationError(e.to_string()))?;

        let today_path = format!(
            "/rest/v1/appointments?therapist_id=eq.{}&date=eq.{}&status=eq.scheduled&select=id",
            therapist_id,
            today_instant.to_rfc3339()
        );
        let today_rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &today_path, Some(auth_token), None)
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))?;

        let patients_path = format!(
            "/rest/v1/appointments?therapist_id=eq.{}&status=in.(scheduled,completed)&select=patient_id",
            therapist_id
        );
        let patient_rows: Vec<PatientIdRow> = self
            .supabase
            .request(Method::GET, &patients_path, Some(auth_token), None)
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))?;

        let distinct_patients: HashSet<Uuid> =
            patient_rows.into_iter().map(|row| row.patient_id).collect();

        Ok(TherapistStats {
            today_appointments: today_rows.len(),
            total_patients: distinct_patients.len(),
        })
    }
}
