// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::{Role, User};
use shared_utils::time;
use therapist_cell::services::TherapistService;
use therapist_cell::models::TherapistError;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest, PatientProfile,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::locks::SlotLockRegistry;
use crate::services::notifications;

/// Drives appointments through their lifecycle. Every mutation is a
/// read-check-write against the current row state; `book` and `accept`
/// additionally hold the per-therapist-day booking lock across the
/// conflict check and the write.
pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    therapist_service: TherapistService,
    timezone: Tz,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let conflict_service = ConflictDetectionService::new(Arc::clone(&supabase));

        Self {
            conflict_service,
            lifecycle_service: AppointmentLifecycleService::new(),
            therapist_service: TherapistService::new(config),
            supabase,
            timezone: config.operational_timezone,
        }
    }

    /// Book a new appointment in `pending` state. Patient-only; the
    /// precise interval conflict check runs under the day lock so the
    /// availability read and the insert cannot interleave with another
    /// booking for the same therapist/day.
    pub async fn book(
        &self,
        user: &User,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        match user.role {
            Role::Patient => {}
            Role::Therapist | Role::Admin => return Err(AppointmentError::Forbidden),
        }

        let patient = self.get_patient_profile(&user.id, auth_token).await?;
        let therapist = self
            .therapist_service
            .get_by_id(request.therapist_id, auth_token)
            .await
            .map_err(map_therapist_lookup)?;

        // Normalize wall-clock input to absolute instants before any
        // comparison or storage.
        let start_time = time::to_instant(request.date, &request.start_time, self.timezone)
            .map_err(|e| AppointmentError::ValidationError(e.to_string()))?;
        let end_time = time::to_instant(request.date, &request.end_time, self.timezone)
            .map_err(|e| AppointmentError::ValidationError(e.to_string()))?;
        let date = time::day_instant(request.date, self.timezone)
            .map_err(|e| AppointmentError::ValidationError(e.to_string()))?;

        if start_time >= end_time {
            return Err(AppointmentError::ValidationError(
                "Start time must be before end time".to_string(),
            ));
        }

        let _day_lock = SlotLockRegistry::global()
            .acquire(therapist.id, request.date)
            .await;

        if let Some(conflict) = self
            .conflict_service
            .find_conflict(therapist.id, date, start_time, end_time, None, auth_token)
            .await?
        {
            debug!("Booking rejected, conflicts with appointment {}", conflict.id);
            return Err(AppointmentError::Conflict);
        }

        let now = Utc::now();
        let body = json!({
            "patient_id": patient.id,
            "therapist_id": therapist.id,
            "date": date.to_rfc3339(),
            "start_time": start_time.to_rfc3339(),
            "end_time": end_time.to_rfc3339(),
            "status": AppointmentStatus::Pending,
            "notes": request.notes,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(body),
                Some(headers),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointment: Appointment = result
            .into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?
            .ok_or_else(|| {
                AppointmentError::DatabaseError("Insert returned no appointment row".to_string())
            })?;

        info!(
            "Appointment {} booked for therapist {} on {}",
            appointment.id, therapist.id, request.date
        );

        // Booking succeeded; the notification must not affect the result.
        notifications::send_booking_notification(
            Arc::clone(&self.supabase),
            user.id.clone(),
            therapist.user_id.clone(),
            format!(
                "New appointment request for {} {} - {}",
                request.date, request.start_time, request.end_time
            ),
            auth_token.to_string(),
        );

        Ok(appointment)
    }

    /// Therapist confirms a pending appointment. The slot is
    /// re-validated against other scheduled appointments before the
    /// transition commits: two pending requests may hold the same slot,
    /// and only the first acceptance may win it.
    pub async fn accept(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        self.verify_owning_therapist(&appointment, user, auth_token)
            .await?;

        self.lifecycle_service
            .validate_transition(appointment.status, AppointmentStatus::Scheduled)?;

        let local_date = appointment.date.with_timezone(&self.timezone).date_naive();
        let _day_lock = SlotLockRegistry::global()
            .acquire(appointment.therapist_id, local_date)
            .await;

        if let Some(conflict) = self
            .conflict_service
            .find_conflict(
                appointment.therapist_id,
                appointment.date,
                appointment.start_time,
                appointment.end_time,
                Some(appointment.id),
                auth_token,
            )
            .await?
        {
            debug!(
                "Acceptance of {} rejected, slot taken by appointment {}",
                appointment.id, conflict.id
            );
            return Err(AppointmentError::Conflict);
        }

        self.update_appointment(
            appointment_id,
            appointment.status,
            json!({
                "status": AppointmentStatus::Scheduled,
                "updated_at": Utc::now().to_rfc3339(),
            }),
            auth_token,
        )
        .await
    }

    /// Either party (or an admin) cancels a non-terminal appointment.
    /// A given reason is appended to the notes trail, never replacing
    /// what is already there.
    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        user: &User,
        reason: Option<String>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        match user.role {
            Role::Patient => {
                let patient = self
                    .get_patient_profile(&user.id, auth_token)
                    .await
                    .map_err(|_| AppointmentError::Forbidden)?;
                if patient.id != appointment.patient_id {
                    return Err(AppointmentError::Forbidden);
                }
            }
            Role::Therapist => {
                self.verify_owning_therapist(&appointment, user, auth_token)
                    .await?;
            }
            Role::Admin => {}
        }

        self.lifecycle_service
            .validate_transition(appointment.status, AppointmentStatus::Cancelled)?;

        let mut body = json!({
            "status": AppointmentStatus::Cancelled,
            "updated_at": Utc::now().to_rfc3339(),
        });
        if let Some(reason) = reason {
            let notes = format!(
                "{}\nCancellation reason: {}",
                appointment.notes.as_deref().unwrap_or(""),
                reason
            );
            body["notes"] = json!(notes);
        }

        self.update_appointment(appointment_id, appointment.status, body, auth_token)
            .await
    }

    /// Therapist marks a scheduled appointment as held.
    pub async fn complete(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        self.verify_owning_therapist(&appointment, user, auth_token)
            .await?;

        self.lifecycle_service
            .validate_transition(appointment.status, AppointmentStatus::Completed)?;

        self.update_appointment(
            appointment_id,
            appointment.status,
            json!({
                "status": AppointmentStatus::Completed,
                "updated_at": Utc::now().to_rfc3339(),
            }),
            auth_token,
        )
        .await
    }

    /// The caller's own appointments: patients see their bookings,
    /// therapists see their schedule, admins see everything.
    pub async fn list_for_user(
        &self,
        user: &User,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = match user.role {
            Role::Patient => {
                let Ok(patient) = self.get_patient_profile(&user.id, auth_token).await else {
                    return Ok(vec![]);
                };
                format!(
                    "/rest/v1/appointments?patient_id=eq.{}&order=start_time.desc",
                    patient.id
                )
            }
            Role::Therapist => {
                let therapist = self
                    .therapist_service
                    .get_by_user_id(&user.id, auth_token)
                    .await
                    .map_err(map_therapist_lookup)?;
                format!(
                    "/rest/v1/appointments?therapist_id=eq.{}&order=start_time.desc",
                    therapist.id
                )
            }
            Role::Admin => "/rest/v1/appointments?order=start_time.desc".to_string(),
        };

        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row).map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    // ==========================================================================
    // PRIVATE HELPER METHODS
    // ==========================================================================

    async fn get_patient_profile(
        &self,
        user_id: &str,
        auth_token: &str,
    ) -> Result<PatientProfile, AppointmentError> {
        let path = format!("/rest/v1/patients?user_id=eq.{}", user_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or(AppointmentError::PatientProfileNotFound)?;
        serde_json::from_value(row).map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    /// Caller must be a therapist and own the appointment.
    async fn verify_owning_therapist(
        &self,
        appointment: &Appointment,
        user: &User,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        match user.role {
            Role::Therapist => {}
            Role::Patient | Role::Admin => return Err(AppointmentError::Forbidden),
        }

        let therapist = self
            .therapist_service
            .get_by_user_id(&user.id, auth_token)
            .await
            .map_err(|_| AppointmentError::Forbidden)?;

        if therapist.id != appointment.therapist_id {
            return Err(AppointmentError::Forbidden);
        }

        Ok(())
    }

    /// Compare-and-set transition commit. The PATCH filter carries the
    /// status the transition was validated against, so a row changed by
    /// a concurrent writer since the read matches nothing and the stale
    /// write is rejected instead of overwriting the newer state.
    async fn update_appointment(
        &self,
        appointment_id: Uuid,
        expected_status: AppointmentStatus,
        body: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment_id, expected_status
        );

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(body), Some(headers))
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map_err(|e| AppointmentError::DatabaseError(e.to_string())),
            // No row held the expected status anymore; report the state
            // it actually reached.
            None => match self.get_appointment(appointment_id, auth_token).await {
                Ok(current) => Err(AppointmentError::InvalidState(current.status)),
                Err(e) => Err(e),
            },
        }
    }
}

fn map_therapist_lookup(e: TherapistError) -> AppointmentError {
    match e {
        TherapistError::NotFound | TherapistError::ProfileNotFound => {
            AppointmentError::TherapistNotFound
        }
        TherapistError::ValidationError(msg) => AppointmentError::ValidationError(msg),
        TherapistError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
    }
}
