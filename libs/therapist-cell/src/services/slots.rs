use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::time;

use crate::models::{DayOfWeek, TherapistError, TimeSlot, WorkingHours};

/// Derives the day's hourly candidate slots from a therapist's working
/// hours and marks the ones already taken by scheduled appointments.
pub struct SlotGeneratorService {
    supabase: SupabaseClient,
    timezone: Tz,
}

#[derive(Debug, Deserialize)]
struct BookedStartTime {
    start_time: DateTime<Utc>,
}

impl SlotGeneratorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            timezone: config.operational_timezone,
        }
    }

    pub async fn generate_slots(
        &self,
        date: NaiveDate,
        therapist_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<TimeSlot>, TherapistError> {
        debug!("Generating slots for therapist {} on {}", therapist_id, date);

        let hours_path = format!("/rest/v1/working_hours?therapist_id=eq.{}", therapist_id);
        let hours_rows: Vec<serde_json::Value> = self
            .supabase
            .request(Method::GET, &hours_path, Some(auth_token), None)
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))?;

        // A therapist without a working-hours record offers no slots.
        let Some(row) = hours_rows.into_iter().next() else {
            return Ok(vec![]);
        };
        let hours: WorkingHours =
            serde_json::from_value(row).map_err(|e| TherapistError::DatabaseError(e.to_string()))?;

        let mut slots = candidate_slots(&hours, date);
        if slots.is_empty() {
            warn!(
                "Working hours for therapist {} yield no slots ({} - {})",
                therapist_id, hours.start_hour, hours.end_hour
            );
            return Ok(slots);
        }

        // Outside the working-day range the whole day is blocked; no
        // need to look at bookings.
        if !is_working_day(&hours, date) {
            for slot in &mut slots {
                slot.is_available = false;
            }
            return Ok(slots);
        }

        let booked_hours = self
            .fetch_booked_hours(therapist_id, date, auth_token)
            .await?;
        mark_booked(&mut slots, &booked_hours);

        Ok(slots)
    }

    /// Hour-of-day buckets (operational timezone) of the therapist's
    /// scheduled appointments on the given date.
    async fn fetch_booked_hours(
        &self,
        therapist_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<u32>, TherapistError> {
        let day_start = time::day_instant(date, self.timezone)
            .map_err(|e| TherapistError::ValidationError(e.to_string()))?;

        let path = format!(
            "/rest/v1/appointments?therapist_id=eq.{}&date=eq.{}&status=eq.scheduled&select=start_time",
            therapist_id,
            day_start.to_rfc3339()
        );
        let booked: Vec<BookedStartTime> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| TherapistError::DatabaseError(e.to_string()))?;

        Ok(booked
            .into_iter()
            .map(|row| time::local_hour(row.start_time, self.timezone))
            .collect())
    }
}

/// One candidate slot per whole hour in `[start_hour, end_hour)`, all
/// initially available, ordered by hour ascending. Unparseable stored
/// hours yield no slots.
pub fn candidate_slots(hours: &WorkingHours, date: NaiveDate) -> Vec<TimeSlot> {
    let (Some(start), Some(end)) = (hours.start_slot_hour(), hours.end_slot_hour()) else {
        return vec![];
    };

    (start..end).map(|hour| TimeSlot::for_hour(date, hour)).collect()
}

/// Whether the date's weekday falls inside the inclusive
/// `[start_day_in_week, end_day_in_week]` index range. The comparison
/// is not modular, so ranges wrapping over Saturday/Sunday never match.
pub fn is_working_day(hours: &WorkingHours, date: NaiveDate) -> bool {
    let day = DayOfWeek::from_date(date).index();
    day >= hours.start_day_in_week.index() && day <= hours.end_day_in_week.index()
}

/// Mark slots whose hour matches a scheduled appointment's start hour.
/// This is a deliberately coarse hour-bucket check: slots are
/// hour-aligned, and the precise interval comparison happens again at
/// booking commit time.
pub fn mark_booked(slots: &mut [TimeSlot], booked_hours: &[u32]) {
    for slot in slots.iter_mut() {
        let Some(hour) = slot
            .start_time
            .split(':')
            .next()
            .and_then(|h| h.parse::<u32>().ok())
        else {
            continue;
        };
        if booked_hours.contains(&hour) {
            slot.is_available = false;
        }
    }
}
