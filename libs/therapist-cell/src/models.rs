// libs/therapist-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE THERAPIST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Therapist {
    pub id: Uuid,
    pub user_id: String,
    pub full_name: String,
    pub specialization: Option<String>,
    pub about: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Weekday names as stored in working-hours rows, in the fixed
/// Sunday-first ordering the day-range check indexes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayOfWeek {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl DayOfWeek {
    /// Index in the Sunday=0 .. Saturday=6 ordering.
    pub fn index(&self) -> u8 {
        match self {
            DayOfWeek::Sunday => 0,
            DayOfWeek::Monday => 1,
            DayOfWeek::Tuesday => 2,
            DayOfWeek::Wednesday => 3,
            DayOfWeek::Thursday => 4,
            DayOfWeek::Friday => 5,
            DayOfWeek::Saturday => 6,
        }
    }

    pub fn from_date(date: NaiveDate) -> DayOfWeek {
        match chrono::Datelike::weekday(&date) {
            Weekday::Sun => DayOfWeek::Sunday,
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DayOfWeek::Sunday => "Sunday",
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
        };
        write!(f, "{}", name)
    }
}

/// A therapist's single recurring weekly availability window. One row
/// per therapist; updates go through upsert.
///
/// The day range is inclusive and evaluated by index comparison, so a
/// week wrapping over the Saturday/Sunday boundary (e.g. Friday-Monday)
/// is not representable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHours {
    pub id: Uuid,
    pub therapist_id: Uuid,
    pub start_day_in_week: DayOfWeek,
    pub end_day_in_week: DayOfWeek,
    /// Wall-clock "HH:MM" in the operational timezone.
    pub start_hour: String,
    pub end_hour: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkingHours {
    /// Whole-hour slot boundary derived from the stored "HH:MM" string
    /// (minutes are discarded; slots are hour-aligned).
    pub fn start_slot_hour(&self) -> Option<u32> {
        parse_slot_hour(&self.start_hour)
    }

    pub fn end_slot_hour(&self) -> Option<u32> {
        parse_slot_hour(&self.end_hour)
    }
}

fn parse_slot_hour(hour_minute: &str) -> Option<u32> {
    hour_minute
        .split(':')
        .next()
        .and_then(|h| h.parse::<u32>().ok())
        .filter(|h| *h < 24)
}

// ==============================================================================
// DERIVED SLOT MODEL
// ==============================================================================

/// Hourly candidate appointment window. Derived per query, never
/// persisted; times are wall-clock strings in the operational timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: String,
    pub start_time: String,
    pub end_time: String,
    pub is_available: bool,
}

impl TimeSlot {
    pub fn for_hour(date: NaiveDate, hour: u32) -> TimeSlot {
        TimeSlot {
            id: format!("{}-{}", date, hour),
            start_time: format!("{}:00", hour),
            end_time: format!("{}:00", hour + 1),
            is_available: true,
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertWorkingHoursRequest {
    pub start_day_in_week: DayOfWeek,
    pub end_day_in_week: DayOfWeek,
    pub start_hour: String,
    pub end_hour: String,
}

#[derive(Debug, Deserialize)]
pub struct AvailableSlotsQuery {
    pub date: NaiveDate,
    pub therapist_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TherapistSummary {
    pub id: Uuid,
    pub full_name: String,
    pub specialization: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TherapistStats {
    pub today_appointments: usize,
    pub total_patients: usize,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum TherapistError {
    #[error("Therapist not found")]
    NotFound,

    #[error("Therapist profile not found for user")]
    ProfileNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
