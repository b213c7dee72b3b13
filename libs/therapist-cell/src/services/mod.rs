pub mod slots;
pub mod therapist;
pub mod working_hours;

pub use slots::SlotGeneratorService;
pub use therapist::TherapistService;
pub use working_hours::WorkingHoursService;
