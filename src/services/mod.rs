pub mod bookings;
pub mod calendar;
pub mod conflicts;
pub mod messaging;
pub mod reminders;
