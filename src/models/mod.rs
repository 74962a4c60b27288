pub mod booking;
pub mod interval;
pub mod payment;
pub mod user;

pub use booking::{
    Booking, BookingPatch, BookingRequest, BookingStatus, ConflictingBooking, MultiSlotRequest,
    NewBooking, PaymentStatus,
};
pub use interval::TimeInterval;
pub use payment::Payment;
pub use user::{AvailabilitySlot, Resource, User};
