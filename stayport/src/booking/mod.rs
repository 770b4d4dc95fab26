//! Booking module: creation, pricing and the status transition table.

pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod pricing;

pub use errors::{BookingError, BookingResult};
pub use models::{
    Booking, BookingId, BookingRequest, BookingStatus, NewBooking, PaymentStatus,
};
pub use orchestrator::BookingOrchestrator;
pub use pricing::{CommissionPolicy, booking_total};
