//! Appointment scheduling and conflict detection for salons.
//!
//! Each tenant gets an [`engine::Engine`] holding staff calendars and
//! appointments in memory, persisted to a write-ahead log. Bookings and
//! moves are checked and committed inside a per-(staff, date) exclusive
//! section, so a slot is never double-booked.

pub mod clock;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod tenant;
pub mod wal;
