use chrono::NaiveDate;
use thiserror::Error;
use ulid::Ulid;

use crate::model::{AppointmentId, AppointmentStatus, ScheduleConflict, StaffId};

/// Malformed input, rejected before any lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("window is empty")]
    EmptyWindow,
    #[error("window ends before it starts")]
    EndBeforeStart,
    #[error("service duration must be positive")]
    ZeroDuration,
    #[error("an appointment needs at least one service")]
    NoServiceLines,
    #[error("service price must not be negative")]
    NegativePrice,
    #[error("total price is out of range")]
    PriceOverflow,
    #[error("appointment would run past midnight")]
    CrossesMidnight,
    #[error("invalid schedule: {0}")]
    InvalidSchedule(&'static str),
    #[error("invalid override: {0}")]
    InvalidOverride(&'static str),
    #[error("time off ends before it starts")]
    InvalidTimeOff,
    #[error("appointment {0} is completed, cancelled or a no-show")]
    TerminalAppointment(AppointmentId),
    #[error("cannot change status from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    #[error("requested slot is in the past")]
    InPast,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{} scheduling conflict(s): {}", .0.len(), summarize(.0))]
    Conflict(Vec<ScheduleConflict>),
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("staff {staff_id} on {date} is busy, retry later")]
    Contention { staff_id: StaffId, date: NaiveDate },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    pub fn conflicts(&self) -> Option<&[ScheduleConflict]> {
        match self {
            EngineError::Conflict(list) => Some(list),
            _ => None,
        }
    }

    /// Label for the `outcome` metric dimension.
    pub fn outcome(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "invalid",
            EngineError::Conflict(_) => "conflict",
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::Contention { .. } => "contention",
            EngineError::LimitExceeded(_) => "limit",
            EngineError::WalError(_) => "wal_error",
        }
    }
}

fn summarize(conflicts: &[ScheduleConflict]) -> String {
    conflicts
        .iter()
        .map(|c| c.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
