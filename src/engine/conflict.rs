use chrono::NaiveDate;

use crate::clock::Clock;
use crate::limits::*;
use crate::model::*;

use super::availability::resolve;
use super::{EngineError, ValidationError};

/// Turn a raw `(start, end)` pair into a window, rejecting empty and inverted ones.
pub(crate) fn validate_window(start: Minute, end: Minute) -> Result<Span, ValidationError> {
    if end == start {
        return Err(ValidationError::EmptyWindow);
    }
    if end < start {
        return Err(ValidationError::EndBeforeStart);
    }
    if end > MINUTES_PER_DAY {
        return Err(ValidationError::CrossesMidnight);
    }
    Ok(Span::new(start, end))
}

pub(crate) fn validate_schedule(schedule: &StaffSchedule) -> Result<(), EngineError> {
    if let Some(ref n) = schedule.name
        && n.len() > MAX_NAME_LEN
    {
        return Err(EngineError::LimitExceeded("staff name too long"));
    }
    let hours = schedule.working_hours;
    if hours.end <= hours.start {
        return Err(ValidationError::InvalidSchedule("working hours end before they start").into());
    }
    if hours.end > MINUTES_PER_DAY {
        return Err(ValidationError::InvalidSchedule("working hours run past midnight").into());
    }
    if let Some(brk) = schedule.break_window {
        if brk.end <= brk.start {
            return Err(ValidationError::InvalidSchedule("break ends before it starts").into());
        }
        if brk.start <= hours.start || brk.end >= hours.end {
            return Err(
                ValidationError::InvalidSchedule("break must lie strictly inside working hours")
                    .into(),
            );
        }
    }
    Ok(())
}

pub(crate) fn validate_override(entry: &AvailabilityOverride) -> Result<(), EngineError> {
    if let Some(ref r) = entry.reason
        && r.len() > MAX_REASON_LEN
    {
        return Err(EngineError::LimitExceeded("override reason too long"));
    }
    if entry.is_available
        && let Some(window) = entry.window
    {
        if window.end <= window.start {
            return Err(ValidationError::InvalidOverride("window ends before it starts").into());
        }
        if window.end > MINUTES_PER_DAY {
            return Err(ValidationError::InvalidOverride("window runs past midnight").into());
        }
    }
    Ok(())
}

pub(crate) fn validate_time_off(span: &TimeOffSpan) -> Result<(), EngineError> {
    if span.end_date < span.start_date {
        return Err(ValidationError::InvalidTimeOff.into());
    }
    if (span.end_date - span.start_date).num_days() >= MAX_TIME_OFF_DAYS {
        return Err(EngineError::LimitExceeded("time off too long"));
    }
    if let Some(ref r) = span.reason
        && r.len() > MAX_REASON_LEN
    {
        return Err(EngineError::LimitExceeded("time off reason too long"));
    }
    Ok(())
}

pub(crate) fn check_not_in_past(
    clock: &dyn Clock,
    date: NaiveDate,
    start: Minute,
) -> Result<(), ValidationError> {
    let (today, now) = clock.today_and_minute();
    if date < today || (date == today && start < now) {
        return Err(ValidationError::InPast);
    }
    Ok(())
}

/// Overlap conflicts against the live appointments of a staff-day, in start order.
pub(crate) fn find_overlaps(
    day: Option<&DayBook>,
    window: &Span,
    exclude: Option<AppointmentId>,
) -> Vec<ScheduleConflict> {
    let Some(day) = day else {
        return Vec::new();
    };
    day.overlapping(window)
        .filter(|a| a.is_active() && Some(a.id) != exclude)
        .map(ScheduleConflict::overlap)
        .collect()
}

/// Every reason `window` on `date` cannot be booked: overlaps first, then the
/// availability verdict. Nothing is deduplicated.
pub(crate) fn find_conflicts(
    calendar: &StaffCalendar,
    day: Option<&DayBook>,
    date: NaiveDate,
    window: &Span,
    exclude: Option<AppointmentId>,
) -> Vec<ScheduleConflict> {
    let mut conflicts = find_overlaps(day, window, exclude);
    if let Some(reason) = resolve(calendar, date, window).reason {
        conflicts.push(reason.into());
    }
    conflicts
}
