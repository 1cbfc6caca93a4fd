use chrono::NaiveDate;

use crate::model::*;

// ── Availability rules ────────────────────────────────────────────

/// Decide whether `window` on `date` is bookable for the staff member.
///
/// Rules are evaluated in priority order and the first match wins:
/// inactive staff, approved time off, a date override (which replaces the
/// weekly pattern outright), then the weekly schedule and its break.
///
/// Pure: the answer depends only on the calendar and the arguments.
pub fn resolve(calendar: &StaffCalendar, date: NaiveDate, window: &Span) -> AvailabilityResult {
    if calendar.schedule.status == StaffStatus::Inactive {
        return AvailabilityResult::unavailable(Unavailability::StaffInactive);
    }

    if let Some(off) = calendar.approved_time_off_on(date) {
        return AvailabilityResult::unavailable(Unavailability::TimeOff {
            time_off_id: off.id,
        });
    }

    if let Some(ovr) = calendar.override_on(date) {
        return match ovr.bookable_window() {
            None => AvailabilityResult::unavailable(Unavailability::OverrideUnavailable {
                reason: ovr.reason.clone(),
            }),
            Some(bookable) if bookable.contains_span(window) => AvailabilityResult::available(),
            Some(_) => AvailabilityResult::unavailable(Unavailability::OutsideWorkingHours),
        };
    }

    let schedule = &calendar.schedule;
    if !calendar.works_on(date) || !schedule.working_hours.contains_span(window) {
        return AvailabilityResult::unavailable(Unavailability::OutsideWorkingHours);
    }
    if let Some(brk) = schedule.break_window
        && brk.overlaps(window)
    {
        return AvailabilityResult::unavailable(Unavailability::InsideBreak);
    }

    AvailabilityResult::available()
}

/// The spans of `date` inside which any window resolves as available,
/// before existing appointments are taken into account.
pub fn bookable_spans(calendar: &StaffCalendar, date: NaiveDate) -> Vec<Span> {
    if calendar.schedule.status == StaffStatus::Inactive
        || calendar.approved_time_off_on(date).is_some()
    {
        return Vec::new();
    }

    if let Some(ovr) = calendar.override_on(date) {
        return ovr.bookable_window().into_iter().collect();
    }

    if !calendar.works_on(date) {
        return Vec::new();
    }
    let hours = [calendar.schedule.working_hours];
    match calendar.schedule.break_window {
        Some(brk) => subtract_intervals(&hours, &[brk]),
        None => hours.to_vec(),
    }
}

/// Bookable spans minus the given occupied spans, keeping only gaps of at
/// least `min_duration` minutes.
pub fn free_spans(bookable: &[Span], occupied: &[Span], min_duration: Option<Minute>) -> Vec<Span> {
    let mut occupied = occupied.to_vec();
    occupied.sort_by_key(|s| s.start);
    let occupied = merge_overlapping(&occupied);

    let mut free = subtract_intervals(bookable, &occupied);
    if let Some(min) = min_duration {
        free.retain(|span| span.duration() >= min);
    }
    free
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// Remove sorted, disjoint `to_remove` spans from sorted `base` spans.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
