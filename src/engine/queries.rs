use chrono::NaiveDate;

use crate::model::*;

use super::availability::{bookable_spans, free_spans, resolve};
use super::conflict::{self, validate_window};
use super::{Engine, EngineError};

impl Engine {
    /// Is `[start, end)` on `date` bookable for the staff member, ignoring
    /// existing appointments?
    pub async fn resolve_availability(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
        start: Minute,
        end: Minute,
    ) -> Result<AvailabilityResult, EngineError> {
        let window = validate_window(start, end)?;
        let cal = self
            .get_staff_state(&staff_id)
            .ok_or(EngineError::NotFound(staff_id))?;
        let guard = cal.read().await;
        Ok(resolve(&guard, date, &window))
    }

    /// Every reason the window cannot be booked: overlapping live
    /// appointments in start order, then the availability verdict.
    /// `exclude` skips one appointment, for re-validating a move.
    pub async fn find_conflicts(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
        start: Minute,
        end: Minute,
        exclude: Option<AppointmentId>,
    ) -> Result<Vec<ScheduleConflict>, EngineError> {
        let window = validate_window(start, end)?;
        let cal = self
            .get_staff_state(&staff_id)
            .ok_or(EngineError::NotFound(staff_id))?;

        let day = self.get_day(&DayKey::new(staff_id, date));
        let day_guard = match &day {
            Some(d) => Some(d.read().await),
            None => None,
        };
        let cal_guard = cal.read().await;
        Ok(conflict::find_conflicts(
            &cal_guard,
            day_guard.as_deref(),
            date,
            &window,
            exclude,
        ))
    }

    /// Gaps of at least `min_duration` minutes in which a booking would succeed.
    pub async fn free_slots(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
        min_duration: Option<Minute>,
    ) -> Result<Vec<Span>, EngineError> {
        let cal = self
            .get_staff_state(&staff_id)
            .ok_or(EngineError::NotFound(staff_id))?;
        let bookable = bookable_spans(&*cal.read().await, date);
        if bookable.is_empty() {
            return Ok(bookable);
        }

        let occupied: Vec<Span> = match self.get_day(&DayKey::new(staff_id, date)) {
            Some(day) => {
                let guard = day.read().await;
                guard.active().map(Appointment::span).collect()
            }
            None => Vec::new(),
        };
        Ok(free_spans(&bookable, &occupied, min_duration))
    }

    pub async fn get_staff(&self, staff_id: StaffId) -> Option<StaffSchedule> {
        let cal = self.get_staff_state(&staff_id)?;
        let guard = cal.read().await;
        Some(guard.schedule.clone())
    }

    pub fn staff_ids(&self) -> Vec<StaffId> {
        self.staff.iter().map(|e| *e.key()).collect()
    }

    pub async fn overrides_for(&self, staff_id: StaffId) -> Vec<AvailabilityOverride> {
        let Some(cal) = self.get_staff_state(&staff_id) else {
            return vec![];
        };
        let guard = cal.read().await;
        guard.overrides.values().cloned().collect()
    }

    pub async fn time_off_for(&self, staff_id: StaffId) -> Vec<TimeOffSpan> {
        let Some(cal) = self.get_staff_state(&staff_id) else {
            return vec![];
        };
        let guard = cal.read().await;
        guard.time_off.clone()
    }

    pub async fn get_appointment(&self, id: AppointmentId) -> Option<Appointment> {
        // Retry once if the appointment moves between the index lookup and the read.
        for _ in 0..2 {
            let key = self.day_for_appointment(&id)?;
            let day = self.get_day(&key)?;
            if let Some(a) = day.read().await.get(id) {
                return Some(a.clone());
            }
        }
        None
    }

    /// All appointments of a staff-day in start order, terminal ones included.
    pub async fn appointments_for(&self, staff_id: StaffId, date: NaiveDate) -> Vec<Appointment> {
        match self.get_day(&DayKey::new(staff_id, date)) {
            Some(day) => {
                let guard = day.read().await;
                guard.appointments.clone()
            }
            None => vec![],
        }
    }
}
