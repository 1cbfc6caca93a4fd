use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{self, BOOKINGS_TOTAL, MOVES_TOTAL, STATUS_CHANGES_TOTAL};

use super::aggregate::{aggregate, service_label};
use super::conflict::{
    check_not_in_past, find_conflicts, validate_override, validate_schedule, validate_time_off,
    validate_window,
};
use super::locks::DayGuard;
use super::{Engine, EngineError, ValidationError};

/// Split the guards of a move into (source day, target day if different).
fn split_guards(guards: &mut [DayGuard], from: DayKey) -> (&mut DayBook, Option<&mut DayBook>) {
    match guards {
        [first, second] => {
            if first.key == from {
                (&mut **first, Some(&mut **second))
            } else {
                (&mut **second, Some(&mut **first))
            }
        }
        [only, ..] => (&mut **only, None),
        [] => unreachable!("lock_days returns one guard per key"),
    }
}

impl Engine {
    // ── Staff directory ──────────────────────────────────────

    /// Create a staff member or replace their weekly schedule.
    /// Overrides and time off recorded for them are kept.
    pub async fn upsert_staff(&self, schedule: StaffSchedule) -> Result<(), EngineError> {
        validate_schedule(&schedule)?;
        let _commit = self.enter_commit().await;
        let staff_id = schedule.staff_id;
        let event = Event::StaffUpserted {
            schedule: schedule.clone(),
        };

        let (mut guard, created) = match self.get_staff_state(&staff_id) {
            Some(cal) => (cal.write_owned().await, false),
            None => self.reserve_staff(schedule).await?,
        };
        if created {
            // The reserved calendar already holds the schedule; only the log is behind.
            if let Err(e) = self.wal_append(&event).await {
                self.staff.remove(&staff_id);
                return Err(e);
            }
        } else {
            self.persist_staff(&mut guard, &event).await?;
        }
        drop(guard);
        info!("staff {staff_id} schedule saved");
        Ok(())
    }

    /// Claim the directory slot for a new staff id. The calendar comes back
    /// write-locked, so nobody reads or extends it before its creating event
    /// is logged. If the id was registered meanwhile, the existing calendar
    /// is locked instead and the flag is false.
    async fn reserve_staff(
        &self,
        schedule: StaffSchedule,
    ) -> Result<(OwnedRwLockWriteGuard<StaffCalendar>, bool), EngineError> {
        let registration = self.registration.lock().await;
        if let Some(cal) = self.get_staff_state(&schedule.staff_id) {
            drop(registration);
            return Ok((cal.write_owned().await, false));
        }
        if self.staff.len() >= MAX_STAFF_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many staff"));
        }

        let staff_id = schedule.staff_id;
        let cal = Arc::new(RwLock::new(StaffCalendar::new(schedule)));
        let guard = cal.clone().write_owned().await;
        self.staff.insert(staff_id, cal);
        Ok((guard, true))
    }

    pub async fn set_staff_status(
        &self,
        staff_id: StaffId,
        status: StaffStatus,
    ) -> Result<(), EngineError> {
        let _commit = self.enter_commit().await;
        let cal = self
            .get_staff_state(&staff_id)
            .ok_or(EngineError::NotFound(staff_id))?;
        let mut guard = cal.write().await;
        let event = Event::StaffStatusChanged { staff_id, status };
        self.persist_staff(&mut guard, &event).await
    }

    // ── Overrides and time off ───────────────────────────────

    /// Record a date override. Replaces any earlier override for the same date.
    pub async fn set_override(&self, entry: AvailabilityOverride) -> Result<(), EngineError> {
        validate_override(&entry)?;
        let _commit = self.enter_commit().await;
        let cal = self
            .get_staff_state(&entry.staff_id)
            .ok_or(EngineError::NotFound(entry.staff_id))?;
        let mut guard = cal.write().await;
        if !guard.overrides.contains_key(&entry.date)
            && guard.overrides.len() >= MAX_OVERRIDES_PER_STAFF
        {
            return Err(EngineError::LimitExceeded("too many overrides for staff"));
        }

        let (staff_id, date) = (entry.staff_id, entry.date);
        self.persist_staff(&mut guard, &Event::OverrideSet { entry })
            .await?;
        debug!("override set for staff {staff_id} on {date}");
        Ok(())
    }

    /// Drop the override for a date. Returns false if there was none.
    pub async fn clear_override(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
    ) -> Result<bool, EngineError> {
        let _commit = self.enter_commit().await;
        let cal = self
            .get_staff_state(&staff_id)
            .ok_or(EngineError::NotFound(staff_id))?;
        let mut guard = cal.write().await;
        if !guard.overrides.contains_key(&date) {
            return Ok(false);
        }
        self.persist_staff(&mut guard, &Event::OverrideCleared { staff_id, date })
            .await?;
        Ok(true)
    }

    pub async fn add_time_off(&self, span: TimeOffSpan) -> Result<(), EngineError> {
        validate_time_off(&span)?;
        let _commit = self.enter_commit().await;
        if self.time_off_index.contains_key(&span.id) {
            return Err(EngineError::AlreadyExists(span.id));
        }
        let cal = self
            .get_staff_state(&span.staff_id)
            .ok_or(EngineError::NotFound(span.staff_id))?;
        let mut guard = cal.write().await;
        if guard.time_off.len() >= MAX_TIME_OFF_PER_STAFF {
            return Err(EngineError::LimitExceeded("too much time off for staff"));
        }
        self.persist_staff(&mut guard, &Event::TimeOffAdded { span })
            .await
    }

    /// Approve or reject a time-off request.
    pub async fn review_time_off(
        &self,
        id: TimeOffId,
        status: TimeOffStatus,
    ) -> Result<TimeOffSpan, EngineError> {
        let _commit = self.enter_commit().await;
        let staff_id = self
            .time_off_index
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(id))?;
        let cal = self
            .get_staff_state(&staff_id)
            .ok_or(EngineError::NotFound(staff_id))?;
        let mut guard = cal.write().await;

        let event = Event::TimeOffReviewed {
            id,
            staff_id,
            status,
        };
        self.persist_staff(&mut guard, &event).await?;
        info!("time off {id} for staff {staff_id} marked {status:?}");
        guard
            .time_off
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    // ── Booking ──────────────────────────────────────────────

    /// Book `lines` for a client with one staff member, starting at `start`.
    ///
    /// The whole check-then-write runs inside the staff-day's exclusive
    /// section: either the appointment is committed in state `Scheduled`, or
    /// every conflict is returned and nothing is written.
    pub async fn book(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
        start: Minute,
        client_id: ClientId,
        lines: Vec<ServiceLineItem>,
    ) -> Result<Appointment, EngineError> {
        let started = Instant::now();
        let result = self
            .book_inner(staff_id, date, start, client_id, lines)
            .await;
        observability::record_outcome(BOOKINGS_TOTAL, "book", &result, started);
        result
    }

    async fn book_inner(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
        start: Minute,
        client_id: ClientId,
        lines: Vec<ServiceLineItem>,
    ) -> Result<Appointment, EngineError> {
        if lines.len() > MAX_LINE_ITEMS {
            return Err(EngineError::LimitExceeded("too many service lines"));
        }
        if lines.iter().any(|l| l.name.len() > MAX_NAME_LEN) {
            return Err(EngineError::LimitExceeded("service name too long"));
        }
        let totals = aggregate(&lines)?;
        let window = validate_window(start, totals.end_time(start)?)?;
        if self.config.reject_past_bookings {
            check_not_in_past(self.clock.as_ref(), date, start)?;
        }

        let _commit = self.enter_commit().await;
        let cal = self
            .get_staff_state(&staff_id)
            .ok_or(EngineError::NotFound(staff_id))?;
        let key = DayKey::new(staff_id, date);
        let mut guards = self.lock_days(&[key]).await?;
        let (day, _) = split_guards(&mut guards, key);
        let cal_guard = cal.read().await;

        if day.appointments.len() >= MAX_APPOINTMENTS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many appointments on day"));
        }
        let conflicts = find_conflicts(&cal_guard, Some(&*day), date, &window, None);
        if !conflicts.is_empty() {
            debug!(
                "booking {key} {window} rejected with {} conflict(s)",
                conflicts.len()
            );
            return Err(EngineError::Conflict(conflicts));
        }

        let appointment = Appointment {
            id: Ulid::new(),
            staff_id,
            client_id,
            date,
            start,
            duration: totals.total_duration,
            price: totals.total_price,
            service: service_label(&lines),
            lines,
            status: AppointmentStatus::Scheduled,
            payment_status: PaymentStatus::Unpaid,
        };
        let event = Event::AppointmentBooked {
            appointment: appointment.clone(),
        };
        self.persist_days(day, None, &event).await?;
        drop(cal_guard);

        info!(
            "booked {} for client {client_id} with {key} at {window}",
            appointment.id
        );
        Ok(appointment)
    }

    /// Reschedule an appointment to another staff member, date or start time.
    ///
    /// The duration is kept. Conflicts are checked against the target slot,
    /// ignoring the appointment itself. On any failure the appointment is
    /// left exactly as it was.
    pub async fn move_appointment(
        &self,
        id: AppointmentId,
        new_staff_id: StaffId,
        new_date: NaiveDate,
        new_start: Minute,
    ) -> Result<Appointment, EngineError> {
        let started = Instant::now();
        let result = self
            .move_inner(id, new_staff_id, new_date, new_start)
            .await;
        observability::record_outcome(MOVES_TOTAL, "move", &result, started);
        result
    }

    async fn move_inner(
        &self,
        id: AppointmentId,
        new_staff_id: StaffId,
        new_date: NaiveDate,
        new_start: Minute,
    ) -> Result<Appointment, EngineError> {
        if new_start >= MINUTES_PER_DAY {
            return Err(ValidationError::CrossesMidnight.into());
        }
        if self.config.reject_past_bookings {
            check_not_in_past(self.clock.as_ref(), new_date, new_start)?;
        }

        let _commit = self.enter_commit().await;
        let cal = self
            .get_staff_state(&new_staff_id)
            .ok_or(EngineError::NotFound(new_staff_id))?;
        let to_key = DayKey::new(new_staff_id, new_date);
        let (from_key, mut guards) = self.lock_appointment_day(id, Some(to_key)).await?;
        let (from_day, mut to_day) = split_guards(&mut guards, from_key);

        let current = from_day.get(id).ok_or(EngineError::NotFound(id))?;
        if current.status.is_terminal() {
            return Err(ValidationError::TerminalAppointment(id).into());
        }
        let end = new_start.saturating_add(current.duration);
        if end > MINUTES_PER_DAY {
            return Err(ValidationError::CrossesMidnight.into());
        }
        let window = validate_window(new_start, end)?;

        let cal_guard = cal.read().await;
        let conflicts = {
            let target: &DayBook = match to_day.as_deref() {
                Some(t) => t,
                None => &*from_day,
            };
            if target.key != from_key && target.appointments.len() >= MAX_APPOINTMENTS_PER_DAY {
                return Err(EngineError::LimitExceeded("too many appointments on day"));
            }
            find_conflicts(&cal_guard, Some(target), new_date, &window, Some(id))
        };
        if !conflicts.is_empty() {
            debug!(
                "move of {id} to {to_key} {window} rejected with {} conflict(s)",
                conflicts.len()
            );
            return Err(EngineError::Conflict(conflicts));
        }

        let event = Event::AppointmentMoved {
            id,
            from: from_key,
            to: to_key,
            start: new_start,
        };
        self.persist_days(from_day, to_day.as_deref_mut(), &event)
            .await?;
        drop(cal_guard);

        info!("moved {id} from {from_key} to {to_key} at {window}");
        let target: &DayBook = match to_day.as_deref() {
            Some(t) => t,
            None => &*from_day,
        };
        target.get(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Advance an appointment's lifecycle. Terminal states accept nothing.
    pub async fn transition_status(
        &self,
        id: AppointmentId,
        next: AppointmentStatus,
    ) -> Result<Appointment, EngineError> {
        let started = Instant::now();
        let result = self.transition_inner(id, next).await;
        observability::record_outcome(STATUS_CHANGES_TOTAL, "transition_status", &result, started);
        result
    }

    async fn transition_inner(
        &self,
        id: AppointmentId,
        next: AppointmentStatus,
    ) -> Result<Appointment, EngineError> {
        let _commit = self.enter_commit().await;
        let (key, mut guards) = self.lock_appointment_day(id, None).await?;
        let (day, _) = split_guards(&mut guards, key);

        let current = day.get(id).ok_or(EngineError::NotFound(id))?.status;
        if !current.can_transition_to(next) {
            return Err(ValidationError::InvalidTransition {
                from: current,
                to: next,
            }
            .into());
        }

        let event = Event::AppointmentStatusChanged {
            id,
            key,
            status: next,
        };
        self.persist_days(day, None, &event).await?;
        info!("appointment {id} {current} -> {next}");
        day.get(id).cloned().ok_or(EngineError::NotFound(id))
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Rewrite the WAL with only the events needed to recreate the current state.
    ///
    /// The commit gate is held exclusively for the whole rewrite, so no
    /// event can reach the old log after the snapshot is taken. Read guards
    /// then follow the committers' order: days by key, then staff.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _exclusive = self.commit_gate.write().await;
        let mut day_keys: Vec<DayKey> = self.days.iter().map(|e| *e.key()).collect();
        day_keys.sort();
        let mut day_guards = Vec::with_capacity(day_keys.len());
        for key in &day_keys {
            if let Some(day) = self.get_day(key) {
                day_guards.push(day.read_owned().await);
            }
        }

        let staff_ids: Vec<StaffId> = self.staff.iter().map(|e| *e.key()).collect();
        let mut staff_guards = Vec::with_capacity(staff_ids.len());
        for id in &staff_ids {
            if let Some(cal) = self.get_staff_state(id) {
                staff_guards.push(cal.read_owned().await);
            }
        }

        let mut events = Vec::new();
        for cal in &staff_guards {
            events.push(Event::StaffUpserted {
                schedule: cal.schedule.clone(),
            });
            events.extend(
                cal.overrides
                    .values()
                    .map(|entry| Event::OverrideSet { entry: entry.clone() }),
            );
            events.extend(
                cal.time_off
                    .iter()
                    .map(|span| Event::TimeOffAdded { span: span.clone() }),
            );
        }
        for day in &day_guards {
            events.extend(day.appointments.iter().map(|a| Event::AppointmentBooked {
                appointment: a.clone(),
            }));
        }

        let count = events.len();
        self.wal
            .compact(events)
            .await
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!("compacted WAL to {count} event(s)");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        self.wal.appends_since_compact().await
    }
}
