mod aggregate;
mod availability;
mod conflict;
mod error;
mod locks;
mod mutations;
mod queries;

pub use aggregate::{aggregate, service_label, ServiceTotals};
pub use availability::{bookable_spans, free_spans, merge_overlapping, resolve, subtract_intervals};
pub use error::{EngineError, ValidationError};

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::model::*;
use crate::wal::{Wal, WalHandle};

pub type SharedStaff = Arc<RwLock<StaffCalendar>>;
pub type SharedDay = Arc<RwLock<DayBook>>;

/// Scheduling state of one tenant.
///
/// Staff calendars and staff-days each sit behind their own lock. Every
/// mutation is appended to the WAL before it is applied in memory, so a
/// failed append leaves the state untouched.
pub struct Engine {
    pub staff: DashMap<StaffId, SharedStaff>,
    pub days: DashMap<DayKey, SharedDay>,
    pub(super) wal: WalHandle,
    /// Reverse lookup: appointment id → the staff-day holding it.
    pub(super) appointment_index: DashMap<AppointmentId, DayKey>,
    /// Reverse lookup: time-off id → staff id.
    pub(super) time_off_index: DashMap<TimeOffId, StaffId>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: EngineConfig,
    /// Committers hold it shared from before their first lock until their
    /// event is applied; `compact_wal` holds it exclusively.
    pub(super) commit_gate: RwLock<()>,
    /// Serializes creation of new staff calendars.
    pub(super) registration: Mutex<()>,
}

/// Apply a staff-level event to a calendar (caller holds the lock).
fn apply_to_staff(
    cal: &mut StaffCalendar,
    event: &Event,
    time_off_index: &DashMap<TimeOffId, StaffId>,
) {
    match event {
        Event::StaffUpserted { schedule } => cal.schedule = schedule.clone(),
        Event::StaffStatusChanged { status, .. } => cal.schedule.status = *status,
        Event::OverrideSet { entry } => {
            cal.overrides.insert(entry.date, entry.clone());
        }
        Event::OverrideCleared { date, .. } => {
            cal.overrides.remove(date);
        }
        Event::TimeOffAdded { span } => {
            time_off_index.insert(span.id, span.staff_id);
            cal.time_off.push(span.clone());
        }
        Event::TimeOffReviewed { id, status, .. } => {
            if let Some(span) = cal.time_off.iter_mut().find(|t| t.id == *id) {
                span.status = *status;
            }
        }
        Event::AppointmentBooked { .. }
        | Event::AppointmentMoved { .. }
        | Event::AppointmentStatusChanged { .. } => {}
    }
}

/// Apply an appointment event. `to` is the target day of a move across
/// staff-days; every other event touches `day` only.
fn apply_to_days(
    day: &mut DayBook,
    to: Option<&mut DayBook>,
    event: &Event,
    index: &DashMap<AppointmentId, DayKey>,
) {
    match event {
        Event::AppointmentBooked { appointment } => {
            index.insert(appointment.id, day.key);
            day.insert_appointment(appointment.clone());
        }
        Event::AppointmentMoved { id, to: to_key, start, .. } => {
            let Some(mut appointment) = day.remove_appointment(*id) else {
                return;
            };
            appointment.staff_id = to_key.staff_id;
            appointment.date = to_key.date;
            appointment.start = *start;
            index.insert(*id, *to_key);
            match to {
                Some(target) => target.insert_appointment(appointment),
                None => day.insert_appointment(appointment),
            }
        }
        Event::AppointmentStatusChanged { id, status, .. } => {
            if let Some(appointment) = day.get_mut(*id) {
                appointment.status = *status;
            }
        }
        _ => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, config: EngineConfig) -> std::io::Result<Self> {
        Self::with_clock(wal_path, config, Arc::new(SystemClock))
    }

    /// Replay the WAL at `wal_path` and start its writer task.
    pub fn with_clock(
        wal_path: PathBuf,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = WalHandle::spawn(Wal::open(&wal_path)?);

        let engine = Self {
            staff: DashMap::new(),
            days: DashMap::new(),
            wal,
            appointment_index: DashMap::new(),
            time_off_index: DashMap::new(),
            clock,
            config,
            commit_gate: RwLock::new(()),
            registration: Mutex::new(()),
        };

        // We are the sole owner of every Arc here, so try_write never fails.
        // blocking_write would panic inside an async context (lazy tenant creation).
        for event in &events {
            engine.replay_event(event);
        }
        if !events.is_empty() {
            tracing::info!(
                "replayed {} event(s) from {}: {} staff, {} appointment(s)",
                events.len(),
                wal_path.display(),
                engine.staff.len(),
                engine.appointment_index.len()
            );
        }

        Ok(engine)
    }

    fn replay_event(&self, event: &Event) {
        match event {
            Event::StaffUpserted { schedule } if !self.staff.contains_key(&schedule.staff_id) => {
                let cal = StaffCalendar::new(schedule.clone());
                self.staff
                    .insert(schedule.staff_id, Arc::new(RwLock::new(cal)));
            }
            Event::StaffUpserted { schedule } => self.replay_staff(schedule.staff_id, event),
            Event::StaffStatusChanged { staff_id, .. }
            | Event::OverrideCleared { staff_id, .. }
            | Event::TimeOffReviewed { staff_id, .. } => self.replay_staff(*staff_id, event),
            Event::OverrideSet { entry } => self.replay_staff(entry.staff_id, event),
            Event::TimeOffAdded { span } => self.replay_staff(span.staff_id, event),
            Event::AppointmentBooked { appointment } => {
                self.replay_days(appointment.day_key(), None, event)
            }
            Event::AppointmentStatusChanged { key, .. } => self.replay_days(*key, None, event),
            Event::AppointmentMoved { from, to, .. } if from == to => {
                self.replay_days(*from, None, event)
            }
            Event::AppointmentMoved { from, to, .. } => self.replay_days(*from, Some(*to), event),
        }
    }

    fn replay_staff(&self, staff_id: StaffId, event: &Event) {
        if let Some(cal) = self.get_staff_state(&staff_id)
            && let Ok(mut guard) = cal.try_write()
        {
            apply_to_staff(&mut guard, event, &self.time_off_index);
        }
    }

    fn replay_days(&self, key: DayKey, to: Option<DayKey>, event: &Event) {
        let day = self.day_entry(key);
        let Ok(mut guard) = day.try_write() else {
            return;
        };
        match to {
            Some(to_key) => {
                let target = self.day_entry(to_key);
                if let Ok(mut target_guard) = target.try_write() {
                    apply_to_days(&mut guard, Some(&mut target_guard), event, &self.appointment_index);
                }
            }
            None => apply_to_days(&mut guard, None, event, &self.appointment_index),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn get_staff_state(&self, id: &StaffId) -> Option<SharedStaff> {
        self.staff.get(id).map(|e| e.value().clone())
    }

    pub fn get_day(&self, key: &DayKey) -> Option<SharedDay> {
        self.days.get(key).map(|e| e.value().clone())
    }

    pub fn day_for_appointment(&self, id: &AppointmentId) -> Option<DayKey> {
        self.appointment_index.get(id).map(|e| *e.value())
    }

    /// Enter the commit path. Taken before any staff-day or staff lock.
    pub(super) async fn enter_commit(&self) -> RwLockReadGuard<'_, ()> {
        self.commit_gate.read().await
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        self.wal
            .append(event.clone())
            .await
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append then apply a staff-level event.
    pub(super) async fn persist_staff(
        &self,
        cal: &mut StaffCalendar,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_staff(cal, event, &self.time_off_index);
        Ok(())
    }

    /// WAL-append then apply an appointment event.
    pub(super) async fn persist_days(
        &self,
        day: &mut DayBook,
        to: Option<&mut DayBook>,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_days(day, to, event, &self.appointment_index);
        Ok(())
    }
}
