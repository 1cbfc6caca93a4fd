use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minute of the day, `0..=1440`. The only time-of-day type.
pub type Minute = u32;

pub const MINUTES_PER_DAY: Minute = 24 * 60;

pub type StaffId = Ulid;
pub type ClientId = Ulid;
pub type AppointmentId = Ulid;
pub type TimeOffId = Ulid;

/// `hm(9, 30)` is 09:30.
pub const fn hm(hour: u32, minute: u32) -> Minute {
    hour * 60 + minute
}

pub fn fmt_minute(m: Minute) -> String {
    format!("{:02}:{:02}", m / 60, m % 60)
}

/// Half-open interval `[start, end)` of minutes within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Minute,
    pub end: Minute,
}

impl Span {
    pub fn new(start: Minute, end: Minute) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn full_day() -> Self {
        Self::new(0, MINUTES_PER_DAY)
    }

    pub fn duration(&self) -> Minute {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Minute) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", fmt_minute(self.start), fmt_minute(self.end))
    }
}

/// Set of weekdays, one bit per day starting at Monday.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingDays(u8);

impl WorkingDays {
    pub fn from_days(days: &[Weekday]) -> Self {
        let mut set = Self::default();
        for &d in days {
            set.insert(d);
        }
        set
    }

    /// Monday through Friday.
    pub fn weekdays() -> Self {
        Self(0b0001_1111)
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StaffStatus {
    Active,
    Inactive,
}

/// Weekly working pattern of one staff member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffSchedule {
    pub staff_id: StaffId,
    pub name: Option<String>,
    pub working_days: WorkingDays,
    pub working_hours: Span,
    /// Daily break; lies strictly inside `working_hours`.
    pub break_window: Option<Span>,
    pub status: StaffStatus,
}

/// Date-specific exception to the weekly schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityOverride {
    pub staff_id: StaffId,
    pub date: NaiveDate,
    /// Bookable window when `is_available`; `None` means the whole day.
    pub window: Option<Span>,
    pub is_available: bool,
    pub reason: Option<String>,
}

impl AvailabilityOverride {
    pub fn bookable_window(&self) -> Option<Span> {
        self.is_available
            .then(|| self.window.unwrap_or_else(Span::full_day))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeOffStatus {
    Pending,
    Approved,
    Rejected,
}

/// Multi-day absence, both dates inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOffSpan {
    pub id: TimeOffId,
    pub staff_id: StaffId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: TimeOffStatus,
    pub reason: Option<String>,
}

impl TimeOffSpan {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    pub fn blocks(&self, date: NaiveDate) -> bool {
        self.status == TimeOffStatus::Approved && self.covers(date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }

    /// Forward-only lifecycle; `Cancelled`/`NoShow` reachable from any live state.
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        match (self, next) {
            (Scheduled, Confirmed) | (Confirmed, InProgress) | (InProgress, Completed) => true,
            (from, Cancelled | NoShow) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scheduled => "scheduled",
            Self::Confirmed => "confirmed",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

/// One service within an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLineItem {
    pub name: String,
    pub price: Decimal,
    pub duration: Minute,
    /// Staff credited with this line, for reporting only.
    pub staff_id: Option<StaffId>,
}

impl ServiceLineItem {
    pub fn new(name: impl Into<String>, price: Decimal, duration: Minute) -> Self {
        Self {
            name: name.into(),
            price,
            duration,
            staff_id: None,
        }
    }

    pub fn assigned_to(mut self, staff_id: StaffId) -> Self {
        self.staff_id = Some(staff_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub staff_id: StaffId,
    pub client_id: ClientId,
    pub date: NaiveDate,
    pub start: Minute,
    pub duration: Minute,
    pub price: Decimal,
    /// Display string built from the line items in order.
    pub service: String,
    pub lines: Vec<ServiceLineItem>,
    pub status: AppointmentStatus,
    pub payment_status: PaymentStatus,
}

impl Appointment {
    pub fn end(&self) -> Minute {
        self.start + self.duration
    }

    pub fn span(&self) -> Span {
        Span::new(self.start, self.end())
    }

    pub fn day_key(&self) -> DayKey {
        DayKey::new(self.staff_id, self.date)
    }

    /// Whether the appointment still occupies its slot.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Why a window cannot be booked, as decided by the availability rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unavailability {
    StaffInactive,
    TimeOff { time_off_id: TimeOffId },
    OverrideUnavailable { reason: Option<String> },
    OutsideWorkingHours,
    InsideBreak,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityResult {
    pub available: bool,
    pub reason: Option<Unavailability>,
}

impl AvailabilityResult {
    pub fn available() -> Self {
        Self {
            available: true,
            reason: None,
        }
    }

    pub fn unavailable(reason: Unavailability) -> Self {
        Self {
            available: false,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictKind {
    Overlap {
        appointment_id: AppointmentId,
        span: Span,
    },
    OutsideWorkingHours,
    InsideBreak,
    TimeOff {
        time_off_id: TimeOffId,
    },
    OverrideUnavailable {
        reason: Option<String>,
    },
    StaffInactive,
}

impl ConflictKind {
    pub fn label(&self) -> &'static str {
        match self {
            ConflictKind::Overlap { .. } => "overlap",
            ConflictKind::OutsideWorkingHours => "outside_working_hours",
            ConflictKind::InsideBreak => "inside_break",
            ConflictKind::TimeOff { .. } => "time_off",
            ConflictKind::OverrideUnavailable { .. } => "override_unavailable",
            ConflictKind::StaffInactive => "staff_inactive",
        }
    }
}

/// One reason a candidate window cannot be granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConflict {
    pub kind: ConflictKind,
    pub message: String,
}

impl ScheduleConflict {
    pub fn overlap(existing: &Appointment) -> Self {
        let span = existing.span();
        Self {
            kind: ConflictKind::Overlap {
                appointment_id: existing.id,
                span,
            },
            message: format!("overlaps appointment {} at {span}", existing.id),
        }
    }
}

impl From<Unavailability> for ScheduleConflict {
    fn from(reason: Unavailability) -> Self {
        let (kind, message) = match reason {
            Unavailability::StaffInactive => {
                (ConflictKind::StaffInactive, "staff member is inactive".to_string())
            }
            Unavailability::TimeOff { time_off_id } => (
                ConflictKind::TimeOff { time_off_id },
                format!("staff member is on approved time off ({time_off_id})"),
            ),
            Unavailability::OverrideUnavailable { reason } => {
                let message = match &reason {
                    Some(r) => format!("staff member is unavailable on this date: {r}"),
                    None => "staff member is unavailable on this date".to_string(),
                };
                (ConflictKind::OverrideUnavailable { reason }, message)
            }
            Unavailability::OutsideWorkingHours => (
                ConflictKind::OutsideWorkingHours,
                "outside working hours".to_string(),
            ),
            Unavailability::InsideBreak => {
                (ConflictKind::InsideBreak, "overlaps the daily break".to_string())
            }
        };
        Self { kind, message }
    }
}

/// The unit of serialization: one staff member's calendar on one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DayKey {
    pub staff_id: StaffId,
    pub date: NaiveDate,
}

impl DayKey {
    pub fn new(staff_id: StaffId, date: NaiveDate) -> Self {
        Self { staff_id, date }
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.staff_id, self.date)
    }
}

/// All appointments of a staff-day, terminal ones included.
#[derive(Debug, Clone)]
pub struct DayBook {
    pub key: DayKey,
    /// Sorted by `start`.
    pub appointments: Vec<Appointment>,
}

impl DayBook {
    pub fn new(key: DayKey) -> Self {
        Self {
            key,
            appointments: Vec::new(),
        }
    }

    /// Insert appointment maintaining sort order by start.
    pub fn insert_appointment(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .partition_point(|a| a.start <= appointment.start);
        self.appointments.insert(pos, appointment);
    }

    pub fn remove_appointment(&mut self, id: AppointmentId) -> Option<Appointment> {
        let pos = self.appointments.iter().position(|a| a.id == id)?;
        Some(self.appointments.remove(pos))
    }

    pub fn get(&self, id: AppointmentId) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    pub fn get_mut(&mut self, id: AppointmentId) -> Option<&mut Appointment> {
        self.appointments.iter_mut().find(|a| a.id == id)
    }

    /// Appointments whose span overlaps the query window, in start order.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Appointment> {
        // Everything at index >= right_bound starts at or after query.end.
        let right_bound = self.appointments.partition_point(|a| a.start < query.end);
        self.appointments[..right_bound]
            .iter()
            .filter(move |a| a.end() > query.start)
    }

    pub fn active(&self) -> impl Iterator<Item = &Appointment> {
        self.appointments.iter().filter(|a| a.is_active())
    }
}

/// Everything the availability rules need to know about one staff member.
#[derive(Debug, Clone)]
pub struct StaffCalendar {
    pub schedule: StaffSchedule,
    /// At most one override per date; a newer write replaces the older one.
    pub overrides: BTreeMap<NaiveDate, AvailabilityOverride>,
    pub time_off: Vec<TimeOffSpan>,
}

impl StaffCalendar {
    pub fn new(schedule: StaffSchedule) -> Self {
        Self {
            schedule,
            overrides: BTreeMap::new(),
            time_off: Vec::new(),
        }
    }

    pub fn override_on(&self, date: NaiveDate) -> Option<&AvailabilityOverride> {
        self.overrides.get(&date)
    }

    pub fn approved_time_off_on(&self, date: NaiveDate) -> Option<&TimeOffSpan> {
        self.time_off.iter().find(|t| t.blocks(date))
    }

    pub fn works_on(&self, date: NaiveDate) -> bool {
        self.schedule.working_days.contains(date.weekday())
    }
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    StaffUpserted {
        schedule: StaffSchedule,
    },
    StaffStatusChanged {
        staff_id: StaffId,
        status: StaffStatus,
    },
    OverrideSet {
        entry: AvailabilityOverride,
    },
    OverrideCleared {
        staff_id: StaffId,
        date: NaiveDate,
    },
    TimeOffAdded {
        span: TimeOffSpan,
    },
    TimeOffReviewed {
        id: TimeOffId,
        staff_id: StaffId,
        status: TimeOffStatus,
    },
    AppointmentBooked {
        appointment: Appointment,
    },
    AppointmentMoved {
        id: AppointmentId,
        from: DayKey,
        to: DayKey,
        start: Minute,
    },
    AppointmentStatusChanged {
        id: AppointmentId,
        key: DayKey,
        status: AppointmentStatus,
    },
}
