//! Hard caps applied to every tenant.

pub const MAX_TENANTS: usize = 1024;
pub const MAX_TENANT_NAME_LEN: usize = 128;

pub const MAX_STAFF_PER_TENANT: usize = 10_000;
pub const MAX_APPOINTMENTS_PER_DAY: usize = 512;
pub const MAX_OVERRIDES_PER_STAFF: usize = 4_096;
pub const MAX_TIME_OFF_PER_STAFF: usize = 1_024;

pub const MAX_LINE_ITEMS: usize = 32;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_REASON_LEN: usize = 1_024;

/// Widest time-off span accepted, in days.
pub const MAX_TIME_OFF_DAYS: i64 = 366;
