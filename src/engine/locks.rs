use std::sync::Arc;

use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, warn};

use crate::model::{AppointmentId, DayBook, DayKey};

use super::{Engine, EngineError, SharedDay};

pub(super) type DayGuard = OwnedRwLockWriteGuard<DayBook>;

impl Engine {
    /// Get or create the lockable state of one staff-day.
    pub(super) fn day_entry(&self, key: DayKey) -> SharedDay {
        self.days
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(DayBook::new(key))))
            .clone()
    }

    /// Enter the exclusive section of every staff-day in `keys`.
    ///
    /// Guards are taken in sorted key order so two movers never deadlock.
    /// Each attempt waits at most `lock_wait` per day; between attempts all
    /// guards are released and the backoff doubles. Returned guards follow
    /// the sorted, deduplicated key order.
    pub(super) async fn lock_days(&self, keys: &[DayKey]) -> Result<Vec<DayGuard>, EngineError> {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        let attempts = self.config.lock_attempts.max(1);
        let mut backoff = self.config.lock_backoff;
        let Some(&first) = keys.first() else {
            return Ok(Vec::new());
        };
        let mut busy = first;

        for attempt in 1..=attempts {
            match self.try_lock_all(&keys).await {
                Ok(guards) => return Ok(guards),
                Err(key) => {
                    busy = key;
                    metrics::counter!(crate::observability::LOCK_CONTENTION_TOTAL).increment(1);
                    debug!("staff-day {key} busy (attempt {attempt}/{attempts})");
                }
            }
            if attempt < attempts {
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }

        warn!("gave up on staff-day {busy} after {attempts} attempts");
        Err(EngineError::Contention {
            staff_id: busy.staff_id,
            date: busy.date,
        })
    }

    /// Lock the staff-day holding appointment `id`, together with `extra`.
    ///
    /// The appointment can move while we wait for the guards; in that case
    /// the guards are dropped and the lookup starts over.
    pub(super) async fn lock_appointment_day(
        &self,
        id: AppointmentId,
        extra: Option<DayKey>,
    ) -> Result<(DayKey, Vec<DayGuard>), EngineError> {
        let mut last = None;
        for _ in 0..self.config.lock_attempts.max(1) {
            let from = self
                .day_for_appointment(&id)
                .ok_or(EngineError::NotFound(id))?;
            let mut keys = vec![from];
            keys.extend(extra);
            let guards = self.lock_days(&keys).await?;
            if self.day_for_appointment(&id) == Some(from) {
                return Ok((from, guards));
            }
            debug!("appointment {id} moved away from {from} while locking");
            last = Some(from);
        }
        let busy = last.ok_or(EngineError::NotFound(id))?;
        Err(EngineError::Contention {
            staff_id: busy.staff_id,
            date: busy.date,
        })
    }

    async fn try_lock_all(&self, keys: &[DayKey]) -> Result<Vec<DayGuard>, DayKey> {
        let mut guards = Vec::with_capacity(keys.len());
        for &key in keys {
            let day = self.day_entry(key);
            match tokio::time::timeout(self.config.lock_wait, day.write_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => return Err(key),
            }
        }
        Ok(guards)
    }
}
