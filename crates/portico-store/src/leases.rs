//! Lease store: expiry sweeps over the generic engine
//!
//! The sweep walks active leases against today's date and moves anything
//! inside the configured expiring window (or already past its end date)
//! along the status machine. Each moved lease goes through the normal
//! transition path, so sweeps are versioned and audited like any other
//! mutation.

use chrono::NaiveDate;
use portico_domain::{EntityId, Lease, LeaseStatus};
use tracing::info;

use crate::engine::EntityStore;
use crate::error::Result;

/// The store for [`Lease`] records.
pub type LeaseStore = EntityStore<Lease>;

/// Counts from one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub marked_expiring: usize,
    pub marked_expired: usize,
}

impl EntityStore<Lease> {
    /// Sweep lease statuses against `today`. Active leases within the
    /// configured window of their end date become Expiring; Active or
    /// Expiring leases past their end date become Expired.
    pub fn sweep_expiry(&mut self, today: NaiveDate) -> Result<SweepOutcome> {
        let threshold = self.config().expiring_threshold_days;
        let mut outcome = SweepOutcome::default();

        let due: Vec<(EntityId, LeaseStatus)> = self
            .records()
            .iter()
            .filter_map(|lease| {
                let remaining = lease.days_until_end(today);
                match lease.status {
                    LeaseStatus::Active | LeaseStatus::Expiring if remaining < 0 => {
                        Some((lease.id, LeaseStatus::Expired))
                    }
                    LeaseStatus::Active if remaining <= threshold => {
                        Some((lease.id, LeaseStatus::Expiring))
                    }
                    _ => None,
                }
            })
            .collect();

        for (id, target) in due {
            self.transition(id, target)?;
            match target {
                LeaseStatus::Expired => outcome.marked_expired += 1,
                _ => outcome.marked_expiring += 1,
            }
        }
        if outcome != SweepOutcome::default() {
            info!(
                expiring = outcome.marked_expiring,
                expired = outcome.marked_expired,
                "lease expiry sweep"
            );
        }
        Ok(outcome)
    }

    /// Leases ending within `days` of `today`, soonest first. Includes
    /// already-expired leases (negative remaining days).
    pub fn expiring_within(&self, today: NaiveDate, days: i64) -> Vec<&Lease> {
        let mut leases: Vec<&Lease> = self
            .records()
            .iter()
            .filter(|lease| {
                lease.status != LeaseStatus::Renewed && lease.days_until_end(today) <= days
            })
            .collect();
        leases.sort_by_key(|lease| lease.end_date);
        leases
    }

    pub fn leases_by_property(&self, property_id: &str) -> Vec<&Lease> {
        self.records()
            .iter()
            .filter(|lease| lease.property_id == property_id)
            .collect()
    }
}
