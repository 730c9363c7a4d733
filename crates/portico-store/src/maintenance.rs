//! Maintenance store: cost tracking over the generic engine
//!
//! Recording an actual cost compares it against the estimate and flags the
//! request when the overrun crosses the configured threshold. The flag is
//! advisory; the write goes through either way.

use chrono::NaiveDate;
use portico_domain::{EntityId, MaintenancePatch, MaintenanceRequest, Priority, StatusMachine};
use tracing::warn;

use crate::engine::EntityStore;
use crate::error::Result;

/// The store for [`MaintenanceRequest`] records.
pub type MaintenanceStore = EntityStore<MaintenanceRequest>;

/// Which cost figure an update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostKind {
    Estimate,
    Actual,
}

/// Overrun report returned alongside a successful cost write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostOverrun {
    pub percentage: f64,
    /// True when the overrun crosses the configured threshold.
    pub flagged: bool,
}

impl EntityStore<MaintenanceRequest> {
    /// Record a cost figure. Returns the overrun report when both estimate
    /// and actual are known after the write.
    pub fn update_cost(
        &mut self,
        id: EntityId,
        kind: CostKind,
        amount: f64,
    ) -> Result<Option<CostOverrun>> {
        let patch = match kind {
            CostKind::Estimate => MaintenancePatch {
                cost_estimate: Some(amount),
                ..Default::default()
            },
            CostKind::Actual => MaintenancePatch {
                actual_cost: Some(amount),
                ..Default::default()
            },
        };
        self.update(id, patch, None)?;

        let threshold = self.config().cost_overrun_threshold_pct;
        let Some(request) = self.get(id) else {
            return Ok(None);
        };
        let Some(percentage) = request.overrun_percentage() else {
            return Ok(None);
        };
        let flagged = percentage > threshold;
        if flagged {
            warn!(
                request = %id,
                overrun_pct = percentage,
                threshold_pct = threshold,
                "maintenance cost overrun"
            );
        }
        Ok(Some(CostOverrun { percentage, flagged }))
    }

    /// Requests whose actual cost exceeds estimate by more than the
    /// configured threshold.
    pub fn cost_overruns(&self) -> Vec<(&MaintenanceRequest, f64)> {
        let threshold = self.config().cost_overrun_threshold_pct;
        self.records()
            .iter()
            .filter_map(|request| {
                request
                    .overrun_percentage()
                    .filter(|pct| *pct > threshold)
                    .map(|pct| (request, pct))
            })
            .collect()
    }

    /// Open requests whose scheduled date has passed.
    pub fn overdue(&self, today: NaiveDate) -> Vec<&MaintenanceRequest> {
        self.records()
            .iter()
            .filter(|request| {
                !request.status.is_terminal()
                    && request
                        .scheduled_date
                        .map_or(false, |scheduled| scheduled < today)
            })
            .collect()
    }

    pub fn requests_by_priority(&self, priority: Priority) -> Vec<&MaintenanceRequest> {
        self.records()
            .iter()
            .filter(|request| request.priority == priority)
            .collect()
    }

    pub fn requests_by_property(&self, property_id: &str) -> Vec<&MaintenanceRequest> {
        self.records()
            .iter()
            .filter(|request| request.property_id == property_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::engine::NoHooks;
    use crate::storage::MemoryStorage;
    use crate::sync::MemoryBus;
    use portico_domain::{MaintenanceDraft, MaintenanceStatus};
    use std::sync::Arc;

    fn open_store() -> MaintenanceStore {
        let storage = Arc::new(MemoryStorage::new());
        let bus = Arc::new(MemoryBus::new());
        EntityStore::open(storage, bus, StoreConfig::default(), Box::new(NoHooks)).unwrap()
    }

    fn request(store: &mut MaintenanceStore, estimate: Option<f64>) -> EntityId {
        store
            .create(MaintenanceDraft {
                property_id: "p1".into(),
                title: "Leaking faucet".into(),
                description: "Unit 4B kitchen".into(),
                priority: Priority::Medium,
                scheduled_date: None,
                cost_estimate: estimate,
            })
            .unwrap()
    }

    #[test]
    fn overrun_above_threshold_is_flagged() {
        let mut store = open_store();
        let id = request(&mut store, Some(1000.0));

        // 25% over the 20% default threshold
        let overrun = store
            .update_cost(id, CostKind::Actual, 1250.0)
            .unwrap()
            .unwrap();
        assert!((overrun.percentage - 25.0).abs() < 1e-9);
        assert!(overrun.flagged);
    }

    #[test]
    fn overrun_below_threshold_is_reported_unflagged() {
        let mut store = open_store();
        let id = request(&mut store, Some(1000.0));

        let overrun = store
            .update_cost(id, CostKind::Actual, 1150.0)
            .unwrap()
            .unwrap();
        assert!((overrun.percentage - 15.0).abs() < 1e-9);
        assert!(!overrun.flagged);
    }

    #[test]
    fn no_report_without_an_estimate() {
        let mut store = open_store();
        let id = request(&mut store, None);

        let report = store.update_cost(id, CostKind::Actual, 500.0).unwrap();
        assert!(report.is_none());
        assert_eq!(store.get(id).unwrap().actual_cost, Some(500.0));
    }

    #[test]
    fn cost_overruns_lists_only_flagged_requests() {
        let mut store = open_store();
        let over = request(&mut store, Some(100.0));
        let under = request(&mut store, Some(100.0));
        store.update_cost(over, CostKind::Actual, 150.0).unwrap();
        store.update_cost(under, CostKind::Actual, 105.0).unwrap();

        let overruns = store.cost_overruns();
        assert_eq!(overruns.len(), 1);
        assert_eq!(overruns[0].0.id, over);
    }

    #[test]
    fn overdue_skips_terminal_requests() {
        let mut store = open_store();
        let date = chrono::NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        let today = chrono::NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();

        let open = store
            .create(MaintenanceDraft {
                property_id: "p1".into(),
                title: "open".into(),
                description: String::new(),
                priority: Priority::Low,
                scheduled_date: Some(date),
                cost_estimate: None,
            })
            .unwrap();
        let cancelled = store
            .create(MaintenanceDraft {
                property_id: "p1".into(),
                title: "cancelled".into(),
                description: String::new(),
                priority: Priority::Low,
                scheduled_date: Some(date),
                cost_estimate: None,
            })
            .unwrap();
        store
            .transition(cancelled, MaintenanceStatus::Cancelled)
            .unwrap();

        let overdue = store.overdue(today);
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, open);
    }

    #[test]
    fn completed_is_terminal() {
        assert!(MaintenanceStatus::Completed.is_terminal());
        assert!(MaintenanceStatus::Cancelled.is_terminal());
        assert!(!MaintenanceStatus::InProgress.is_terminal());
    }
}
