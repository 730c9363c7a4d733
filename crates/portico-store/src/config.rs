//! Configuration for the portico stores

use portico_domain::ActorId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Store-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Identity of this execution context ("tab") on the sync channels.
    /// Broadcasts are tagged with it so a tab never merges its own echoes,
    /// matching how browser storage events skip the originating document.
    pub tab_id: Uuid,
    /// Actor id recorded on every mutation. A fixed current-user until an
    /// authentication layer exists.
    pub actor: ActorId,
    /// Active leases ending within this many days are flagged as expiring.
    pub expiring_threshold_days: i64,
    /// Actual cost exceeding the estimate by more than this percentage is
    /// flagged as an overrun.
    pub cost_overrun_threshold_pct: f64,
    /// Retry cap for the pending-operation sweep.
    pub max_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            tab_id: Uuid::new_v4(),
            actor: "current-user".into(),
            expiring_threshold_days: 60,
            cost_overrun_threshold_pct: 20.0,
            max_retries: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.actor, "current-user");
        assert_ne!(config.tab_id, StoreConfig::default().tab_id);
        assert_eq!(config.expiring_threshold_days, 60);
        assert_eq!(config.cost_overrun_threshold_pct, 20.0);
        assert_eq!(config.max_retries, 3);
    }
}
