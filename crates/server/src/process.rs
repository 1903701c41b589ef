//! Turning sync results into process actions

use tracing::{error, info, warn};

use crate::sync::{SyncError, SyncOutcome};

/// Lifecycle control of the hosting server process
pub trait ProcessControl: Send + Sync {
    /// Restart the process
    fn restart(&self);

    /// Wipe the node's data, then restart
    fn zap_and_restart(&self);

    /// Stop the process for good
    fn shutdown(&self, reason: &str);
}

/// Act on the result of a passive sync
pub fn handle_sync_result(result: Result<SyncOutcome, SyncError>, control: &dyn ProcessControl) {
    match result {
        Ok(SyncOutcome::Ok) => info!("Passive configuration is in sync with the active node"),
        Ok(SyncOutcome::RestartRequired) => {
            warn!("Restarting to run the configuration synced from the active node");
            control.restart();
        }
        Ok(SyncOutcome::DestructiveResetRequired) => {
            warn!("Wiping data and restarting to join the stripe with its history");
            control.zap_and_restart();
        }
        Err(e) => {
            error!("Passive sync failed: {}", e);
            control.shutdown(&e.to_string());
        }
    }
}
