//! Manual refresh button.

use std::sync::Arc;

use inforoute_runtime::{Coordinator, RefreshOutcome};
use tracing::{info, instrument};

use crate::config_entry::DEFAULT_NAME;
use crate::entity::{DeviceInfo, Projection};

const NAME: &str = "Actualiser";

/// Triggers an out-of-schedule refresh of the entry's coordinator.
pub struct RefreshButton {
    coordinator: Arc<Coordinator>,
    entry_id: String,
    unique_id: String,
}

impl RefreshButton {
    pub fn new(coordinator: Arc<Coordinator>, entry_id: impl Into<String>) -> Self {
        let entry_id = entry_id.into();
        Self {
            coordinator,
            unique_id: format!("{entry_id}_force_refresh"),
            entry_id,
        }
    }

    /// Ask the coordinator for a refresh.  Presses during an in-flight
    /// refresh coalesce into it.
    #[instrument(name = "button.press", skip(self), fields(entry = %self.entry_id))]
    pub async fn press(&self) -> RefreshOutcome {
        info!("manual refresh requested");
        self.coordinator.request_refresh().await
    }
}

impl Projection for RefreshButton {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> String {
        NAME.to_string()
    }

    fn state(&self) -> Option<String> {
        None
    }

    fn icon(&self) -> Option<&'static str> {
        Some("mdi:refresh")
    }

    fn device(&self) -> Option<DeviceInfo> {
        Some(DeviceInfo::new(self.entry_id.clone(), DEFAULT_NAME))
    }
}
