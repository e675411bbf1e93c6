//! Config entry lifecycle: set up, reconfigure, unload.
//!
//! [`Integration::setup_entry`] builds the coordinator, runs the first
//! refresh (fatal on failure), registers the sensors and the refresh button
//! and starts the interval timer.  [`Integration::unload_entry`] undoes all of
//! it.

use std::sync::{Arc, Weak};

use inforoute_middleware::{EventBus, HttpFeed, RoadFeed, Topic};
use inforoute_runtime::{Coordinator, ListenerId};
use inforoute_types::{Event, EventPayload, SetupError};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::button::RefreshButton;
use crate::config_entry::{ConfigEntry, ConfigError, DEFAULT_NAME, EntryOptions};
use crate::platform::EntityPlatform;

const EVENT_SOURCE: &str = "inforoute-integration";

/// Domain-level setup.  Everything lives in config entries, so there is
/// nothing to do here.
pub fn setup() -> bool {
    true
}

/// A loaded config entry.
pub struct Integration {
    entry: ConfigEntry,
    coordinator: Arc<Coordinator>,
    platform: Arc<EntityPlatform>,
    button: RefreshButton,
    platform_listener: ListenerId,
    schedule: Option<JoinHandle<()>>,
}

impl Integration {
    /// Set up `entry` against the HTTP feed at `entry.api_url`.
    ///
    /// # Errors
    ///
    /// [`SetupError::FirstRefresh`] when the HTTP client cannot be built or
    /// the first fetch fails.
    pub async fn setup_entry(entry: ConfigEntry, bus: EventBus) -> Result<Self, SetupError> {
        let feed = HttpFeed::new(entry.api_url.clone()).map_err(SetupError::FirstRefresh)?;
        Self::setup_entry_with_feed(entry, Arc::new(feed), bus).await
    }

    /// Set up `entry` against an arbitrary feed.
    #[instrument(name = "integration.setup_entry", skip_all, fields(entry = %entry.entry_id))]
    pub async fn setup_entry_with_feed(
        entry: ConfigEntry,
        feed: Arc<dyn RoadFeed>,
        bus: EventBus,
    ) -> Result<Self, SetupError> {
        let coordinator = Arc::new(Coordinator::new(
            format!("{DEFAULT_NAME} Coordinator"),
            feed,
            entry.options.update_interval(),
            bus,
        ));

        if let Err(e) = coordinator.first_refresh().await {
            warn!(error = %e, "config entry not loaded");
            return Err(e);
        }

        let platform = Arc::new(EntityPlatform::new(Arc::clone(&coordinator), entry.layout));
        platform.sync();
        let weak: Weak<EntityPlatform> = Arc::downgrade(&platform);
        let platform_listener = coordinator.subscribe(weak);

        let button = RefreshButton::new(Arc::clone(&coordinator), entry.entry_id.clone());
        let schedule = coordinator.start();

        let entities = platform.len() + 1;
        info!(
            items = coordinator.snapshot().len(),
            entities,
            scan_interval = entry.options.scan_interval(),
            "config entry loaded"
        );
        publish(
            coordinator.bus(),
            EventPayload::EntryLoaded {
                entry_id: entry.entry_id.clone(),
                entities,
            },
        );

        Ok(Self {
            entry,
            coordinator,
            platform,
            button,
            platform_listener,
            schedule: Some(schedule),
        })
    }

    pub fn entry(&self) -> &ConfigEntry {
        &self.entry
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn platform(&self) -> &Arc<EntityPlatform> {
        &self.platform
    }

    pub fn button(&self) -> &RefreshButton {
        &self.button
    }

    /// Apply new options.  The timer picks the new interval up immediately.
    pub fn update_options(&mut self, options: EntryOptions) {
        self.entry.options = options;
        self.coordinator.set_update_interval(options.update_interval());
    }

    /// Validate and apply a new scan interval (minutes).
    pub fn update_scan_interval(&mut self, minutes: u32) -> Result<(), ConfigError> {
        let options = EntryOptions::new(minutes)?;
        self.update_options(options);
        Ok(())
    }

    /// Stop the timer, detach every entity and release the coordinator.
    ///
    /// A fetch in flight is allowed to finish or time out first.  Returns
    /// `false` if the timer task did not end cleanly.
    #[instrument(name = "integration.unload_entry", skip_all, fields(entry = %self.entry.entry_id))]
    pub async fn unload_entry(mut self) -> bool {
        self.coordinator.shutdown();
        let stopped = match self.schedule.take() {
            Some(schedule) => match schedule.await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "refresh schedule ended abnormally");
                    false
                }
            },
            None => true,
        };

        self.coordinator.unsubscribe(self.platform_listener);
        self.platform.detach();
        self.coordinator.clear_listeners();
        debug!("listeners cleared");

        publish(
            self.coordinator.bus(),
            EventPayload::EntryUnloaded {
                entry_id: self.entry.entry_id.clone(),
            },
        );
        info!("config entry unloaded");
        stopped
    }
}

impl Drop for Integration {
    fn drop(&mut self) {
        self.coordinator.shutdown();
    }
}

fn publish(bus: &EventBus, payload: EventPayload) {
    if let Err(e) = bus.publish_to(Topic::Lifecycle, Event::new(EVENT_SOURCE, payload)) {
        debug!(error = %e, "lifecycle event not delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_entry::EntityLayout;
    use crate::entity::Projection;
    use crate::test_support::{ScriptedFeed, road};
    use inforoute_middleware::parse_feed;
    use inforoute_runtime::RefreshOutcome;
    use inforoute_types::FetchError;
    use std::time::Duration;

    const SCENARIO: &str = r#"{"OI":[{"pid":"1","tifid":"T1","lib":"Col X","color":"FF0000","type_geom":"LINE","address":"Route Y","lat":43.1,"lng":0.1}]}"#;

    fn entry() -> ConfigEntry {
        ConfigEntry::new("entry-1", EntryOptions::default()).unwrap()
    }

    #[test]
    fn domain_setup_always_succeeds() {
        assert!(setup());
    }

    #[tokio::test]
    async fn setup_entry_exposes_scenario() {
        let feed = ScriptedFeed::new(vec![Ok(parse_feed(SCENARIO.as_bytes()).unwrap())]);
        let bus = EventBus::default();
        let mut lifecycle = bus.subscribe_to(Topic::Lifecycle);

        let integration = Integration::setup_entry_with_feed(entry(), feed, bus)
            .await
            .unwrap();

        let platform = integration.platform();
        assert_eq!(platform.len(), 3);
        let circulation = platform.sensor("inforoute65_T1_circulation").unwrap();
        assert_eq!(circulation.state().as_deref(), Some("Circulation difficile"));
        let location = platform.sensor("inforoute65_T1_location").unwrap();
        assert_eq!(location.state().as_deref(), Some("Route Y"));
        assert_eq!(integration.button().unique_id(), "entry-1_force_refresh");
        assert_eq!(integration.coordinator().name(), "Inforoute 65 Coordinator");

        let event = lifecycle.recv().await.unwrap();
        assert!(matches!(
            event.payload,
            EventPayload::EntryLoaded { entities: 4, .. }
        ));
        assert!(integration.unload_entry().await);
    }

    #[tokio::test]
    async fn setup_entry_fails_when_first_refresh_fails() {
        let feed = ScriptedFeed::new(vec![Err(FetchError::Timeout { millis: 10_000 })]);
        let result = Integration::setup_entry_with_feed(entry(), feed, EventBus::default()).await;
        assert!(matches!(
            result,
            Err(SetupError::FirstRefresh(FetchError::Timeout { .. }))
        ));
    }

    #[tokio::test]
    async fn button_press_refreshes_and_updates_sensors() {
        let feed = ScriptedFeed::new(vec![
            Ok(vec![road("T1", "Col X", "FF0000", "Route Y")]),
            Ok(vec![road("T1", "Col X", "00FF00", "Route Y")]),
        ]);
        let integration = Integration::setup_entry_with_feed(entry(), feed.clone(), EventBus::default())
            .await
            .unwrap();

        assert_eq!(
            integration.button().press().await,
            RefreshOutcome::Refreshed { items: 1 }
        );
        assert_eq!(feed.calls(), 2);
        let circulation = integration
            .platform()
            .sensor("inforoute65_T1_circulation")
            .unwrap();
        assert_eq!(circulation.state().as_deref(), Some("Circulation normale"));
        integration.unload_entry().await;
    }

    #[tokio::test]
    async fn failed_refresh_keeps_sensors_available() {
        let feed = ScriptedFeed::new(vec![
            Ok(vec![road("T1", "Col X", "FF0000", "Route Y")]),
            Err(FetchError::Status(502)),
        ]);
        let integration = Integration::setup_entry_with_feed(entry(), feed, EventBus::default())
            .await
            .unwrap();

        let outcome = integration.button().press().await;
        assert_eq!(outcome, RefreshOutcome::Failed(FetchError::Status(502)));
        let location = integration
            .platform()
            .sensor("inforoute65_T1_location")
            .unwrap();
        assert_eq!(location.state().as_deref(), Some("Route Y"));
        assert!(location.is_stale());
        integration.unload_entry().await;
    }

    #[tokio::test]
    async fn combined_layout_entry() {
        let feed = ScriptedFeed::new(vec![Ok(vec![road("T1", "Col X", "ff0000", "Route Y")])]);
        let entry = entry().with_layout(EntityLayout::Combined);
        let integration = Integration::setup_entry_with_feed(entry, feed, EventBus::default())
            .await
            .unwrap();
        assert_eq!(integration.platform().len(), 1);
        let section = integration.platform().sensor("inforoute65_T1").unwrap();
        assert_eq!(section.state().as_deref(), Some("FF0000"));
        integration.unload_entry().await;
    }

    #[tokio::test]
    async fn options_update_changes_interval() {
        let feed = ScriptedFeed::new(vec![Ok(vec![road("T1", "Col X", "FF0000", "Route Y")])]);
        let mut integration = Integration::setup_entry_with_feed(entry(), feed, EventBus::default())
            .await
            .unwrap();
        assert_eq!(
            integration.coordinator().update_interval(),
            Duration::from_secs(600)
        );

        integration.update_scan_interval(30).unwrap();
        assert_eq!(integration.entry().options.scan_interval(), 30);
        assert_eq!(
            integration.coordinator().update_interval(),
            Duration::from_secs(1800)
        );

        assert!(integration.update_scan_interval(5).is_err());
        assert_eq!(integration.entry().options.scan_interval(), 30);
        integration.unload_entry().await;
    }

    #[tokio::test]
    async fn unload_stops_timer_and_clears_listeners() {
        let feed = ScriptedFeed::new(vec![Ok(vec![road("T1", "Col X", "FF0000", "Route Y")])]);
        let bus = EventBus::default();
        let integration = Integration::setup_entry_with_feed(entry(), feed, bus.clone())
            .await
            .unwrap();
        let coordinator = Arc::clone(integration.coordinator());
        assert_eq!(coordinator.listener_count(), 4);

        let mut lifecycle = bus.subscribe_to(Topic::Lifecycle);
        assert!(integration.unload_entry().await);

        assert!(coordinator.is_shut_down());
        assert_eq!(coordinator.listener_count(), 0);
        let event = lifecycle.recv().await.unwrap();
        assert!(matches!(event.payload, EventPayload::EntryUnloaded { .. }));
    }
}
