//! [`EntityPlatform`] – registry of the sensors of one config entry.
//!
//! The platform turns coordinator snapshots into [`RoadSensor`]s, groups them
//! under devices and subscribes each one to the coordinator.  It is itself a
//! [`DataListener`]: road items that show up in a later refresh get their
//! sensors on the spot.  Sensors are never removed while the entry is loaded.
//!
//! # Identity collisions
//!
//! When one snapshot holds several records with the same identity, the last
//! one wins and a warning is logged.  Sensors read their item with the same
//! rule.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use inforoute_runtime::{Coordinator, DataListener, ListenerId};
use inforoute_types::RoadItem;
use tracing::{debug, info, warn};

use crate::config_entry::EntityLayout;
use crate::entity::{DeviceInfo, Projection};
use crate::sensor::{ProjectionKind, RoadSensor};

#[derive(Default)]
struct Registry {
    /// Keyed by unique id.
    sensors: BTreeMap<String, Arc<RoadSensor>>,
    /// Keyed by device id.
    devices: BTreeMap<String, DeviceInfo>,
    subscriptions: Vec<ListenerId>,
}

/// Sensor and device registry for one config entry.
pub struct EntityPlatform {
    coordinator: Arc<Coordinator>,
    layout: EntityLayout,
    registry: Mutex<Registry>,
}

impl EntityPlatform {
    pub fn new(coordinator: Arc<Coordinator>, layout: EntityLayout) -> Self {
        Self {
            coordinator,
            layout,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Register sensors for every identity of the current snapshot that has
    /// none yet.  Returns the number of sensors created.
    pub fn sync(&self) -> usize {
        let snapshot = self.coordinator.snapshot();
        let mut registry = self.lock_registry();
        let mut added = 0;

        for (identity, item) in unique_items(&snapshot) {
            for &kind in ProjectionKind::for_layout(self.layout) {
                let unique_id = kind.unique_id(identity);
                if registry.sensors.contains_key(&unique_id) {
                    continue;
                }
                let sensor = Arc::new(RoadSensor::new(
                    Arc::clone(&self.coordinator),
                    kind,
                    identity,
                    item.clone(),
                ));
                let weak: Weak<RoadSensor> = Arc::downgrade(&sensor);
                let id = self.coordinator.subscribe(weak);
                registry.subscriptions.push(id);

                if let Some(device) = sensor.device() {
                    registry
                        .devices
                        .entry(device.id().to_string())
                        .or_insert(device);
                }
                debug!(entity = %unique_id, "sensor registered");
                registry.sensors.insert(unique_id, sensor);
                added += 1;
            }
        }
        added
    }

    /// All sensors, ordered by unique id.
    pub fn sensors(&self) -> Vec<Arc<RoadSensor>> {
        self.lock_registry().sensors.values().cloned().collect()
    }

    pub fn sensor(&self, unique_id: &str) -> Option<Arc<RoadSensor>> {
        self.lock_registry().sensors.get(unique_id).cloned()
    }

    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.lock_registry().devices.values().cloned().collect()
    }

    /// Sensors grouped under `device_id`.
    pub fn sensors_for_device(&self, device_id: &str) -> Vec<Arc<RoadSensor>> {
        self.lock_registry()
            .sensors
            .values()
            .filter(|sensor| {
                sensor
                    .device()
                    .is_some_and(|device| device.id() == device_id)
            })
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock_registry().sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unsubscribe every sensor from the coordinator.  The sensors stay in
    /// the registry and keep their last values.
    pub fn detach(&self) {
        let subscriptions = std::mem::take(&mut self.lock_registry().subscriptions);
        for id in subscriptions {
            self.coordinator.unsubscribe(id);
        }
    }

    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DataListener for EntityPlatform {
    fn on_data_updated(&self) {
        let added = self.sync();
        if added > 0 {
            info!(added, "registered sensors for new road items");
        }
    }
}

/// One record per identity, in first-seen order, the last record winning.
/// Records without any identity are skipped.
fn unique_items(snapshot: &[RoadItem]) -> Vec<(&str, &RoadItem)> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut items: Vec<(&str, &RoadItem)> = Vec::with_capacity(snapshot.len());

    for item in snapshot {
        let Some(identity) = item.identity() else {
            warn!(lib = ?item.lib, "road item has neither tifid nor pid; no sensor created");
            continue;
        };
        match positions.get(identity) {
            Some(&position) => {
                warn!(identity, "duplicate road item identity; keeping the last record");
                items[position] = (identity, item);
            }
            None => {
                positions.insert(identity, items.len());
                items.push((identity, item));
            }
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedFeed, coordinator, road};

    #[tokio::test]
    async fn specialized_layout_creates_three_sensors_per_item() {
        let feed = ScriptedFeed::new(vec![Ok(vec![
            road("T1", "Col X", "FF0000", "Route Y"),
            road("T2", "Col Z", "00FF00", "Route W"),
        ])]);
        let coord = coordinator(feed);
        coord.first_refresh().await.unwrap();

        let platform = EntityPlatform::new(coord.clone(), EntityLayout::Specialized);
        assert_eq!(platform.sync(), 6);
        assert_eq!(platform.len(), 6);
        assert_eq!(platform.devices().len(), 2);
        assert_eq!(platform.sensors_for_device("inforoute65_T1").len(), 3);
        assert_eq!(coord.listener_count(), 6);

        assert_eq!(platform.sync(), 0, "sync is idempotent");
    }

    #[tokio::test]
    async fn combined_layout_creates_one_sensor_per_item() {
        let feed = ScriptedFeed::new(vec![Ok(vec![road("T1", "Col X", "FF0000", "Route Y")])]);
        let coord = coordinator(feed);
        coord.first_refresh().await.unwrap();

        let platform = EntityPlatform::new(coord, EntityLayout::Combined);
        assert_eq!(platform.sync(), 1);
        let sensor = platform.sensor("inforoute65_T1").unwrap();
        assert_eq!(sensor.kind(), ProjectionKind::Section);
    }

    #[tokio::test]
    async fn duplicate_identity_keeps_last_record() {
        let feed = ScriptedFeed::new(vec![Ok(vec![
            road("T1", "Col X", "FF0000", "Route Y"),
            road("T1", "Col X bis", "00FF00", "Route Y"),
        ])]);
        let coord = coordinator(feed);
        coord.first_refresh().await.unwrap();

        let platform = EntityPlatform::new(coord, EntityLayout::Specialized);
        assert_eq!(platform.sync(), 3);
        let circulation = platform.sensor("inforoute65_T1_circulation").unwrap();
        assert_eq!(circulation.state().as_deref(), Some("Circulation normale"));
        assert_eq!(platform.devices()[0].name, "Col X bis");
    }

    #[tokio::test]
    async fn items_without_identity_get_no_sensor() {
        let anonymous = RoadItem {
            lib: Some("Nowhere".into()),
            ..RoadItem::default()
        };
        let feed = ScriptedFeed::new(vec![Ok(vec![anonymous])]);
        let coord = coordinator(feed);
        coord.first_refresh().await.unwrap();

        let platform = EntityPlatform::new(coord.clone(), EntityLayout::Specialized);
        assert_eq!(platform.sync(), 0);
        assert!(platform.is_empty());
        assert_eq!(coord.snapshot().len(), 1, "the snapshot itself keeps the record");
    }

    #[tokio::test]
    async fn new_items_are_registered_and_old_ones_kept() {
        let feed = ScriptedFeed::new(vec![
            Ok(vec![road("T1", "Col X", "FF0000", "Route Y")]),
            Ok(vec![road("T2", "Col Z", "00FF00", "Route W")]),
        ]);
        let coord = coordinator(feed);
        coord.first_refresh().await.unwrap();

        let platform = Arc::new(EntityPlatform::new(coord.clone(), EntityLayout::Specialized));
        platform.sync();
        let weak: Weak<EntityPlatform> = Arc::downgrade(&platform);
        coord.subscribe(weak);

        coord.request_refresh().await;
        assert_eq!(platform.len(), 6);
        let old = platform.sensor("inforoute65_T1_location").unwrap();
        assert_eq!(old.state().as_deref(), Some("Route Y"));
        assert!(old.is_stale());
        let new = platform.sensor("inforoute65_T2_location").unwrap();
        assert_eq!(new.state().as_deref(), Some("Route W"));
    }

    #[tokio::test]
    async fn detach_unsubscribes_every_sensor() {
        let feed = ScriptedFeed::new(vec![Ok(vec![road("T1", "Col X", "FF0000", "Route Y")])]);
        let coord = coordinator(feed);
        coord.first_refresh().await.unwrap();

        let platform = EntityPlatform::new(coord.clone(), EntityLayout::Specialized);
        platform.sync();
        assert_eq!(coord.listener_count(), 3);
        platform.detach();
        assert_eq!(coord.listener_count(), 0);
        assert_eq!(platform.len(), 3);
    }
}
