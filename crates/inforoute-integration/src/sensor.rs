//! Road sensors: per-item views over the coordinator snapshot.
//!
//! Every [`RoadSensor`] is keyed by `(identity, kind)`.  On each data-changed
//! signal it looks its item up again in the snapshot; when the item has
//! disappeared it keeps showing the last values it saw.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use inforoute_runtime::{Coordinator, DataListener};
use inforoute_types::RoadItem;
use serde_json::Value;
use tracing::debug;

use crate::config_entry::{DOMAIN, EntityLayout};
use crate::entity::{Attributes, DeviceInfo, EntityCategory, Projection};

const UNKNOWN_ADDRESS: &str = "Adresse inconnue";
const UNKNOWN_IDENTIFIER: &str = "Identifiant inconnu";
const UNKNOWN_SECTION: &str = "Section de route inconnue";
const UNKNOWN_ROAD: &str = "Route Inforoute 65";

const MANUFACTURER: &str = "Ha-Py Region";
const MODEL: &str = "Inforoute Sensor";

/// Which facet of a road item a sensor shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProjectionKind {
    Circulation,
    Location,
    Diagnostics,
    /// Everything in one sensor; used by [`EntityLayout::Combined`].
    Section,
}

impl ProjectionKind {
    /// Kinds created for each road item under `layout`.
    pub fn for_layout(layout: EntityLayout) -> &'static [ProjectionKind] {
        match layout {
            EntityLayout::Specialized => &[
                ProjectionKind::Circulation,
                ProjectionKind::Location,
                ProjectionKind::Diagnostics,
            ],
            EntityLayout::Combined => &[ProjectionKind::Section],
        }
    }

    /// `inforoute65_<identity>[_<suffix>]`.
    pub fn unique_id(self, identity: &str) -> String {
        match self.suffix() {
            Some(suffix) => format!("{DOMAIN}_{identity}_{suffix}"),
            None => format!("{DOMAIN}_{identity}"),
        }
    }

    fn suffix(self) -> Option<&'static str> {
        match self {
            ProjectionKind::Circulation => Some("circulation"),
            ProjectionKind::Location => Some("location"),
            ProjectionKind::Diagnostics => Some("diagnostics"),
            ProjectionKind::Section => None,
        }
    }

    fn label(self) -> Option<&'static str> {
        match self {
            ProjectionKind::Circulation => Some("Circulation"),
            ProjectionKind::Location => Some("Localisation"),
            ProjectionKind::Diagnostics => Some("Diagnostic"),
            ProjectionKind::Section => None,
        }
    }
}

/// A sensor bound to one road item.
pub struct RoadSensor {
    kind: ProjectionKind,
    identity: String,
    unique_id: String,
    coordinator: Arc<Coordinator>,
    item: RwLock<RoadItem>,
    present: AtomicBool,
}

impl RoadSensor {
    /// `item` seeds the cache; later values come from the coordinator.
    pub fn new(
        coordinator: Arc<Coordinator>,
        kind: ProjectionKind,
        identity: impl Into<String>,
        item: RoadItem,
    ) -> Self {
        let identity = identity.into();
        Self {
            kind,
            unique_id: kind.unique_id(&identity),
            identity,
            coordinator,
            item: RwLock::new(item),
            present: AtomicBool::new(true),
        }
    }

    pub fn kind(&self) -> ProjectionKind {
        self.kind
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Copy of the cached road item.
    pub fn item(&self) -> RoadItem {
        self.read_item().clone()
    }

    /// `true` when the values shown did not come from a successful refresh
    /// that still contained this item.
    pub fn is_stale(&self) -> bool {
        !self.present.load(Ordering::Acquire) || self.coordinator.last_error().is_some()
    }

    fn read_item(&self) -> std::sync::RwLockReadGuard<'_, RoadItem> {
        self.item.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn base_name(item: &RoadItem) -> &str {
        item.lib.as_deref().unwrap_or(UNKNOWN_SECTION)
    }
}

impl DataListener for RoadSensor {
    fn on_data_updated(&self) {
        let snapshot = self.coordinator.snapshot();
        // Last record wins, like the platform's collision handling.
        let found = snapshot
            .iter()
            .rev()
            .find(|item| item.identity() == Some(self.identity.as_str()));

        match found {
            Some(item) => {
                let mut cached = self.item.write().unwrap_or_else(|poisoned| poisoned.into_inner());
                if *cached != *item {
                    *cached = item.clone();
                }
                self.present.store(true, Ordering::Release);
            }
            None => {
                if self.present.swap(false, Ordering::AcqRel) {
                    debug!(
                        entity = %self.unique_id,
                        "road item no longer in feed; keeping last-known values"
                    );
                }
            }
        }
    }
}

fn text(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}

fn coord(value: Option<f64>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

impl Projection for RoadSensor {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> String {
        let item = self.read_item();
        let base = Self::base_name(&item);
        match self.kind.label() {
            Some(label) => format!("{base} {label}"),
            None => base.to_string(),
        }
    }

    fn state(&self) -> Option<String> {
        let item = self.read_item();
        let state = match self.kind {
            ProjectionKind::Circulation => item.level().title.to_string(),
            ProjectionKind::Location => item
                .address
                .clone()
                .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string()),
            ProjectionKind::Diagnostics => item
                .tifid
                .clone()
                .unwrap_or_else(|| UNKNOWN_IDENTIFIER.to_string()),
            ProjectionKind::Section => item.color.as_deref().unwrap_or_default().to_uppercase(),
        };
        Some(state)
    }

    fn attributes(&self) -> Attributes {
        let item = self.read_item();
        let mut attributes = Attributes::new();
        match self.kind {
            ProjectionKind::Circulation => {
                let level = item.level();
                attributes.insert(
                    "level_color",
                    item.color
                        .as_deref()
                        .map(|c| Value::String(c.to_uppercase()))
                        .unwrap_or(Value::Null),
                );
                attributes.insert("level", Value::from(level.code));
                attributes.insert("level_title", Value::from(level.title));
            }
            ProjectionKind::Location => {
                attributes.insert("lat", coord(item.lat));
                attributes.insert("lng", coord(item.lng));
                attributes.insert("address", text(&item.address));
            }
            ProjectionKind::Diagnostics => {
                attributes.insert("tifid", text(&item.tifid));
                attributes.insert("equipment", text(&item.equipement));
                attributes.insert("poids", text(&item.poids));
            }
            ProjectionKind::Section => {
                attributes.insert("lib", text(&item.lib));
                attributes.insert("description", text(&item.description));
                attributes.insert("type_geom", text(&item.type_geom));
                attributes.insert("tifid", text(&item.tifid));
            }
        }
        attributes
    }

    fn icon(&self) -> Option<&'static str> {
        Some(match self.kind {
            ProjectionKind::Circulation => "mdi:traffic-light",
            ProjectionKind::Location => "mdi:map-marker",
            ProjectionKind::Diagnostics => "mdi:information-outline",
            ProjectionKind::Section => "mdi:road-variant",
        })
    }

    fn category(&self) -> Option<EntityCategory> {
        (self.kind == ProjectionKind::Diagnostics).then_some(EntityCategory::Diagnostic)
    }

    fn device(&self) -> Option<DeviceInfo> {
        let item = self.read_item();
        let mut device = DeviceInfo::new(
            format!("{DOMAIN}_{}", self.identity),
            item.lib.as_deref().unwrap_or(UNKNOWN_ROAD),
        );
        device.manufacturer = Some(MANUFACTURER.to_string());
        device.model = Some(MODEL.to_string());
        Some(device)
    }
}
