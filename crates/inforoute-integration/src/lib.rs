//! `inforoute-integration` – the Inforoute 65 integration proper.
//!
//! Binds a [`Coordinator`](inforoute_runtime::Coordinator) to the entities a
//! host exposes.
//!
//! # Modules
//!
//! - [`config_entry`] – [`ConfigEntry`] and its validated [`EntryOptions`].
//! - [`entity`] – the [`Projection`] render trait and device grouping.
//! - [`sensor`] – [`RoadSensor`]: Circulation, Location, Diagnostics and
//!   combined Section views of one road item.
//! - [`button`] – [`RefreshButton`], the manual refresh trigger.
//! - [`platform`] – [`EntityPlatform`], the sensor and device registry.
//! - [`integration`] – [`Integration`]: `setup_entry` / `unload_entry`.

pub mod button;
pub mod config_entry;
pub mod entity;
pub mod integration;
pub mod platform;
pub mod sensor;

#[cfg(test)]
mod test_support;

pub use button::RefreshButton;
pub use config_entry::{
    ConfigEntry, ConfigError, DEFAULT_NAME, DEFAULT_SCAN_INTERVAL, DOMAIN, EntityLayout,
    EntryOptions, MIN_SCAN_INTERVAL,
};
pub use entity::{Attributes, DeviceInfo, EntityCategory, EntityView, Projection};
pub use integration::{Integration, setup};
pub use platform::EntityPlatform;
pub use sensor::{ProjectionKind, RoadSensor};
