//! The `Projection` trait: what every exposed entity renders.
//!
//! A projection is a read-only view.  It owns no data of its own beyond a
//! cached copy of what it last read from the coordinator.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::config_entry::DOMAIN;

/// Entity attributes, keyed by attribute name.
pub type Attributes = BTreeMap<&'static str, Value>;

/// Secondary classification of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityCategory {
    /// Technical details, hidden from the default dashboard.
    Diagnostic,
}

/// Device an entity is grouped under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// Identifier pair `(domain, id)`.
    pub identifier: (String, String),
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identifier: (DOMAIN.to_string(), id.into()),
            name: name.into(),
            manufacturer: None,
            model: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.identifier.1
    }
}

/// Render capability shared by sensors and buttons.
pub trait Projection: Send + Sync {
    /// Stable identifier; never changes for the lifetime of the entity.
    fn unique_id(&self) -> &str;

    fn name(&self) -> String;

    /// Current state, `None` for stateless entities such as buttons.
    fn state(&self) -> Option<String>;

    fn attributes(&self) -> Attributes {
        Attributes::new()
    }

    fn icon(&self) -> Option<&'static str> {
        None
    }

    fn category(&self) -> Option<EntityCategory> {
        None
    }

    fn device(&self) -> Option<DeviceInfo> {
        None
    }

    /// Everything above in one serializable value.
    fn render(&self) -> EntityView {
        EntityView {
            unique_id: self.unique_id().to_string(),
            name: self.name(),
            state: self.state(),
            attributes: self.attributes(),
            icon: self.icon(),
            category: self.category(),
        }
    }
}

/// Point-in-time rendering of a [`Projection`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityView {
    pub unique_id: String,
    pub name: String,
    pub state: Option<String>,
    pub attributes: Attributes,
    pub icon: Option<&'static str>,
    pub category: Option<EntityCategory>,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl Projection for Fixed {
        fn unique_id(&self) -> &str {
            "fixed"
        }

        fn name(&self) -> String {
            "Fixed".into()
        }

        fn state(&self) -> Option<String> {
            Some("on".into())
        }
    }

    #[test]
    fn render_uses_defaults() {
        let view = Fixed.render();
        assert_eq!(view.unique_id, "fixed");
        assert_eq!(view.state.as_deref(), Some("on"));
        assert!(view.attributes.is_empty());
        assert_eq!(view.icon, None);
        assert_eq!(view.category, None);
    }

    #[test]
    fn device_identifier_is_scoped_to_domain() {
        let device = DeviceInfo::new("inforoute65_T1", "Col X");
        assert_eq!(device.identifier.0, "inforoute65");
        assert_eq!(device.id(), "inforoute65_T1");
    }
}
