//! Registry of published remote objects.
//!
//! The registry is the single source of truth for what is currently visible
//! on the bus. It owns every `RemoteObject` exclusively; other components
//! hold either short-lived borrows or plain `AppId` keys that they re-resolve
//! through `find` after any call that could have destroyed the object.

use tracing::debug;

use crate::config::BusConfig;
use crate::error::{BerthError, Result};
use crate::record::{
    object_path_for, AppId, ApplicationRecord, InterfaceMap, PropertyMap, PropertyValue,
};

/// Bus-facing projection of one installed application: its object path and
/// the interfaces/properties it exports.
#[derive(Debug, Clone)]
pub struct RemoteObject {
    record: ApplicationRecord,
    path: String,
    interfaces: InterfaceMap,
}

impl RemoteObject {
    fn new(record: ApplicationRecord) -> Self {
        let path = object_path_for(&record.app_id);

        let mut properties = PropertyMap::new();
        properties.insert(
            BusConfig::PROP_APP_ID.to_string(),
            PropertyValue::Str(record.app_id.to_string()),
        );
        properties.insert(
            BusConfig::PROP_INSTALLED_PATH.to_string(),
            PropertyValue::Path(record.path.clone()),
        );

        let mut interfaces = InterfaceMap::new();
        interfaces.insert(BusConfig::APPLICATION_INTERFACE.to_string(), properties);

        Self {
            record,
            path,
            interfaces,
        }
    }

    pub fn app_id(&self) -> &AppId {
        &self.record.app_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn interfaces(&self) -> &InterfaceMap {
        &self.interfaces
    }

    pub fn interface_names(&self) -> Vec<String> {
        self.interfaces.keys().cloned().collect()
    }
}

/// Metadata captured from an object before destruction, so a removal can be
/// broadcast after the object itself is gone.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedObject {
    pub path: String,
    pub interface_names: Vec<String>,
}

/// Insertion-ordered collection of live remote objects, keyed by identity.
#[derive(Debug, Default)]
pub struct Registry {
    objects: Vec<RemoteObject>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new object for `record`.
    ///
    /// A duplicate `app_id` means the store reported an install for an id
    /// that is already published, which breaks the 1:1 invariant. That is a
    /// collaborator-contract violation, not a normal-flow error. The derived
    /// object path must be unique too: sanitization can map distinct ids to
    /// the same path, and two live objects sharing a bus address would
    /// collapse into one `enumerate` entry.
    pub fn create(&mut self, record: ApplicationRecord) -> Result<&RemoteObject> {
        if self.find(&record.app_id).is_some() {
            return Err(BerthError::InternalConsistency {
                message: format!("duplicate app id in registry: {}", record.app_id),
            });
        }

        let object = RemoteObject::new(record);
        if self.find_by_path(object.path()).is_some() {
            return Err(BerthError::InternalConsistency {
                message: format!("duplicate object path in registry: {}", object.path()),
            });
        }

        let index = self.objects.len();
        self.objects.push(object);
        let object = &self.objects[index];
        debug!("published {} at {}", object.app_id(), object.path());
        Ok(object)
    }

    /// Look up a live object by identity.
    pub fn find(&self, app_id: &AppId) -> Option<&RemoteObject> {
        self.objects.iter().find(|o| o.app_id() == app_id)
    }

    /// Look up a live object by its bus path.
    pub fn find_by_path(&self, path: &str) -> Option<&RemoteObject> {
        self.objects.iter().find(|o| o.path() == path)
    }

    /// Remove the object for `app_id`, returning its pre-destruction
    /// metadata for the removal broadcast.
    pub fn destroy(&mut self, app_id: &AppId) -> Result<RemovedObject> {
        let index = self
            .objects
            .iter()
            .position(|o| o.app_id() == app_id)
            .ok_or_else(|| BerthError::NotFound {
                app_id: app_id.clone(),
            })?;

        let object = self.objects.remove(index);
        debug!("unpublished {} from {}", app_id, object.path());
        Ok(RemovedObject {
            path: object.path,
            interface_names: object.interfaces.keys().cloned().collect(),
        })
    }

    /// Full, consistent snapshot of the published set in insertion order.
    pub fn enumerate(&self) -> Vec<(String, InterfaceMap)> {
        self.objects
            .iter()
            .map(|o| (o.path().to_string(), o.interfaces().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
