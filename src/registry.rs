//! Device lookup by lens facing.

use crate::errors::Result;
use crate::platform::CameraProvider;
use crate::types::{DeviceDescriptor, LensFacing};

/// First device in enumeration order that faces `facing`.
pub fn find_device(descriptors: &[DeviceDescriptor], facing: LensFacing) -> Option<&str> {
    descriptors
        .iter()
        .find(|descriptor| descriptor.facing == facing)
        .map(|descriptor| descriptor.id.as_str())
}

/// Point-in-time view of every device a provider exposes.
///
/// Nothing is cached between snapshots; devices can come and go between opens.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    descriptors: Vec<DeviceDescriptor>,
}

impl DeviceRegistry {
    pub fn snapshot(provider: &dyn CameraProvider) -> Result<Self> {
        let ids = provider.device_ids()?;
        let mut descriptors = Vec::with_capacity(ids.len());
        for id in ids {
            match provider.descriptor(&id) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => log::warn!("Skipping camera {}: {}", id, e),
            }
        }
        log::debug!("Enumerated {} camera device(s)", descriptors.len());
        Ok(Self { descriptors })
    }

    pub fn descriptors(&self) -> &[DeviceDescriptor] {
        &self.descriptors
    }

    pub fn find(&self, facing: LensFacing) -> Option<&DeviceDescriptor> {
        self.descriptors.iter().find(|d| d.facing == facing)
    }

    pub fn get(&self, id: &str) -> Option<&DeviceDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }
}

/// Re-enumerate the provider and resolve a descriptor for `facing`.
pub fn find_provider_device(
    provider: &dyn CameraProvider,
    facing: LensFacing,
) -> Result<Option<DeviceDescriptor>> {
    let registry = DeviceRegistry::snapshot(provider)?;
    Ok(registry.find(facing).cloned())
}
