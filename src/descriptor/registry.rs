//! Process-wide descriptor registry.
//!
//! All descriptors are built once during initialization and frozen into an
//! immutable registry shared by reference afterward, so lookups on the call
//! path are plain map reads with no locking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptor::CacheDescriptor;
use crate::error::{CacheGateError, Result};

/// Immutable lookup table from operation name to descriptor.
#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    descriptors: HashMap<String, Arc<CacheDescriptor>>,
}

impl DescriptorRegistry {
    /// Start collecting descriptors.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Look up the descriptor for a named operation.
    pub fn get(&self, name: &str) -> Result<&Arc<CacheDescriptor>> {
        self.descriptors
            .get(name)
            .ok_or_else(|| CacheGateError::UnknownOperation(name.to_string()))
    }

    /// All registered descriptors, in no particular order.
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<CacheDescriptor>> {
        self.descriptors.values()
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether no operations are registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Collects descriptors and validates uniqueness before freezing.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    descriptors: Vec<CacheDescriptor>,
}

impl RegistryBuilder {
    /// Add one built descriptor.
    pub fn register(mut self, descriptor: CacheDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Freeze the registry. Duplicate operation names are a fatal
    /// configuration error.
    pub fn build(self) -> Result<DescriptorRegistry> {
        let mut descriptors = HashMap::with_capacity(self.descriptors.len());
        for descriptor in self.descriptors {
            let name = descriptor.name.clone();
            if descriptors.insert(name.clone(), Arc::new(descriptor)).is_some() {
                return Err(CacheGateError::Config(format!(
                    "duplicate cache operation name '{name}'"
                )));
            }
        }
        Ok(DescriptorRegistry { descriptors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DescriptorBuilder, MethodSpec, OperationKind, ParamSpec};
    use std::time::Duration;

    fn read_descriptor(name: &str) -> CacheDescriptor {
        DescriptorBuilder::new(name, OperationKind::ReadSingle)
            .namespace("NS")
            .expiration(Duration::from_secs(60))
            .signature(MethodSpec::new("m").param(ParamSpec::new("id").key_order(0)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_lookup_by_name() {
        let registry = DescriptorRegistry::builder()
            .register(read_descriptor("users.read"))
            .register(read_descriptor("orders.read"))
            .build()
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("users.read").unwrap().namespace, "NS");
    }

    #[test]
    fn test_unknown_operation() {
        let registry = DescriptorRegistry::builder().build().unwrap();
        assert!(registry.is_empty());
        let err = registry.get("missing.read").unwrap_err();
        assert!(matches!(err, CacheGateError::UnknownOperation(_)));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = DescriptorRegistry::builder()
            .register(read_descriptor("users.read"))
            .register(read_descriptor("users.read"))
            .build()
            .unwrap_err();
        assert!(matches!(err, CacheGateError::Config(_)));
    }
}
