//! Descriptor construction pipeline.
//!
//! A [`DescriptorBuilder`] combines the per-operation settings (namespace,
//! expiration, policy) with a [`MethodSpec`] declaring the shape of the
//! wrapped operation, then runs a fixed, order-dependent sequence of build
//! steps. Steps run in this order because later steps read fields earlier
//! steps populate: the list-slot step locates the list-typed parameter
//! among the key indexes the key-index step resolved. Each step is
//! independently skippable through its `supports` predicate, and any
//! validation failure aborts the build with a configuration error instead
//! of producing a partially valid descriptor.

use std::collections::HashSet;
use std::time::Duration;

use crate::descriptor::{
    CacheDescriptor, CachePolicy, DataSource, OperationKind, DEFAULT_CACHE_NAME,
};
use crate::error::{CacheGateError, Result};

/// Declared shape of one wrapped-operation parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    /// Parameter name, used in error messages only.
    pub name: String,

    /// Rank of this parameter among the key-supplying parameters. Ties are
    /// a configuration error.
    pub key_order: Option<u32>,

    /// This parameter holds the value to store.
    pub is_data: bool,

    /// This parameter is list-typed (the batch id list).
    pub is_list: bool,
}

impl ParamSpec {
    /// Declare a parameter that contributes nothing to caching.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_order: None,
            is_data: false,
            is_list: false,
        }
    }

    /// Mark this parameter as key material with the given order rank.
    pub fn key_order(mut self, order: u32) -> Self {
        self.key_order = Some(order);
        self
    }

    /// Mark this parameter as the value to store.
    pub fn data(mut self) -> Self {
        self.is_data = true;
        self
    }

    /// Mark this parameter as list-typed.
    pub fn list(mut self) -> Self {
        self.is_list = true;
        self
    }
}

/// Explicit declaration of the wrapped operation's signature.
#[derive(Debug, Clone, Default)]
pub struct MethodSpec {
    /// Operation's source-level name, used in error messages.
    pub name: String,

    /// Declared parameters, in signature order.
    pub params: Vec<ParamSpec>,

    /// Key material comes from the return value.
    pub key_from_result: bool,

    /// The value to store is the return value.
    pub data_from_result: bool,
}

impl MethodSpec {
    /// Start a declaration for the named operation.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Append a parameter declaration.
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Key material comes from the return value.
    pub fn key_from_result(mut self) -> Self {
        self.key_from_result = true;
        self
    }

    /// The value to store is the return value.
    pub fn data_from_result(mut self) -> Self {
        self.data_from_result = true;
        self
    }
}

/// Builder assembling one [`CacheDescriptor`].
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    name: String,
    kind: OperationKind,
    namespace: Option<String>,
    cache_name: Option<String>,
    expiration: Option<Duration>,
    assigned_key: Option<String>,
    signature: MethodSpec,
    policy: CachePolicy,
}

impl DescriptorBuilder {
    /// Start a descriptor for the named operation with the given kind.
    pub fn new(name: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            name: name.into(),
            kind,
            namespace: None,
            cache_name: None,
            expiration: None,
            assigned_key: None,
            signature: MethodSpec::default(),
            policy: CachePolicy::default(),
        }
    }

    /// Required key prefix for this operation.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Target a named cache instance instead of the default one.
    pub fn cache_name(mut self, cache_name: impl Into<String>) -> Self {
        self.cache_name = Some(cache_name.into());
        self
    }

    /// Entry time-to-live. Required for kinds that store values.
    pub fn expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Fixed key suffix for assign kinds.
    pub fn assigned_key(mut self, assigned_key: impl Into<String>) -> Self {
        self.assigned_key = Some(assigned_key.into());
        self
    }

    /// Declare the wrapped operation's signature.
    pub fn signature(mut self, signature: MethodSpec) -> Self {
        self.signature = signature;
        self
    }

    /// Null and batch-matching behavior.
    pub fn policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run the build pipeline, producing a validated descriptor.
    pub fn build(self) -> Result<CacheDescriptor> {
        let mut descriptor = CacheDescriptor {
            name: self.name.clone(),
            kind: self.kind,
            namespace: String::new(),
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            key_indexes: Vec::new(),
            key_from_result: false,
            data_source: DataSource::None,
            list_index_in_keys: None,
            list_index_in_args: None,
            expiration: Duration::ZERO,
            assigned_key: None,
            policy: self.policy,
        };

        for step in PIPELINE {
            if step.supports(self.kind) {
                step.apply(&self, &mut descriptor)?;
            }
        }

        Ok(descriptor)
    }

    fn config_err(&self, message: impl std::fmt::Display) -> CacheGateError {
        CacheGateError::Config(format!("operation '{}': {message}", self.name))
    }
}

/// One stage of the descriptor build pipeline.
trait BuildStep: Sync {
    /// Whether this stage applies to the given operation kind.
    fn supports(&self, kind: OperationKind) -> bool;

    /// Populate the stage's fields, validating the declaration.
    fn apply(&self, input: &DescriptorBuilder, out: &mut CacheDescriptor) -> Result<()>;
}

/// Fixed stage order. `ListKeyIndexStep` must run after `KeyIndexStep`.
static PIPELINE: &[&dyn BuildStep] = &[
    &KindStep,
    &CacheNameStep,
    &KeyIndexStep,
    &DataIndexStep,
    &ExpirationStep,
    &NamespaceStep,
    &AssignedKeyStep,
    &ListKeyIndexStep,
];

/// Validates that the declaration is coherent with the operation kind.
struct KindStep;

impl BuildStep for KindStep {
    fn supports(&self, _kind: OperationKind) -> bool {
        true
    }

    fn apply(&self, input: &DescriptorBuilder, _out: &mut CacheDescriptor) -> Result<()> {
        if input.signature.key_from_result && input.kind.is_read() {
            return Err(input.config_err(
                "key material cannot come from the result of a read-through operation; \
                 keys must be known before invocation",
            ));
        }
        if input.signature.key_from_result && input.kind.is_multi() {
            return Err(
                input.config_err("multi-key operations take their ids from a parameter list")
            );
        }
        if input.signature.data_from_result && !input.kind.uses_data() {
            return Err(input.config_err(format!(
                "kind {} does not store a value, but the declaration marks the result as data",
                input.kind
            )));
        }
        if input.assigned_key.is_some() && !input.kind.is_assign() {
            return Err(input.config_err(format!(
                "assigned key is only valid for assign kinds, not {}",
                input.kind
            )));
        }
        Ok(())
    }
}

/// Selects the cache instance, defaulting when unspecified.
struct CacheNameStep;

impl BuildStep for CacheNameStep {
    fn supports(&self, _kind: OperationKind) -> bool {
        true
    }

    fn apply(&self, input: &DescriptorBuilder, out: &mut CacheDescriptor) -> Result<()> {
        match &input.cache_name {
            Some(name) if name.is_empty() => {
                Err(input.config_err("cache name must not be empty"))
            }
            Some(name) => {
                out.cache_name = name.clone();
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Resolves the ordered key parameter positions, or the result-key flag.
struct KeyIndexStep;

impl BuildStep for KeyIndexStep {
    fn supports(&self, kind: OperationKind) -> bool {
        kind.uses_key_indexes()
    }

    fn apply(&self, input: &DescriptorBuilder, out: &mut CacheDescriptor) -> Result<()> {
        if input.signature.key_from_result {
            out.key_from_result = true;
            return Ok(());
        }

        let mut ranked: Vec<(u32, usize)> = input
            .signature
            .params
            .iter()
            .enumerate()
            .filter_map(|(index, param)| param.key_order.map(|order| (order, index)))
            .collect();

        let mut seen = HashSet::new();
        for (order, index) in &ranked {
            if !seen.insert(*order) {
                return Err(input.config_err(format!(
                    "duplicate key order {order} on parameter '{}'",
                    input.signature.params[*index].name
                )));
            }
        }

        if ranked.is_empty() {
            return Err(input.config_err("no key parameters declared"));
        }

        ranked.sort_by_key(|(order, _)| *order);
        out.key_indexes = ranked.into_iter().map(|(_, index)| index).collect();
        Ok(())
    }
}

/// Resolves where the stored value comes from. Exactly one data source is
/// required for kinds that store values.
struct DataIndexStep;

impl BuildStep for DataIndexStep {
    fn supports(&self, kind: OperationKind) -> bool {
        kind.uses_data()
    }

    fn apply(&self, input: &DescriptorBuilder, out: &mut CacheDescriptor) -> Result<()> {
        let data_params: Vec<usize> = input
            .signature
            .params
            .iter()
            .enumerate()
            .filter_map(|(index, param)| param.is_data.then_some(index))
            .collect();

        match (input.signature.data_from_result, data_params.as_slice()) {
            (true, []) => {
                out.data_source = DataSource::Result;
                Ok(())
            }
            (false, [index]) => {
                out.data_source = DataSource::Param(*index);
                Ok(())
            }
            (true, _) => Err(input.config_err(
                "the result and a parameter are both marked as the data source",
            )),
            (false, []) => Err(input.config_err("no data source declared")),
            (false, indexes) => Err(input.config_err(format!(
                "{} parameters are marked as the data source, expected exactly one",
                indexes.len()
            ))),
        }
    }
}

/// Requires an expiration for kinds that store values.
struct ExpirationStep;

impl BuildStep for ExpirationStep {
    fn supports(&self, kind: OperationKind) -> bool {
        kind.uses_expiration()
    }

    fn apply(&self, input: &DescriptorBuilder, out: &mut CacheDescriptor) -> Result<()> {
        match input.expiration {
            Some(expiration) => {
                out.expiration = expiration;
                Ok(())
            }
            None => Err(input.config_err("expiration is required for this kind")),
        }
    }
}

/// Requires a non-empty namespace.
struct NamespaceStep;

impl BuildStep for NamespaceStep {
    fn supports(&self, _kind: OperationKind) -> bool {
        true
    }

    fn apply(&self, input: &DescriptorBuilder, out: &mut CacheDescriptor) -> Result<()> {
        match &input.namespace {
            Some(namespace) if !namespace.is_empty() => {
                out.namespace = namespace.clone();
                Ok(())
            }
            _ => Err(input.config_err("a non-empty namespace is required")),
        }
    }
}

/// Requires a non-empty assigned key for assign kinds.
struct AssignedKeyStep;

impl BuildStep for AssignedKeyStep {
    fn supports(&self, kind: OperationKind) -> bool {
        kind.is_assign()
    }

    fn apply(&self, input: &DescriptorBuilder, out: &mut CacheDescriptor) -> Result<()> {
        match &input.assigned_key {
            Some(assigned_key) if !assigned_key.is_empty() => {
                out.assigned_key = Some(assigned_key.clone());
                Ok(())
            }
            _ => Err(input.config_err("a non-empty assigned key is required for assign kinds")),
        }
    }
}

/// Locates the single list-typed slot among the resolved key indexes.
/// Depends on `KeyIndexStep` having populated `key_indexes`.
struct ListKeyIndexStep;

impl BuildStep for ListKeyIndexStep {
    fn supports(&self, kind: OperationKind) -> bool {
        kind.is_multi()
    }

    fn apply(&self, input: &DescriptorBuilder, out: &mut CacheDescriptor) -> Result<()> {
        let list_slots: Vec<(usize, usize)> = out
            .key_indexes
            .iter()
            .enumerate()
            .filter(|(_, param_index)| input.signature.params[**param_index].is_list)
            .map(|(key_slot, param_index)| (key_slot, *param_index))
            .collect();

        match list_slots.as_slice() {
            [(key_slot, param_index)] => {
                out.list_index_in_keys = Some(*key_slot);
                out.list_index_in_args = Some(*param_index);
                Ok(())
            }
            [] => Err(input.config_err(
                "multi-key operations require exactly one list-typed key parameter, found none",
            )),
            slots => Err(input.config_err(format!(
                "multi-key operations require exactly one list-typed key parameter, found {}",
                slots.len()
            ))),
        }
    }
}
