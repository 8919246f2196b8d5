//! Output binding
//!
//! Captures the outputs a provider returns for each resource during one
//! apply and resolves the deferred references of later resources against
//! them.

use crate::error::{CloudError, Result};
use crate::provider::ResourceOutputs;
use infraflow_core::{OutputRef, Value};
use std::collections::{BTreeMap, HashMap};

/// Outputs bound during one apply
///
/// A resource is bound at most once; bound outputs are never overwritten.
#[derive(Debug, Clone, Default)]
pub struct OutputBinder {
    bound: HashMap<String, ResourceOutputs>,
}

impl OutputBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the outputs the provider just returned for `resource`
    pub fn bind(&mut self, resource: &str, outputs: ResourceOutputs) -> Result<()> {
        if self.bound.contains_key(resource) {
            return Err(CloudError::OutputAlreadyBound(resource.to_string()));
        }
        tracing::debug!(resource, outputs = outputs.len(), "Bound outputs");
        self.bound.insert(resource.to_string(), outputs);
        Ok(())
    }

    /// Bind outputs recorded in state for a resource left unchanged
    pub fn seed(&mut self, resource: &str, outputs: &ResourceOutputs) -> Result<()> {
        self.bind(resource, outputs.clone())
    }

    pub fn is_bound(&self, resource: &str) -> bool {
        self.bound.contains_key(resource)
    }

    /// A single bound output
    pub fn get(&self, resource: &str, output: &str) -> Option<&serde_json::Value> {
        self.bound.get(resource).and_then(|o| o.get(output))
    }

    /// All outputs of a bound resource
    pub fn outputs_of(&self, resource: &str) -> Option<&ResourceOutputs> {
        self.bound.get(resource)
    }

    /// Resolve a value for `resource`, failing on the first unbound reference
    pub fn resolve(&self, resource: &str, value: &Value) -> Result<serde_json::Value> {
        value
            .resolve(&|r: &OutputRef| self.get(&r.resource, &r.output).cloned())
            .map_err(|missing| CloudError::UnresolvedOutput {
                resource: resource.to_string(),
                reference: missing.to_string(),
            })
    }

    /// Resolve every property of a resource into a JSON object
    pub fn resolve_properties(
        &self,
        resource: &str,
        properties: &BTreeMap<String, Value>,
    ) -> Result<serde_json::Value> {
        let mut inputs = serde_json::Map::new();
        for (key, value) in properties {
            inputs.insert(key.clone(), self.resolve(resource, value)?);
        }
        Ok(serde_json::Value::Object(inputs))
    }
}
