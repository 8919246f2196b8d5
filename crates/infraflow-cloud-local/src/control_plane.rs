//! Emulated control plane
//!
//! Keeps the resources the local provider has created, generates their
//! identifiers and outputs, and enforces the checks a real control plane
//! does before accepting a request.

use crate::error::{LocalError, Result};
use infraflow_cloud::{ResourceOutputs, ResourceRequest};
use infraflow_core::ResourceKind;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

/// Location used when neither the resource nor its group names one
pub const DEFAULT_LOCATION: &str = "westeurope";

/// A resource living in the emulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmulatedResource {
    pub id: String,
    pub kind: ResourceKind,
    pub name: String,
    pub resource_group: Option<String>,
    pub location: String,
    pub properties: serde_json::Value,
    pub outputs: ResourceOutputs,
}

/// Where a request lands: name, group and location
struct Placement {
    name: String,
    group: Option<String>,
    location: String,
}

/// Properties a request must carry, per kind
fn required_properties(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::ResourceGroup => &[],
        ResourceKind::StorageAccount => &[
            "resource_group_name",
            "account_tier",
            "account_replication_type",
        ],
        ResourceKind::VirtualNetwork => &["resource_group_name", "address_spaces"],
        ResourceKind::Subnet => &[
            "resource_group_name",
            "virtual_network_name",
            "address_prefix",
        ],
        ResourceKind::NetworkProfile => &["resource_group_name", "container_network_interface"],
        ResourceKind::ContainerGroup => &["resource_group_name", "os_type", "container"],
        ResourceKind::PublicIp => &["resource_group_name", "allocation_method"],
        ResourceKind::ApplicationGateway => &[
            "resource_group_name",
            "sku",
            "gateway_ip_configuration",
            "frontend_port",
            "frontend_ip_configuration",
            "backend_address_pool",
            "backend_http_settings",
            "http_listener",
            "request_routing_rule",
        ],
        ResourceKind::ContainerRegistry => &["resource_group_name", "sku"],
    }
}

/// In-memory control plane, serializable for persistence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlPlane {
    subscription: String,
    resources: BTreeMap<String, EmulatedResource>,
    allocated_private: u32,
    allocated_public: u32,
    allocated_guids: u32,
}

impl ControlPlane {
    pub fn new(subscription: impl Into<String>) -> Self {
        Self {
            subscription: subscription.into(),
            ..Self::default()
        }
    }

    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    pub fn get(&self, id: &str) -> Option<&EmulatedResource> {
        self.resources.get(id)
    }

    pub fn resources(&self) -> impl Iterator<Item = &EmulatedResource> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Create a resource and return its outputs
    pub fn create(&mut self, request: &ResourceRequest) -> Result<ResourceOutputs> {
        let placement = self.validate(request)?;
        let id = self.resource_id(request, &placement);
        if self.resources.contains_key(&id) {
            return Err(LocalError::Conflict {
                resource: request.name.clone(),
                id,
            });
        }

        let outputs = self.outputs_for(request, &placement, &id, None);
        self.insert(request, placement, id, outputs.clone());
        Ok(outputs)
    }

    /// Update the resource `current_id` in place
    ///
    /// Outputs allocated at creation (IP addresses, guids) are kept.
    pub fn update(
        &mut self,
        request: &ResourceRequest,
        current_id: &str,
    ) -> Result<ResourceOutputs> {
        let previous = self
            .resources
            .get(current_id)
            .cloned()
            .ok_or_else(|| LocalError::NotFound {
                id: current_id.to_string(),
            })?;

        let placement = self.validate(request)?;
        let id = self.resource_id(request, &placement);
        if id != current_id {
            return Err(LocalError::PlacementChanged {
                resource: request.name.clone(),
                from: current_id.to_string(),
                to: id,
            });
        }

        let outputs = self.outputs_for(request, &placement, &id, Some(&previous));
        self.insert(request, placement, id, outputs.clone());
        Ok(outputs)
    }

    /// Delete a resource; a resource group must be empty first
    pub fn delete(&mut self, id: &str) -> Result<()> {
        let resource = self.resources.get(id).ok_or_else(|| LocalError::NotFound {
            id: id.to_string(),
        })?;

        if resource.kind == ResourceKind::ResourceGroup {
            let count = self
                .resources
                .values()
                .filter(|r| r.resource_group.as_deref() == Some(resource.name.as_str()))
                .count();
            if count > 0 {
                return Err(LocalError::ResourceGroupNotEmpty {
                    group: resource.name.clone(),
                    count,
                });
            }
        }

        self.resources.remove(id);
        Ok(())
    }

    fn insert(
        &mut self,
        request: &ResourceRequest,
        placement: Placement,
        id: String,
        outputs: ResourceOutputs,
    ) {
        self.resources.insert(
            id.clone(),
            EmulatedResource {
                id,
                kind: request.kind,
                name: placement.name,
                resource_group: placement.group,
                location: placement.location,
                properties: request.inputs.clone(),
                outputs,
            },
        );
    }

    fn validate(&self, request: &ResourceRequest) -> Result<Placement> {
        let inputs = request
            .inputs
            .as_object()
            .ok_or_else(|| LocalError::InvalidInputs(request.name.clone()))?;

        for property in required_properties(request.kind) {
            if inputs.get(*property).is_none_or(serde_json::Value::is_null) {
                return Err(LocalError::MissingProperty {
                    resource: request.name.clone(),
                    kind: request.kind.to_string(),
                    property: property.to_string(),
                });
            }
        }

        let name = request.provider_name().to_string();
        let mut location = request.get_str("location").map(str::to_string);

        let group = if request.kind == ResourceKind::ResourceGroup {
            None
        } else {
            let group = request
                .get_str("resource_group_name")
                .ok_or_else(|| LocalError::MissingProperty {
                    resource: request.name.clone(),
                    kind: request.kind.to_string(),
                    property: "resource_group_name".to_string(),
                })?;
            let rg = self
                .resources
                .get(&self.group_id(group))
                .ok_or_else(|| LocalError::ResourceGroupNotFound {
                    resource: request.name.clone(),
                    group: group.to_string(),
                })?;
            location = location.or_else(|| Some(rg.location.clone()));
            Some(group.to_string())
        };

        if request.kind == ResourceKind::Subnet
            && let (Some(group), Some(vnet)) = (&group, request.get_str("virtual_network_name"))
        {
            let vnet_id = format!(
                "{}/providers/{}/{}",
                self.group_id(group),
                ResourceKind::VirtualNetwork.provider_type(),
                vnet
            );
            if !self.resources.contains_key(&vnet_id) {
                return Err(LocalError::ParentNotFound {
                    resource: request.name.clone(),
                    parent: vnet_id,
                });
            }
        }

        self.check_links(&request.name, &request.inputs)?;

        Ok(Placement {
            name,
            group,
            location: location.unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
        })
    }

    /// Every `*_id` input pointing into this subscription must exist
    fn check_links(&self, resource: &str, value: &serde_json::Value) -> Result<()> {
        let prefix = format!("/subscriptions/{}/", self.subscription);
        match value {
            serde_json::Value::Object(fields) => {
                for (key, field) in fields {
                    if key.ends_with("_id")
                        && let Some(id) = field.as_str()
                        && id.starts_with(&prefix)
                        && !self.resources.contains_key(id)
                    {
                        return Err(LocalError::LinkedResourceNotFound {
                            resource: resource.to_string(),
                            id: id.to_string(),
                        });
                    }
                    self.check_links(resource, field)?;
                }
                Ok(())
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    self.check_links(resource, item)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn group_id(&self, group: &str) -> String {
        format!("/subscriptions/{}/resourceGroups/{}", self.subscription, group)
    }

    /// `/subscriptions/<sub>/resourceGroups/<rg>/providers/<type>/<name>`
    fn resource_id(&self, request: &ResourceRequest, placement: &Placement) -> String {
        let Some(group) = &placement.group else {
            return self.group_id(&placement.name);
        };

        if request.kind == ResourceKind::Subnet {
            let vnet = request.get_str("virtual_network_name").unwrap_or_default();
            return format!(
                "{}/providers/{}/{}/subnets/{}",
                self.group_id(group),
                ResourceKind::VirtualNetwork.provider_type(),
                vnet,
                placement.name
            );
        }

        format!(
            "{}/providers/{}/{}",
            self.group_id(group),
            request.kind.provider_type(),
            placement.name
        )
    }

    fn outputs_for(
        &mut self,
        request: &ResourceRequest,
        placement: &Placement,
        id: &str,
        previous: Option<&EmulatedResource>,
    ) -> ResourceOutputs {
        let kept = |key: &str| previous.and_then(|p| p.outputs.get(key)).cloned();
        let mut outputs = ResourceOutputs::new();
        outputs.insert("id".to_string(), json!(id));
        outputs.insert("name".to_string(), json!(placement.name));

        match request.kind {
            ResourceKind::PublicIp => {
                let ip = kept("ip_address").unwrap_or_else(|| json!(self.allocate_public()));
                let fqdn = request
                    .get_str("domain_name_label")
                    .map(|label| json!(format!("{}.{}.cloudapp.local", label, placement.location)))
                    .unwrap_or(serde_json::Value::Null);
                outputs.insert("ip_address".to_string(), ip);
                outputs.insert("fqdn".to_string(), fqdn);
            }
            ResourceKind::ContainerGroup => {
                let public = request
                    .get_str("ip_address_type")
                    .is_some_and(|t| t.eq_ignore_ascii_case("public"));
                let ip = kept("ip_address").unwrap_or_else(|| {
                    if public {
                        json!(self.allocate_public())
                    } else {
                        json!(self.allocate_private())
                    }
                });
                let label = request.get_str("dns_name_label").unwrap_or(&placement.name);
                outputs.insert("ip_address".to_string(), ip);
                outputs.insert(
                    "fqdn".to_string(),
                    json!(format!("{}.{}.azurecontainer.local", label, placement.location)),
                );
            }
            ResourceKind::ContainerRegistry => {
                outputs.insert(
                    "login_server".to_string(),
                    json!(format!("{}.registry.local", placement.name.to_lowercase())),
                );
            }
            ResourceKind::StorageAccount => {
                outputs.insert(
                    "primary_blob_endpoint".to_string(),
                    json!(format!("https://{}.blob.core.local/", placement.name)),
                );
            }
            ResourceKind::VirtualNetwork => {
                let guid = kept("guid").unwrap_or_else(|| json!(self.allocate_guid()));
                outputs.insert("guid".to_string(), guid);
            }
            ResourceKind::ApplicationGateway => {
                // the frontend takes the address of its linked public IP
                let linked = request
                    .inputs
                    .get("frontend_ip_configuration")
                    .and_then(|config| find_str(config, "public_ip_address_id"))
                    .and_then(|ip_id| self.resources.get(ip_id))
                    .and_then(|ip| ip.outputs.get("ip_address"))
                    .cloned();
                let frontend = linked
                    .or_else(|| kept("frontend_ip"))
                    .unwrap_or_else(|| json!(self.allocate_public()));
                outputs.insert("frontend_ip".to_string(), frontend);
            }
            ResourceKind::ResourceGroup | ResourceKind::Subnet | ResourceKind::NetworkProfile => {}
        }

        outputs
    }

    fn allocate_private(&mut self) -> String {
        let n = self.allocated_private;
        self.allocated_private += 1;
        format!("10.0.{}.{}", n / 250, n % 250 + 4)
    }

    fn allocate_public(&mut self) -> String {
        let n = self.allocated_public;
        self.allocated_public += 1;
        format!("20.50.{}.{}", n / 250, n % 250 + 4)
    }

    fn allocate_guid(&mut self) -> String {
        self.allocated_guids += 1;
        format!("00000000-0000-4000-8000-{:012x}", self.allocated_guids)
    }
}

/// First string stored under `key`, searching nested objects and arrays
fn find_str<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    match value {
        serde_json::Value::Object(fields) => fields
            .get(key)
            .and_then(|v| v.as_str())
            .or_else(|| fields.values().find_map(|v| find_str(v, key))),
        serde_json::Value::Array(items) => items.iter().find_map(|v| find_str(v, key)),
        _ => None,
    }
}
