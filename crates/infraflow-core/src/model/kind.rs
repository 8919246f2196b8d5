//! リソース種別
//!
//! スタックで宣言できるクラウドリソースの一覧と、それぞれが公開する出力、
//! その場で変更できないプロパティを定義します。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 全種別が公開する出力
const COMMON_OUTPUTS: &[&str] = &["id", "name"];

/// 全種別で置き換えを伴うプロパティ
const COMMON_IMMUTABLE: &[&str] = &["name", "resource_group_name", "location"];

/// 宣言されたリソースの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ResourceGroup,
    StorageAccount,
    VirtualNetwork,
    Subnet,
    NetworkProfile,
    ContainerGroup,
    PublicIp,
    ApplicationGateway,
    ContainerRegistry,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::ResourceGroup,
        ResourceKind::StorageAccount,
        ResourceKind::VirtualNetwork,
        ResourceKind::Subnet,
        ResourceKind::NetworkProfile,
        ResourceKind::ContainerGroup,
        ResourceKind::PublicIp,
        ResourceKind::ApplicationGateway,
        ResourceKind::ContainerRegistry,
    ];

    /// KDLノード名（例: `virtual_network`）
    pub fn node_name(&self) -> &'static str {
        match self {
            ResourceKind::ResourceGroup => "resource_group",
            ResourceKind::StorageAccount => "storage_account",
            ResourceKind::VirtualNetwork => "virtual_network",
            ResourceKind::Subnet => "subnet",
            ResourceKind::NetworkProfile => "network_profile",
            ResourceKind::ContainerGroup => "container_group",
            ResourceKind::PublicIp => "public_ip",
            ResourceKind::ApplicationGateway => "application_gateway",
            ResourceKind::ContainerRegistry => "container_registry",
        }
    }

    /// 生成されるIDに使うプロバイダーのリソースタイプ
    pub fn provider_type(&self) -> &'static str {
        match self {
            ResourceKind::ResourceGroup => "Microsoft.Resources/resourceGroups",
            ResourceKind::StorageAccount => "Microsoft.Storage/storageAccounts",
            ResourceKind::VirtualNetwork => "Microsoft.Network/virtualNetworks",
            ResourceKind::Subnet => "Microsoft.Network/virtualNetworks/subnets",
            ResourceKind::NetworkProfile => "Microsoft.Network/networkProfiles",
            ResourceKind::ContainerGroup => "Microsoft.ContainerInstance/containerGroups",
            ResourceKind::PublicIp => "Microsoft.Network/publicIPAddresses",
            ResourceKind::ApplicationGateway => "Microsoft.Network/applicationGateways",
            ResourceKind::ContainerRegistry => "Microsoft.ContainerRegistry/registries",
        }
    }

    /// リソース作成後に公開される出力
    pub fn outputs(&self) -> Vec<&'static str> {
        let extra: &[&str] = match self {
            ResourceKind::PublicIp => &["ip_address", "fqdn"],
            ResourceKind::ContainerGroup => &["ip_address", "fqdn"],
            ResourceKind::ContainerRegistry => &["login_server"],
            ResourceKind::StorageAccount => &["primary_blob_endpoint"],
            ResourceKind::VirtualNetwork => &["guid"],
            ResourceKind::ApplicationGateway => &["frontend_ip"],
            ResourceKind::ResourceGroup
            | ResourceKind::Subnet
            | ResourceKind::NetworkProfile => &[],
        };
        COMMON_OUTPUTS.iter().chain(extra).copied().collect()
    }

    pub fn has_output(&self, output: &str) -> bool {
        self.outputs().contains(&output)
    }

    /// `property` の変更に削除と再作成が必要か
    pub fn is_immutable(&self, property: &str) -> bool {
        if COMMON_IMMUTABLE.contains(&property) {
            return true;
        }
        let extra: &[&str] = match self {
            ResourceKind::Subnet => &["virtual_network_name"],
            ResourceKind::ContainerGroup => &["os_type", "ip_address_type", "network_profile_id"],
            ResourceKind::PublicIp => &["sku", "allocation_method"],
            ResourceKind::StorageAccount => &["account_tier"],
            ResourceKind::ContainerRegistry => &["sku"],
            ResourceKind::ResourceGroup
            | ResourceKind::VirtualNetwork
            | ResourceKind::NetworkProfile
            | ResourceKind::ApplicationGateway => &[],
        };
        extra.contains(&property)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node_name())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // 他のKDL記述と同様にケバブケースも受け付ける
        let normalized = s.replace('-', "_");
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.node_name() == normalized)
            .ok_or_else(|| format!("unknown resource kind: {}", s))
    }
}
