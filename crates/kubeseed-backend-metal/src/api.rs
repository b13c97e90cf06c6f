//! Wire types for the bare-metal provider's device API

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct DeviceCreateRequest {
    pub hostname: String,
    pub plan: String,
    pub operating_system: String,
    pub facility: String,
    pub billing_cycle: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DeviceUpdateRequest {
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    pub id: String,
    pub hostname: String,
    pub state: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub ip_addresses: Vec<IpAddress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpAddress {
    pub address: String,
    pub public: bool,
    pub address_family: u8,
}

#[derive(Debug, Deserialize)]
pub struct DeviceList {
    #[serde(default)]
    pub devices: Vec<Device>,
}

impl Device {
    pub fn public_ipv4(&self) -> Option<&str> {
        self.ip_addresses
            .iter()
            .find(|ip| ip.public && ip.address_family == 4 && !ip.address.is_empty())
            .map(|ip| ip.address.as_str())
    }

    pub fn private_ipv4(&self) -> Option<&str> {
        self.ip_addresses
            .iter()
            .find(|ip| !ip.public && ip.address_family == 4 && !ip.address.is_empty())
            .map(|ip| ip.address.as_str())
    }

    /// Devices already queued for deletion do not count as live.
    pub fn is_live(&self) -> bool {
        !matches!(self.state.as_str(), "deleted" | "deprovisioning" | "failed")
    }
}
