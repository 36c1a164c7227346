//! Device-link payloads.
//!
//! Two JSON documents cross this crate: the link operation a caller submits,
//! and the simulated-device creation request sent on to the IoT hub.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque token identifying a physical device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HardwareId(String);

impl HardwareId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Device category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Product {
    Tracker,
}

/// Provisioning mode requested from the hub.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimulatorType {
    Manual,
}

/// Body submitted by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateThingRequest {
    pub device_link_operation: DeviceLinkOperation,
}

/// The device to link.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DeviceLinkOperation {
    #[serde(rename = "identifier")]
    pub hardware_id: HardwareId,
    pub product: Product,
}

/// Body sent to the IoT hub's simulated-device endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSimulatedDeviceRequest {
    pub hardware_id: HardwareId,
    #[serde(rename = "productId")]
    pub product: Product,
    pub simulator_type: SimulatorType,
}

impl From<DeviceLinkOperation> for CreateSimulatedDeviceRequest {
    fn from(op: DeviceLinkOperation) -> Self {
        Self {
            hardware_id: op.hardware_id,
            product: op.product,
            simulator_type: SimulatorType::Manual,
        }
    }
}
