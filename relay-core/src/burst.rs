// Burst message models exchanged with the simulator and the front-end.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sensor channel name to opaque payload, as pushed by the front-end.
pub type SensoryData = BTreeMap<String, serde_json::Value>;

/// Actuator or signal id to numeric command value.
pub type CommandMap = BTreeMap<String, f64>;

/// One input burst sent to the simulator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputBurst {
    /// Wall-clock time the burst was built, milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub counter: u64,
    #[serde(default)]
    pub sensory_data: SensoryData,
}

/// One output burst received from the simulator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputBurst {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motor: Option<CommandMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub misc: Option<CommandMap>,
}

/// Front-end bound form of an output burst with per-category offsets applied.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrontEndPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motor: Option<CommandMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub misc: Option<CommandMap>,
}

impl FrontEndPayload {
    pub fn is_empty(&self) -> bool {
        self.motor.is_none() && self.misc.is_none()
    }
}
