// Shared burst relay domain logic: messages, transforms and cadence tracking.

pub mod address;
pub mod burst;
pub mod cadence;
pub mod transform;
