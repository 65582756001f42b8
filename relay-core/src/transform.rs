// Output burst to front-end payload normalization.

use crate::burst::{CommandMap, FrontEndPayload, OutputBurst};

pub const MOTOR_OFFSET: f64 = 5.0;
pub const MISC_OFFSET: f64 = 1.0;

/// Returns `None` when the burst carries neither motor nor misc commands,
/// so an idle burst never overwrites a pending payload.
pub fn to_front_end(burst: &OutputBurst) -> Option<FrontEndPayload> {
    let payload = FrontEndPayload {
        motor: burst.motor.as_ref().map(|map| shift(map, MOTOR_OFFSET)),
        misc: burst.misc.as_ref().map(|map| shift(map, MISC_OFFSET)),
    };
    if payload.is_empty() {
        return None;
    }
    Some(payload)
}

fn shift(map: &CommandMap, offset: f64) -> CommandMap {
    map.iter()
        .map(|(id, value)| (id.clone(), value - offset))
        .collect()
}
