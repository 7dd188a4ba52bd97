//! Routing-table augmentation of flows.

mod bird;

pub use bird::{parse_route_reply, BirdAugmenter, BirdSession, RouteInfo};

use sonic_flow_types::Flow;

/// Fills in AS numbers (and optionally prefixes) of a flow from a live
/// routing table.
///
/// Called from every annotation worker concurrently. Implementations may
/// block on their own locks or I/O; failures are handled internally and
/// leave the flow untouched.
pub trait Augmenter: Send + Sync {
    fn augment(&self, flow: &mut Flow);
}
