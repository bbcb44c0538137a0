//! C4: upstream node health. Tracks per-node, per-transport health flags via
//! a periodic probe loop and exposes lock-free `pick_http`/`pick_ws` reads
//! for the request hot path.

mod extract;
mod manager;
mod node;
mod numeric;
mod probe;

pub use extract::{DotPath, PathError};
pub use manager::{HealthManager, NoHealthyNode};
pub use node::Node;
pub use numeric::{to_u64, ParseHeightError};
pub use probe::{ChainKind, ProbeSpec};
