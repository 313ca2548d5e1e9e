//! Readers for the Linux `/sys` block hierarchy.
//!
//! - [`topology`]: classifies a device number via `/sys/dev/block`
//! - [`queue`]: reads `queue/*` tunables plus `inflight` and `size`

pub mod queue;
pub mod topology;

pub use queue::QueueAttributeReader;
pub use topology::TopologyResolver;
