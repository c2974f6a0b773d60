//! The three-stage scan pipeline: Stage A (scan workers), Stage B (absorb threads, private
//! to each Stage-A worker), and Stage C (the sink).

pub mod sink;
pub mod stage_a;
pub mod stage_b;

pub use sink::{DEFAULT_DRAIN_TIMEOUT, spawn_sink};
pub use stage_a::spawn_stage_a_pool;
pub use stage_b::AbsorbItem;
