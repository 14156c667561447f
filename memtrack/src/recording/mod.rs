//! Recording side: session lifecycle, aggregation and operator output

pub mod aggregator;
pub mod display;
pub mod session;

pub use aggregator::Aggregator;
pub use display::{display_saved, display_start_banner};
pub use session::{
    record, spawn_signal_listener, RecordConfig, Recorder, SessionOutcome, SessionState,
    SessionStats, StopHandle, StopReason, DEFAULT_CHANNEL_CAPACITY,
};
