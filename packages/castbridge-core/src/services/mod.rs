//! Application services layer.
//!
//! Services orchestrate between the router and the protocol layers
//! (cast/, receiver/, monitor).

pub mod status_watch;

pub use status_watch::StatusWatcher;
