//! Background Tasks Module
//!
//! Contains background tasks that run periodically while an engine is alive.
//!
//! # Tasks
//! - Sweep: removes expired and corrupt entries at the configured interval

mod sweep;

pub use sweep::spawn_sweep_task;
