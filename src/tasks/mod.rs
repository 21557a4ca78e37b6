//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Purge: Removes expired cache entries at configured intervals

mod purge;

pub use purge::{run_purge, spawn_purge_task};
