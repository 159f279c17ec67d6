//! Watches the host for removable volumes and archives each new one into a
//! local destination tree.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod context;
pub mod core;
pub mod logging;
