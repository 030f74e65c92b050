//! Core board model and operations for phaseboard.

pub mod archive;
pub mod audit;
pub mod checklist;
pub mod claim;
pub mod column;
pub mod config;
pub mod current;
pub mod error;
pub mod layout;
pub mod metrics;
pub mod prereq;
pub mod refine;
pub mod revert;
pub mod schedule;
pub mod service;
pub mod store;
pub mod task;
pub mod task_ops;
pub mod vcs;

pub use error::{BoardError, BoardResult};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
