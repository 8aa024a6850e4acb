//! Placement policies for the rk8s scheduler.
//!
//! A placement policy selects pods by label and decides, per pod, whether it
//! should land on the nodes picked by the policy's node selector. The
//! [`plugins::placement_policy`] plugin enforces that decision during
//! scheduling, backed by the bookkeeping in [`core`].

pub mod cache;
pub mod config;
pub mod core;
pub mod cycle_state;
pub mod error;
pub mod models;
pub mod plugins;
pub mod scheduler;
pub mod with_xline;
