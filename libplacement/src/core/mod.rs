//! Placement policy bookkeeping: which policy a pod falls under, and how
//! many of a policy's pods currently count toward its target.

pub mod labels;
pub mod manager;
pub mod policy_info;
pub mod registry;
pub mod target;
