//! Replication plan construction for a deletion-protected, geo-replicated bucket.

mod builder;
mod config;

pub use builder::{ids, ReplicationPlan, ReplicationPlanBuilder, Stage};
pub use config::ReplicationConfig;
