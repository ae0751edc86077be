//! IAM policy documents for the replicated bucket: the replication grant
//! synthesizer, orchestration role statements, and plan-time checks over a
//! rendered template.

mod check;
mod document;
pub mod orchestration;
pub mod synthesizer;

pub use check::Policy;
pub use document::{Effect, PolicyDocument, PolicyStatement, Principal};
pub use synthesizer::{synthesize, ReplicationScope};
