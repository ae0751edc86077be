//! Plan graph primitives shared by the synthesizer, the builder and the renderer.

mod error;
mod expr;
mod graph;
pub mod naming;

pub use error::PlanError;
pub use expr::Expr;
pub use graph::{NodeId, PlanGraph, PlanNode, RemovalPolicy};
