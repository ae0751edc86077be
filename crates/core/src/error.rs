use thiserror::Error;

use crate::graph::NodeId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Invalid caller input. Raised before any node is added to a graph.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A node was attached without the dependency edge its ordering requires.
    #[error("dependency ordering violated: '{node}' must depend on '{missing}'")]
    DependencyOrdering { node: NodeId, missing: NodeId },
    /// A plan construction step was invoked before the step it builds on.
    #[error("plan step '{step}' requires stage {required}, plan is at {current}")]
    OutOfOrder { step: &'static str, required: &'static str, current: &'static str },
    #[error("duplicate node '{0}'")]
    DuplicateNode(NodeId),
    #[error("unknown node '{0}'")]
    UnknownNode(NodeId),
    #[error("dependency cycle detected at '{0}'")]
    Cycle(NodeId),
}

impl PlanError {
    pub fn config(msg: impl Into<String>) -> Self {
        PlanError::Configuration(msg.into())
    }
}
