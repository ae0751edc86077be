use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::graph::NodeId;

/// A value inside a resource payload: either known at plan time or resolved
/// by the provisioning platform from another node of the same graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Expr {
    Lit(String),
    /// The ARN attribute of another node.
    Arn(NodeId),
    /// The physical name of another node.
    Ref(NodeId),
}

impl Expr {
    pub fn lit(s: impl Into<String>) -> Self { Expr::Lit(s.into()) }

    /// The node this expression points at, if any.
    pub fn references(&self) -> Option<&NodeId> {
        match self {
            Expr::Lit(_) => None,
            Expr::Arn(id) | Expr::Ref(id) => Some(id),
        }
    }

    pub fn as_lit(&self) -> Option<&str> {
        match self { Expr::Lit(s) => Some(s), _ => None }
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self { Expr::Lit(s.to_string()) }
}

impl From<String> for Expr {
    fn from(s: String) -> Self { Expr::Lit(s) }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Expr::Lit(s) => serializer.serialize_str(s),
            Expr::Arn(id) => {
                let mut m = serializer.serialize_map(Some(1))?;
                m.serialize_entry("Fn::GetAtt", &[id.as_str(), "Arn"])?;
                m.end()
            }
            Expr::Ref(id) => {
                let mut m = serializer.serialize_map(Some(1))?;
                m.serialize_entry("Ref", id.as_str())?;
                m.end()
            }
        }
    }
}
