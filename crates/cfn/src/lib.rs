use std::collections::{BTreeMap, HashSet};

use geovault_aws::ResourceGraph;
use geovault_core::{NodeId, PlanError, PlanGraph, RemovalPolicy};
use serde_json::{Map as JsonMap, Value as Json};

mod provision;

pub use provision::{delete_stack, deploy_stack, set_termination_protection, ProvisioningError, StackOptions};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CfnResource {
    #[serde(rename = "Type")]
    pub type_name: String,
    #[serde(rename = "Properties", default)]
    pub properties: JsonMap<String, Json>,
    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(rename = "DeletionPolicy", default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
    #[serde(rename = "UpdateReplacePolicy", default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CfnTemplate {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub version: Option<String>,
    #[serde(rename = "Description")]
    pub description: Option<String>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, CfnResource>,
}

impl CfnTemplate {
    pub fn to_json(&self) -> Result<Json, serde_json::Error> { serde_json::to_value(self) }
}

/// Renders a plan graph into one template.
///
/// Payloads embedded in another node (the replication rule table) become a
/// property of their host, and the host inherits their dependencies. Edges
/// already implied by a reference inside the properties are not repeated in
/// `DependsOn`.
#[tracing::instrument(skip_all, fields(nodes = graph.len()))]
pub fn render(graph: &ResourceGraph, description: &str) -> Result<CfnTemplate, PlanError> {
    for node in graph.nodes() {
        for r in node.resource.references() {
            if !graph.contains(r) { return Err(PlanError::UnknownNode(r.clone())); }
        }
    }
    let host_of = |id: &NodeId| -> NodeId {
        graph.node(id).and_then(|n| n.resource.embedded_in()).cloned().unwrap_or_else(|| id.clone())
    };

    let mut resources: BTreeMap<String, CfnResource> = BTreeMap::new();
    let mut order: Vec<NodeId> = Vec::new();
    let mut implied: BTreeMap<NodeId, HashSet<NodeId>> = BTreeMap::new();
    let mut deps: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();

    for node in graph.nodes().filter(|n| n.resource.embedded_in().is_none()) {
        let props = match node.resource.to_cfn_properties() {
            Json::Object(m) => m,
            _ => JsonMap::new(),
        };
        let retain = (node.removal == RemovalPolicy::Retain).then(|| "Retain".to_string());
        resources.insert(node.id.0.clone(), CfnResource {
            type_name: node.resource.type_name().to_string(),
            properties: props,
            depends_on: Vec::new(),
            deletion_policy: retain.clone(),
            update_replace_policy: retain,
        });
        order.push(node.id.clone());
    }

    for node in graph.nodes() {
        let target = host_of(&node.id);
        let Some(res) = resources.get_mut(target.as_str()) else {
            return Err(PlanError::UnknownNode(target));
        };
        if let Some(host) = node.resource.embedded_in() {
            if res.type_name != "AWS::S3::Bucket" {
                return Err(PlanError::config(format!("'{}' can only be embedded in a bucket, not '{host}'", node.id)));
            }
            res.properties.insert("ReplicationConfiguration".into(), node.resource.to_cfn_properties());
        }
        let refs = implied.entry(target.clone()).or_default();
        refs.extend(node.resource.references().into_iter().map(&host_of).filter(|h| *h != target));
        let entry = deps.entry(target.clone()).or_default();
        for d in graph.dependencies_of(&node.id) {
            let d = host_of(d);
            if d != target && !entry.contains(&d) { entry.push(d); }
        }
    }

    let mut check: PlanGraph<()> = PlanGraph::new();
    for id in &order {
        check.add_node(id.clone(), (), RemovalPolicy::Destroy)?;
    }
    for id in &order {
        let explicit = deps.get(id).cloned().unwrap_or_default();
        let refs = implied.get(id).cloned().unwrap_or_default();
        for d in explicit.iter().chain(refs.iter()) {
            check.add_edge(d, id)?;
        }
        if let Some(res) = resources.get_mut(id.as_str()) {
            res.depends_on = explicit.into_iter().filter(|d| !refs.contains(d)).map(|d| d.0).collect();
        }
    }
    check.topological_order()?;
    tracing::debug!(resources = resources.len(), "rendered template");

    Ok(CfnTemplate {
        version: Some("2010-09-09".to_string()),
        description: Some(description.to_string()),
        resources,
    })
}
