use std::collections::BTreeMap;

use geovault_aws::{AwsResource, InlinePolicy, RegionConcurrency, ReplicationRule, ResourceGraph, RuleStatus};
use geovault_core::{naming, Expr, NodeId, PlanError, RemovalPolicy};
use geovault_policy::{orchestration, synthesize, PolicyDocument, PolicyStatement, Principal, ReplicationScope};

use crate::config::ReplicationConfig;

/// Logical ids of the nodes a replication plan contains.
pub mod ids {
    pub const KEY: &str = "Key";
    pub const KEY_ALIAS: &str = "KeyAlias";
    pub const BUCKET: &str = "Bucket";
    pub const BUCKET_POLICY: &str = "BucketPolicy";
    pub const EXECUTION_ROLE: &str = "StackSetExecutionRole";
    pub const EXECUTION_POLICY: &str = "StackSetExecutionRoleDefaultPolicy";
    pub const ADMIN_ROLE: &str = "StackSetAdminRole";
    pub const REPLICATION_ROLE: &str = "ReplicationRole";
    pub const STACK_SET: &str = "StackSet";
    pub const REPLICATION_POLICY: &str = "ReplicationRoleDefaultPolicy";
    pub const REPLICATION_RULES: &str = "ReplicationRules";
}

const S3_SERVICE: &str = "s3.amazonaws.com";
const CLOUDFORMATION_SERVICE: &str = "cloudformation.amazonaws.com";

/// Construction stages, in the only order the builder accepts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Empty,
    KeyProvisioned,
    PrimaryCreated,
    DenyPoliciesAttached,
    OrchestrationRolesCreated,
    ReplicaSetsRequested,
    PermissionsGranted,
    ReplicationRulesAttached,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Empty => "Empty",
            Stage::KeyProvisioned => "KeyProvisioned",
            Stage::PrimaryCreated => "PrimaryCreated",
            Stage::DenyPoliciesAttached => "DenyPoliciesAttached",
            Stage::OrchestrationRolesCreated => "OrchestrationRolesCreated",
            Stage::ReplicaSetsRequested => "ReplicaSetsRequested",
            Stage::PermissionsGranted => "PermissionsGranted",
            Stage::ReplicationRulesAttached => "ReplicationRulesAttached",
        }
    }
}

/// The finished resource graph plus the stack-level settings the
/// provisioning platform needs to realize it.
#[derive(Debug, Clone)]
pub struct ReplicationPlan {
    pub graph: ResourceGraph,
    pub stack_name: String,
    pub region: String,
    pub tags: BTreeMap<String, String>,
    pub termination_protection: bool,
}

impl ReplicationPlan {
    pub fn rules(&self) -> &[ReplicationRule] {
        match self.graph.node(&id(ids::REPLICATION_RULES)).map(|n| &n.resource) {
            Some(AwsResource::ReplicationRuleTable { rules, .. }) => rules,
            _ => &[],
        }
    }

    /// Statements attached to the replication role.
    pub fn replication_statements(&self) -> &[PolicyStatement] {
        match self.graph.node(&id(ids::REPLICATION_POLICY)).map(|n| &n.resource) {
            Some(AwsResource::IamPolicy { document, .. }) => &document.statement,
            _ => &[],
        }
    }

    pub fn deny_statements(&self) -> &[PolicyStatement] {
        match self.graph.node(&id(ids::BUCKET_POLICY)).map(|n| &n.resource) {
            Some(AwsResource::BucketPolicy { document, .. }) => &document.statement,
            _ => &[],
        }
    }
}

fn id(s: &str) -> NodeId { NodeId::new(s) }

/// Builds a [`ReplicationPlan`] one stage at a time.
///
/// Each step checks that the previous one ran, so replication rules can only
/// be attached once the stack set request is part of the graph, and the rule
/// table always carries an edge from it.
pub struct ReplicationPlanBuilder<'a> {
    config: &'a ReplicationConfig,
    template_body: String,
    graph: ResourceGraph,
    stage: Stage,
}

impl<'a> ReplicationPlanBuilder<'a> {
    /// Validates `config`; nothing is added to the graph if that fails.
    pub fn new(config: &'a ReplicationConfig, template_body: impl Into<String>) -> Result<Self, PlanError> {
        config.validate()?;
        Ok(Self { config, template_body: template_body.into(), graph: ResourceGraph::new(), stage: Stage::Empty })
    }

    /// Runs every stage in order.
    #[tracing::instrument(skip_all, fields(bucket = %config.name, regions = config.replicate_to.len()))]
    pub fn build(config: &'a ReplicationConfig, template_body: impl Into<String>) -> Result<ReplicationPlan, PlanError> {
        let mut b = Self::new(config, template_body)?;
        b.provision_key()?;
        b.create_primary()?;
        b.attach_deny_policies()?;
        b.create_orchestration_roles()?;
        b.request_replica_sets()?;
        b.grant_permissions()?;
        b.attach_replication_rules()?;
        b.finish()
    }

    pub fn stage(&self) -> Stage { self.stage }

    pub fn graph(&self) -> &ResourceGraph { &self.graph }

    fn require_stage(&self, step: &'static str, required: Stage) -> Result<(), PlanError> {
        if self.stage == required {
            Ok(())
        } else {
            Err(PlanError::OutOfOrder { step, required: required.name(), current: self.stage.name() })
        }
    }

    fn reach(&mut self, stage: Stage) {
        tracing::info!(stage = stage.name(), nodes = self.graph.len(), "plan stage reached");
        self.stage = stage;
    }

    /// The key encrypting the primary: a node of this plan, or the caller's ARN.
    fn primary_key(&self) -> Expr {
        match &self.config.encryption_key_arn {
            Some(arn) => Expr::lit(arn.clone()),
            None => Expr::Arn(id(ids::KEY)),
        }
    }

    /// Adds the key edge to `node` when the key is part of this plan.
    fn after_key(&mut self, node: &NodeId) -> Result<(), PlanError> {
        if self.config.encryption_key_arn.is_none() {
            self.graph.add_edge(&id(ids::KEY), node)?;
        }
        Ok(())
    }

    /// Creates the key and its alias, unless the caller supplied a key.
    pub fn provision_key(&mut self) -> Result<(), PlanError> {
        self.require_stage("provision_key", Stage::Empty)?;
        let c = self.config;
        if let Some(arn) = &c.encryption_key_arn {
            tracing::info!(key = %arn, "using existing key");
            self.reach(Stage::KeyProvisioned);
            return Ok(());
        }
        let key = self.graph.add_node(
            id(ids::KEY),
            AwsResource::KmsKey {
                description: Some(format!("Encrypts the {} archive bucket", c.name)),
                enable_key_rotation: false,
                admin_account: c.account.clone(),
            },
            c.removal_policy,
        )?;
        let alias = self.graph.add_node(
            id(ids::KEY_ALIAS),
            AwsResource::KmsAlias { alias_name: naming::primary_key_alias(&c.name), target_key: Expr::Ref(key.clone()) },
            RemovalPolicy::Destroy,
        )?;
        self.graph.add_edge(&key, &alias)?;
        self.reach(Stage::KeyProvisioned);
        Ok(())
    }

    pub fn create_primary(&mut self) -> Result<(), PlanError> {
        self.require_stage("create_primary", Stage::KeyProvisioned)?;
        let c = self.config;
        if c.removal_policy == RemovalPolicy::Destroy {
            tracing::warn!(bucket = %c.name, "primary bucket and key are destroyed with the stack");
        }
        let kms_key = self.primary_key();
        let bucket = self.graph.add_node(
            id(ids::BUCKET),
            AwsResource::S3Bucket {
                bucket_name: c.name.clone(),
                kms_key,
                bucket_key_enabled: true,
                versioned: true,
                block_public_access: true,
                owner_enforced: true,
            },
            c.removal_policy,
        )?;
        self.after_key(&bucket)?;
        self.reach(Stage::PrimaryCreated);
        Ok(())
    }

    pub fn attach_deny_policies(&mut self) -> Result<(), PlanError> {
        self.require_stage("attach_deny_policies", Stage::PrimaryCreated)?;
        let policy = self.graph.add_node(
            id(ids::BUCKET_POLICY),
            AwsResource::BucketPolicy {
                bucket: Expr::Ref(id(ids::BUCKET)),
                document: PolicyDocument::new(orchestration::deny_destruction(&self.config.name)),
            },
            RemovalPolicy::Destroy,
        )?;
        self.graph.add_edge(&id(ids::BUCKET), &policy)?;
        self.reach(Stage::DenyPoliciesAttached);
        Ok(())
    }

    pub fn create_orchestration_roles(&mut self) -> Result<(), PlanError> {
        self.require_stage("create_orchestration_roles", Stage::DenyPoliciesAttached)?;
        let c = self.config;
        let g = &mut self.graph;

        let execution = g.add_node(
            id(ids::EXECUTION_ROLE),
            AwsResource::IamRole {
                assumed_by: Principal::Account(c.account.clone()),
                path: None,
                description: Some("This role executes the stack set for this bucket".into()),
                inline_policies: Vec::new(),
            },
            RemovalPolicy::Destroy,
        )?;
        let execution_policy = g.add_node(
            id(ids::EXECUTION_POLICY),
            AwsResource::IamPolicy {
                policy_name: format!("{}-stackset-execution", c.name),
                roles: vec![Expr::Ref(execution.clone())],
                document: PolicyDocument::new(orchestration::execution_grants(&c.name, &c.region, &c.account)),
            },
            RemovalPolicy::Destroy,
        )?;
        g.add_edge(&execution, &execution_policy)?;

        let admin = g.add_node(
            id(ids::ADMIN_ROLE),
            AwsResource::IamRole {
                assumed_by: Principal::Service(CLOUDFORMATION_SERVICE.into()),
                path: None,
                description: Some("This role is Admin for the stackSet".into()),
                inline_policies: vec![InlinePolicy {
                    name: "assumeRole".into(),
                    document: PolicyDocument::new(vec![orchestration::admin_assume_execution(&execution)]),
                }],
            },
            RemovalPolicy::Destroy,
        )?;
        g.add_edge(&execution, &admin)?;

        g.add_node(
            id(ids::REPLICATION_ROLE),
            AwsResource::IamRole {
                assumed_by: Principal::Service(S3_SERVICE.into()),
                path: Some("/service-role/".into()),
                description: None,
                inline_policies: Vec::new(),
            },
            RemovalPolicy::Destroy,
        )?;
        self.reach(Stage::OrchestrationRolesCreated);
        Ok(())
    }

    /// One stack set covering every replica region, deployed in parallel.
    pub fn request_replica_sets(&mut self) -> Result<(), PlanError> {
        self.require_stage("request_replica_sets", Stage::OrchestrationRolesCreated)?;
        let c = self.config;
        let stack_set = self.graph.add_node(
            id(ids::STACK_SET),
            AwsResource::StackSet {
                stack_set_name: naming::stack_set_name(&c.name),
                administration_role: Expr::Arn(id(ids::ADMIN_ROLE)),
                execution_role_name: Expr::Ref(id(ids::EXECUTION_ROLE)),
                concurrency: RegionConcurrency::Parallel,
                parameters: vec![
                    ("SourceBucket".into(), Expr::lit(c.name.clone())),
                    ("ReplicationRole".into(), Expr::Arn(id(ids::REPLICATION_ROLE))),
                ],
                regions: c.replicate_to.clone(),
                accounts: vec![c.account.clone()],
                template_body: self.template_body.clone(),
            },
            RemovalPolicy::Destroy,
        )?;
        for dep in [ids::EXECUTION_ROLE, ids::EXECUTION_POLICY, ids::ADMIN_ROLE, ids::REPLICATION_ROLE] {
            self.graph.add_edge(&id(dep), &stack_set)?;
        }
        self.reach(Stage::ReplicaSetsRequested);
        Ok(())
    }

    pub fn grant_permissions(&mut self) -> Result<(), PlanError> {
        self.require_stage("grant_permissions", Stage::ReplicaSetsRequested)?;
        let c = self.config;
        let statements = synthesize(&ReplicationScope {
            bucket: c.name.clone(),
            key: self.primary_key(),
            regions: c.replicate_to.clone(),
            account: c.account.clone(),
        })?;
        let policy = self.graph.add_node(
            id(ids::REPLICATION_POLICY),
            AwsResource::IamPolicy {
                policy_name: format!("{}-replication", c.name),
                roles: vec![Expr::Ref(id(ids::REPLICATION_ROLE))],
                document: PolicyDocument::new(statements),
            },
            RemovalPolicy::Destroy,
        )?;
        self.graph.add_edge(&id(ids::REPLICATION_ROLE), &policy)?;
        self.after_key(&policy)?;
        self.reach(Stage::PermissionsGranted);
        Ok(())
    }

    /// Priority is the region's position in `replicate_to`.
    pub fn attach_replication_rules(&mut self) -> Result<(), PlanError> {
        self.require_stage("attach_replication_rules", Stage::PermissionsGranted)?;
        let c = self.config;
        let rules = c
            .replicate_to
            .iter()
            .enumerate()
            .map(|(i, region)| ReplicationRule {
                id: region.clone(),
                priority: i as u32,
                destination_bucket: naming::replica_bucket_arn(&c.name, region),
                replica_kms_key_id: naming::replica_key_alias_arn(&c.name, region, &c.account),
                storage_class: c.storage_class_for(region),
                delete_marker_replication: true,
                sse_kms_encrypted_objects: true,
                status: RuleStatus::Enabled,
            })
            .collect();
        let table = self.graph.add_node(
            id(ids::REPLICATION_RULES),
            AwsResource::ReplicationRuleTable {
                bucket: id(ids::BUCKET),
                role: Expr::Arn(id(ids::REPLICATION_ROLE)),
                rules,
            },
            RemovalPolicy::Destroy,
        )?;
        for dep in [ids::STACK_SET, ids::BUCKET, ids::REPLICATION_POLICY] {
            self.graph.add_edge(&id(dep), &table)?;
        }
        self.reach(Stage::ReplicationRulesAttached);
        Ok(())
    }

    /// Hands the graph off. Fails unless every stage ran and the rule table
    /// waits on the stack set.
    pub fn finish(self) -> Result<ReplicationPlan, PlanError> {
        self.require_stage("finish", Stage::ReplicationRulesAttached)?;
        self.graph.require_edge(&id(ids::STACK_SET), &id(ids::REPLICATION_RULES))?;
        self.graph.topological_order()?;
        let c = self.config;
        Ok(ReplicationPlan {
            graph: self.graph,
            stack_name: c.stack_name(),
            region: c.region.clone(),
            tags: c.tags.clone(),
            termination_protection: c.termination_protection,
        })
    }
}
