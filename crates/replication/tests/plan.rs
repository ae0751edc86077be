use geovault_aws::{AwsResource, RegionConcurrency, StorageClass};
use geovault_core::{Expr, NodeId, PlanError};
use geovault_policy::{Effect, Principal};
use geovault_replication::{ids, ReplicationConfig, ReplicationPlanBuilder};

const TEMPLATE: &str = "AWSTemplateFormatVersion: '2010-09-09'\nResources: {}\n";

fn config(regions: &[&str]) -> ReplicationConfig {
    ReplicationConfig::new("wese-archive", "123456789012", "eu-central-1", regions.iter().map(|r| r.to_string()).collect())
}

fn node(s: &str) -> NodeId { NodeId::new(s) }

#[test]
fn two_region_archive() {
    let plan = ReplicationPlanBuilder::build(&config(&["eu-west-1", "eu-north-1"]), TEMPLATE).unwrap();

    let rules = plan.rules();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0].id, "eu-west-1");
    assert_eq!(rules[0].priority, 0);
    assert_eq!(rules[0].destination_bucket, "arn:aws:s3:::wese-archive-replication-eu-west-1");
    assert_eq!(rules[0].replica_kms_key_id, "arn:aws:kms:eu-west-1:123456789012:alias/wese-archive/replication");
    assert_eq!(rules[1].id, "eu-north-1");
    assert_eq!(rules[1].priority, 1);
    assert_eq!(rules[1].destination_bucket, "arn:aws:s3:::wese-archive-replication-eu-north-1");
    assert!(rules.iter().all(|r| r.delete_marker_replication && r.sse_kms_encrypted_objects && r.storage_class.is_none()));

    let statements = plan.replication_statements();
    for region in ["eu-west-1", "eu-north-1"] {
        let scoped = statements
            .iter()
            .filter(|s| s.resource.iter().filter_map(Expr::as_lit).any(|r| r.contains(region)))
            .count();
        assert_eq!(scoped, 3, "grants scoped to {region}");
    }
    assert_eq!(statements.len(), 9);
    assert_eq!(plan.stack_name, "wese-archive-archive");
}

#[test]
fn priorities_follow_input_order() {
    let plan = ReplicationPlanBuilder::build(&config(&["us-east-1", "eu-west-1", "ap-southeast-2"]), TEMPLATE).unwrap();
    let got: Vec<(&str, u32)> = plan.rules().iter().map(|r| (r.id.as_str(), r.priority)).collect();
    assert_eq!(got, vec![("us-east-1", 0), ("eu-west-1", 1), ("ap-southeast-2", 2)]);
}

#[test]
fn empty_region_list_builds_nothing() {
    let c = config(&[]);
    let err = ReplicationPlanBuilder::new(&c, TEMPLATE).err().unwrap();
    assert!(matches!(err, PlanError::Configuration(_)));
    assert!(matches!(ReplicationPlanBuilder::build(&c, TEMPLATE), Err(PlanError::Configuration(_))));
}

#[test]
fn duplicate_region_is_reported() {
    let err = ReplicationPlanBuilder::build(&config(&["eu-west-1", "eu-west-1"]), TEMPLATE).unwrap_err();
    assert!(matches!(&err, PlanError::Configuration(msg) if msg.contains("eu-west-1")));
}

#[test]
fn primary_is_protected_from_deletion() {
    for regions in [&["eu-west-1"][..], &["eu-west-1", "eu-north-1", "us-east-1"][..]] {
        let plan = ReplicationPlanBuilder::build(&config(regions), TEMPLATE).unwrap();
        let deny = plan.deny_statements();
        assert_eq!(deny.len(), 2);
        assert!(deny.iter().all(|s| s.effect == Effect::Deny && s.principal == Some(Principal::Any)));
        assert_eq!(deny[0].action, vec!["s3:DeleteBucket"]);
        assert_eq!(deny[1].action, vec!["s3:DeleteObjectVersion"]);
    }
}

#[test]
fn rules_wait_for_stack_set_admission() {
    let plan = ReplicationPlanBuilder::build(&config(&["eu-west-1", "eu-north-1"]), TEMPLATE).unwrap();
    let g = &plan.graph;
    assert!(g.has_edge(&node(ids::STACK_SET), &node(ids::REPLICATION_RULES)));
    assert!(g.has_edge(&node(ids::REPLICATION_POLICY), &node(ids::REPLICATION_RULES)));

    let order: Vec<&str> = g.topological_order().unwrap().into_iter().map(NodeId::as_str).collect();
    let pos = |n: &str| order.iter().position(|x| *x == n).unwrap();
    assert!(pos(ids::KEY) < pos(ids::BUCKET));
    assert!(pos(ids::BUCKET) < pos(ids::BUCKET_POLICY));
    assert!(pos(ids::EXECUTION_ROLE) < pos(ids::STACK_SET));
    assert!(pos(ids::STACK_SET) < pos(ids::REPLICATION_RULES));
    assert_eq!(order.last(), Some(&ids::REPLICATION_RULES));
}

#[test]
fn one_parallel_stack_set_covers_all_regions() {
    let plan = ReplicationPlanBuilder::build(&config(&["eu-west-1", "eu-north-1"]), TEMPLATE).unwrap();
    let stack_sets: Vec<&AwsResource> =
        plan.graph.nodes().map(|n| &n.resource).filter(|r| matches!(r, AwsResource::StackSet { .. })).collect();
    assert_eq!(stack_sets.len(), 1);
    let AwsResource::StackSet { stack_set_name, concurrency, parameters, regions, accounts, template_body, .. } = stack_sets[0] else {
        unreachable!()
    };
    assert_eq!(stack_set_name, "wese-archive-replication");
    assert_eq!(*concurrency, RegionConcurrency::Parallel);
    assert_eq!(regions, &vec!["eu-west-1".to_string(), "eu-north-1".to_string()]);
    assert_eq!(accounts, &vec!["123456789012".to_string()]);
    assert_eq!(template_body, TEMPLATE);
    assert_eq!(
        parameters,
        &vec![
            ("SourceBucket".to_string(), Expr::lit("wese-archive")),
            ("ReplicationRole".to_string(), Expr::Arn(node(ids::REPLICATION_ROLE))),
        ]
    );
}

#[test]
fn admin_role_can_only_assume_execution_role() {
    let plan = ReplicationPlanBuilder::build(&config(&["eu-west-1"]), TEMPLATE).unwrap();
    let Some(AwsResource::IamRole { assumed_by, inline_policies, .. }) = plan.graph.node(&node(ids::ADMIN_ROLE)).map(|n| &n.resource)
    else {
        panic!("admin role missing")
    };
    assert_eq!(*assumed_by, Principal::Service("cloudformation.amazonaws.com".into()));
    let statements: Vec<_> = inline_policies.iter().flat_map(|p| p.document.statement.iter()).collect();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].action, vec!["sts:AssumeRole"]);
    assert_eq!(statements[0].resource, vec![Expr::Arn(node(ids::EXECUTION_ROLE))]);
}

#[test]
fn storage_class_applies_uniformly_unless_overridden() {
    let mut c = config(&["eu-west-1", "eu-north-1"]);
    c.destination_storage_class = Some(StorageClass::StandardIa);
    c.storage_class_overrides.insert("eu-north-1".into(), StorageClass::DeepArchive);
    let plan = ReplicationPlanBuilder::build(&c, TEMPLATE).unwrap();
    let classes: Vec<_> = plan.rules().iter().map(|r| r.storage_class).collect();
    assert_eq!(classes, vec![Some(StorageClass::StandardIa), Some(StorageClass::DeepArchive)]);
}

#[test]
fn identical_input_yields_identical_plan() {
    let c = config(&["eu-west-1", "eu-north-1"]);
    let a = ReplicationPlanBuilder::build(&c, TEMPLATE).unwrap();
    let b = ReplicationPlanBuilder::build(&c, TEMPLATE).unwrap();
    assert_eq!(a.rules(), b.rules());
    assert_eq!(a.replication_statements(), b.replication_statements());
    assert_eq!(a.graph.edges(), b.graph.edges());
    let ids_a: Vec<_> = a.graph.nodes().map(|n| &n.id).collect();
    let ids_b: Vec<_> = b.graph.nodes().map(|n| &n.id).collect();
    assert_eq!(ids_a, ids_b);
}

#[test]
fn plan_creates_primary_key_and_alias() {
    let plan = ReplicationPlanBuilder::build(&config(&["eu-west-1"]), TEMPLATE).unwrap();
    let g = &plan.graph;
    let Some(AwsResource::KmsKey { enable_key_rotation, admin_account, .. }) = g.node(&node(ids::KEY)).map(|n| &n.resource) else {
        panic!("key missing")
    };
    assert!(!enable_key_rotation);
    assert_eq!(admin_account, "123456789012");
    let Some(AwsResource::KmsAlias { alias_name, target_key }) = g.node(&node(ids::KEY_ALIAS)).map(|n| &n.resource) else {
        panic!("alias missing")
    };
    assert_eq!(alias_name, "alias/wese-archive");
    assert_eq!(*target_key, Expr::Ref(node(ids::KEY)));
    assert!(g.has_edge(&node(ids::KEY), &node(ids::KEY_ALIAS)));
    assert!(g.has_edge(&node(ids::KEY), &node(ids::BUCKET)));
    assert!(g.has_edge(&node(ids::KEY), &node(ids::REPLICATION_POLICY)));

    let Some(AwsResource::S3Bucket { kms_key, .. }) = g.node(&node(ids::BUCKET)).map(|n| &n.resource) else {
        panic!("bucket missing")
    };
    assert_eq!(*kms_key, Expr::Arn(node(ids::KEY)));
}

#[test]
fn supplied_key_replaces_plan_key() {
    let arn = "arn:aws:kms:eu-central-1:123456789012:key/1234abcd-12ab-34cd-56ef-1234567890ab";
    let mut c = config(&["eu-west-1", "eu-north-1"]);
    c.encryption_key_arn = Some(arn.into());
    let plan = ReplicationPlanBuilder::build(&c, TEMPLATE).unwrap();
    let g = &plan.graph;
    assert!(!g.contains(&node(ids::KEY)));
    assert!(!g.contains(&node(ids::KEY_ALIAS)));
    assert!(g.edges().iter().all(|(from, _)| from.as_str() != ids::KEY));

    let Some(AwsResource::S3Bucket { kms_key, .. }) = g.node(&node(ids::BUCKET)).map(|n| &n.resource) else {
        panic!("bucket missing")
    };
    assert_eq!(*kms_key, Expr::lit(arn));
    let decrypt: Vec<_> = plan.replication_statements().iter().filter(|s| s.action == vec!["kms:Decrypt"]).collect();
    assert_eq!(decrypt.len(), 1);
    assert_eq!(decrypt[0].resource, vec![Expr::lit(arn)]);
    assert!(g.has_edge(&node(ids::STACK_SET), &node(ids::REPLICATION_RULES)));
}

#[test]
fn home_region_can_hold_a_replica() {
    let plan = ReplicationPlanBuilder::build(&config(&["eu-central-1", "eu-west-1"]), TEMPLATE).unwrap();
    assert_eq!(plan.rules()[0].destination_bucket, "arn:aws:s3:::wese-archive-replication-eu-central-1");
}

#[test]
fn replication_role_is_assumed_only_by_s3() {
    let plan = ReplicationPlanBuilder::build(&config(&["eu-west-1"]), TEMPLATE).unwrap();
    let Some(AwsResource::IamRole { assumed_by, path, inline_policies, .. }) =
        plan.graph.node(&node(ids::REPLICATION_ROLE)).map(|n| &n.resource)
    else {
        panic!("replication role missing")
    };
    assert_eq!(*assumed_by, Principal::Service("s3.amazonaws.com".into()));
    assert_eq!(path.as_deref(), Some("/service-role/"));
    assert!(inline_policies.is_empty());
}

#[test]
fn execution_role_is_assumed_by_the_account() {
    let plan = ReplicationPlanBuilder::build(&config(&["eu-west-1"]), TEMPLATE).unwrap();
    let Some(AwsResource::IamRole { assumed_by, .. }) = plan.graph.node(&node(ids::EXECUTION_ROLE)).map(|n| &n.resource) else {
        panic!("execution role missing")
    };
    assert_eq!(*assumed_by, Principal::Account("123456789012".into()));
}
