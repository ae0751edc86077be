//! Least-privilege grants for the replication role.
//!
//! The output is a pure function of the [`ReplicationScope`]: statements come
//! out in a fixed order (source bucket, source objects, source key, then one
//! group of three per replica region in input order), so two calls with the
//! same scope compare equal.

use std::collections::HashSet;

use geovault_core::{naming, Expr, PlanError};

use crate::document::PolicyStatement;

pub const SOURCE_BUCKET_ACTIONS: [&str; 2] = ["s3:GetReplicationConfiguration", "s3:ListBucket"];

pub const SOURCE_OBJECT_ACTIONS: [&str; 4] = [
    "s3:GetObjectVersion",
    "s3:GetObjectVersionAcl",
    "s3:GetObjectVersionForReplication",
    "s3:GetObjectVersionTagging",
];

pub const REPLICA_WRITE_ACTIONS: [&str; 3] = ["s3:ReplicateDelete", "s3:ReplicateObject", "s3:ReplicateTags"];

pub const REPLICA_BUCKET_ACTIONS: [&str; 3] = ["s3:List*", "s3:GetBucketVersioning", "s3:PutBucketVersioning"];

/// Everything the replication role must reach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationScope {
    /// Name of the primary bucket; replica names derive from it.
    pub bucket: String,
    /// Key the primary bucket is encrypted with.
    pub key: Expr,
    /// Replica regions, in rule priority order.
    pub regions: Vec<String>,
    pub account: String,
}

pub fn synthesize(scope: &ReplicationScope) -> Result<Vec<PolicyStatement>, PlanError> {
    check_regions(&scope.regions)?;
    let bucket = scope.bucket.as_str();

    let mut out = Vec::with_capacity(3 + 3 * scope.regions.len());
    out.push(PolicyStatement::allow(SOURCE_BUCKET_ACTIONS, [Expr::lit(naming::bucket_arn(bucket))]).with_sid("SourceBucketRead"));
    out.push(
        PolicyStatement::allow(SOURCE_OBJECT_ACTIONS, [Expr::lit(naming::objects_arn(bucket))]).with_sid("SourceObjectVersionRead"),
    );
    out.push(PolicyStatement::allow(["kms:Decrypt"], [scope.key.clone()]).with_sid("SourceKeyDecrypt"));

    for region in &scope.regions {
        let frag = naming::sid_fragment(region);
        out.push(
            PolicyStatement::allow(["kms:Encrypt"], [Expr::lit(naming::replica_key_alias_arn(bucket, region, &scope.account))])
                .with_sid(format!("ReplicaEncrypt{frag}")),
        );
        out.push(
            PolicyStatement::allow(REPLICA_WRITE_ACTIONS, [Expr::lit(naming::replica_objects_arn(bucket, region))])
                .with_sid(format!("ReplicaWrite{frag}")),
        );
        out.push(
            PolicyStatement::allow(REPLICA_BUCKET_ACTIONS, [Expr::lit(naming::replica_bucket_arn(bucket, region))])
                .with_sid(format!("ReplicaBucket{frag}")),
        );
    }
    tracing::debug!(bucket, regions = scope.regions.len(), statements = out.len(), "synthesized replication grants");
    Ok(out)
}

/// Rejects an empty region list and repeated regions.
pub fn check_regions(regions: &[String]) -> Result<(), PlanError> {
    if regions.is_empty() {
        return Err(PlanError::config("replicate_to is empty; at least one replica region is required"));
    }
    let mut seen = HashSet::new();
    for (i, region) in regions.iter().enumerate() {
        if !seen.insert(region.as_str()) {
            return Err(PlanError::config(format!(
                "replicate_to lists region '{region}' more than once (again at position {i}); rule priorities would collide"
            )));
        }
    }
    Ok(())
}
