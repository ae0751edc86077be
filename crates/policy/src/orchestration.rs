//! Statements for the primary bucket policy and for the stack set
//! administration/execution role pair.

use geovault_core::{naming, Expr, NodeId};

use crate::document::{PolicyStatement, Principal};

/// Deny statements on the primary bucket, applying to every principal.
pub fn deny_destruction(bucket: &str) -> Vec<PolicyStatement> {
    vec![
        PolicyStatement::deny(["s3:DeleteBucket"], [Expr::lit(naming::bucket_arn(bucket))])
            .with_sid("DenyDeleteBucket")
            .with_principal(Principal::Any),
        PolicyStatement::deny(["s3:DeleteObjectVersion"], [Expr::lit(naming::objects_arn(bucket))])
            .with_sid("DenyDeleteObjectVersion")
            .with_principal(Principal::Any),
    ]
}

/// The administration role may do nothing but assume the execution role.
pub fn admin_assume_execution(execution_role: &NodeId) -> PolicyStatement {
    PolicyStatement::allow(["sts:AssumeRole"], [Expr::Arn(execution_role.clone())]).with_sid("AssumeExecutionRole")
}

/// What the execution role needs to create each region's replica stack.
///
/// Keys are created in regions this plan never addresses directly, so KMS is
/// granted on `*`; S3 is confined to the replica bucket name pattern.
pub fn execution_grants(bucket: &str, home_region: &str, account: &str) -> Vec<PolicyStatement> {
    let stack_set = naming::stack_set_name(bucket);
    vec![
        PolicyStatement::allow(["kms:*"], [Expr::lit("*")]).with_sid("AllowKMS"),
        PolicyStatement::allow(["s3:*"], [Expr::lit(naming::replica_bucket_arn_pattern(bucket))]).with_sid("AllowS3"),
        PolicyStatement::allow(
            ["cloudformation:*", "iam:PassRole", "iam:CreateServiceLinkedRole"],
            [
                Expr::lit(format!("arn:aws:cloudformation:{home_region}:{account}:stackset/{stack_set}:*")),
                Expr::lit(format!("arn:aws:cloudformation:*:{account}:stack/StackSet-{stack_set}*")),
            ],
        )
        .with_sid("CFPermissions"),
    ]
}
