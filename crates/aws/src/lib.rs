use geovault_core::{Expr, NodeId, PlanGraph};
use geovault_policy::{PolicyDocument, Principal};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};

pub type ResourceGraph = PlanGraph<AwsResource>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageClass {
    Standard,
    StandardIa,
    OnezoneIa,
    IntelligentTiering,
    GlacierIr,
    Glacier,
    DeepArchive,
    ReducedRedundancy,
}

impl StorageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageClass::Standard => "STANDARD",
            StorageClass::StandardIa => "STANDARD_IA",
            StorageClass::OnezoneIa => "ONEZONE_IA",
            StorageClass::IntelligentTiering => "INTELLIGENT_TIERING",
            StorageClass::GlacierIr => "GLACIER_IR",
            StorageClass::Glacier => "GLACIER",
            StorageClass::DeepArchive => "DEEP_ARCHIVE",
            StorageClass::ReducedRedundancy => "REDUCED_REDUNDANCY",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleStatus {
    #[default]
    Enabled,
    Disabled,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self { RuleStatus::Enabled => "Enabled", RuleStatus::Disabled => "Disabled" }
    }
}

/// One entry of the primary bucket's replication table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicationRule {
    /// The replica region; doubles as the rule id.
    pub id: String,
    /// Position in the configured region list. Lower wins.
    pub priority: u32,
    pub destination_bucket: String,
    pub replica_kms_key_id: String,
    pub storage_class: Option<StorageClass>,
    pub delete_marker_replication: bool,
    pub sse_kms_encrypted_objects: bool,
    pub status: RuleStatus,
}

impl ReplicationRule {
    pub fn to_cfn_json(&self) -> Json {
        let enabled = |on: bool| if on { "Enabled" } else { "Disabled" };
        let mut destination = json!({
            "Bucket": self.destination_bucket,
            "EncryptionConfiguration": { "ReplicaKmsKeyID": self.replica_kms_key_id },
        });
        if let Some(sc) = self.storage_class { destination["StorageClass"] = json!(sc.as_str()); }
        json!({
            "Id": self.id,
            "Priority": self.priority,
            "Status": self.status.as_str(),
            "Filter": { "Prefix": "" },
            "Destination": destination,
            "DeleteMarkerReplication": { "Status": enabled(self.delete_marker_replication) },
            "SourceSelectionCriteria": { "SseKmsEncryptedObjects": { "Status": enabled(self.sse_kms_encrypted_objects) } },
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum RegionConcurrency {
    #[default]
    Parallel,
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlinePolicy { pub name: String, pub document: PolicyDocument }

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum AwsResource {
    KmsKey {
        description: Option<String>,
        enable_key_rotation: bool,
        /// Account that administers the key through its own IAM policies.
        admin_account: String,
    },
    KmsAlias { alias_name: String, target_key: Expr },
    S3Bucket {
        bucket_name: String,
        kms_key: Expr,
        bucket_key_enabled: bool,
        versioned: bool,
        block_public_access: bool,
        owner_enforced: bool,
    },
    BucketPolicy { bucket: Expr, document: PolicyDocument },
    IamRole {
        assumed_by: Principal,
        path: Option<String>,
        description: Option<String>,
        inline_policies: Vec<InlinePolicy>,
    },
    IamPolicy { policy_name: String, roles: Vec<Expr>, document: PolicyDocument },
    StackSet {
        stack_set_name: String,
        administration_role: Expr,
        execution_role_name: Expr,
        concurrency: RegionConcurrency,
        parameters: Vec<(String, Expr)>,
        regions: Vec<String>,
        accounts: Vec<String>,
        template_body: String,
    },
    /// Replication table of `bucket`. The platform has no standalone resource
    /// for it; the renderer folds it into the bucket it belongs to.
    ReplicationRuleTable { bucket: NodeId, role: Expr, rules: Vec<ReplicationRule> },
}

impl AwsResource {
    pub fn type_name(&self) -> &'static str {
        match self {
            AwsResource::KmsKey { .. } => "AWS::KMS::Key",
            AwsResource::KmsAlias { .. } => "AWS::KMS::Alias",
            AwsResource::S3Bucket { .. } => "AWS::S3::Bucket",
            AwsResource::BucketPolicy { .. } => "AWS::S3::BucketPolicy",
            AwsResource::IamRole { .. } => "AWS::IAM::Role",
            AwsResource::IamPolicy { .. } => "AWS::IAM::Policy",
            AwsResource::StackSet { .. } => "AWS::CloudFormation::StackSet",
            AwsResource::ReplicationRuleTable { .. } => "AWS::S3::Bucket.ReplicationConfiguration",
        }
    }

    /// The node this payload is folded into, if it is not a resource of its own.
    pub fn embedded_in(&self) -> Option<&NodeId> {
        match self {
            AwsResource::ReplicationRuleTable { bucket, .. } => Some(bucket),
            _ => None,
        }
    }

    /// Graph nodes this payload refers to through expressions.
    pub fn references(&self) -> Vec<&NodeId> {
        let mut exprs: Vec<&Expr> = Vec::new();
        match self {
            AwsResource::KmsKey { .. } => {}
            AwsResource::KmsAlias { target_key, .. } => exprs.push(target_key),
            AwsResource::S3Bucket { kms_key, .. } => exprs.push(kms_key),
            AwsResource::BucketPolicy { bucket, document } => {
                exprs.push(bucket);
                exprs.extend(document.statement.iter().flat_map(|s| s.resource.iter()));
            }
            AwsResource::IamRole { inline_policies, .. } => {
                exprs.extend(inline_policies.iter().flat_map(|p| p.document.statement.iter()).flat_map(|s| s.resource.iter()));
            }
            AwsResource::IamPolicy { roles, document, .. } => {
                exprs.extend(roles.iter());
                exprs.extend(document.statement.iter().flat_map(|s| s.resource.iter()));
            }
            AwsResource::StackSet { administration_role, execution_role_name, parameters, .. } => {
                exprs.push(administration_role);
                exprs.push(execution_role_name);
                exprs.extend(parameters.iter().map(|(_, v)| v));
            }
            AwsResource::ReplicationRuleTable { role, .. } => exprs.push(role),
        }
        let mut out: Vec<&NodeId> = exprs.into_iter().filter_map(Expr::references).collect();
        if let Some(host) = self.embedded_in() { out.push(host); }
        out
    }

    pub fn to_cfn_properties(&self) -> Json {
        match self {
            AwsResource::KmsKey { description, enable_key_rotation, admin_account } => {
                let key_policy = PolicyDocument::new(vec![geovault_policy::PolicyStatement::allow(["kms:*"], [Expr::lit("*")])
                    .with_principal(Principal::Account(admin_account.clone()))]);
                let mut body = json!({ "EnableKeyRotation": enable_key_rotation, "KeyPolicy": key_policy });
                if let Some(desc) = description { body["Description"] = json!(desc); }
                body
            }
            AwsResource::KmsAlias { alias_name, target_key } => json!({ "AliasName": alias_name, "TargetKeyId": target_key }),
            AwsResource::S3Bucket { bucket_name, kms_key, bucket_key_enabled, versioned, block_public_access, owner_enforced } => {
                let mut body = json!({
                    "BucketName": bucket_name,
                    "BucketEncryption": { "ServerSideEncryptionConfiguration": [{
                        "BucketKeyEnabled": bucket_key_enabled,
                        "ServerSideEncryptionByDefault": { "SSEAlgorithm": "aws:kms", "KMSMasterKeyID": kms_key },
                    }]},
                });
                if *versioned { body["VersioningConfiguration"] = json!({ "Status": "Enabled" }); }
                if *block_public_access {
                    body["PublicAccessBlockConfiguration"] = json!({
                        "BlockPublicAcls": true, "BlockPublicPolicy": true,
                        "IgnorePublicAcls": true, "RestrictPublicBuckets": true,
                    });
                }
                if *owner_enforced {
                    body["OwnershipControls"] = json!({ "Rules": [{ "ObjectOwnership": "BucketOwnerEnforced" }] });
                }
                body
            }
            AwsResource::BucketPolicy { bucket, document } => json!({ "Bucket": bucket, "PolicyDocument": document }),
            AwsResource::IamRole { assumed_by, path, description, inline_policies } => {
                let mut body = json!({ "AssumeRolePolicyDocument": PolicyDocument::assumable_by(assumed_by.clone()) });
                if let Some(p) = path { body["Path"] = json!(p); }
                if let Some(d) = description { body["Description"] = json!(d); }
                if !inline_policies.is_empty() {
                    body["Policies"] = inline_policies
                        .iter()
                        .map(|p| json!({ "PolicyName": p.name, "PolicyDocument": p.document }))
                        .collect();
                }
                body
            }
            AwsResource::IamPolicy { policy_name, roles, document } => {
                json!({ "PolicyName": policy_name, "Roles": roles, "PolicyDocument": document })
            }
            AwsResource::StackSet {
                stack_set_name, administration_role, execution_role_name, concurrency, parameters, regions, accounts, template_body,
            } => {
                let params: Vec<Json> =
                    parameters.iter().map(|(k, v)| json!({ "ParameterKey": k, "ParameterValue": v })).collect();
                let concurrency = match concurrency {
                    RegionConcurrency::Parallel => "PARALLEL",
                    RegionConcurrency::Sequential => "SEQUENTIAL",
                };
                json!({
                    "StackSetName": stack_set_name,
                    "PermissionModel": "SELF_MANAGED",
                    "AdministrationRoleARN": administration_role,
                    "ExecutionRoleName": execution_role_name,
                    "OperationPreferences": { "RegionConcurrencyType": concurrency },
                    "Parameters": params,
                    "StackInstancesGroup": [{
                        "Regions": regions,
                        "DeploymentTargets": { "Accounts": accounts },
                    }],
                    "TemplateBody": template_body,
                })
            }
            AwsResource::ReplicationRuleTable { role, rules, .. } => json!({
                "Role": role,
                "Rules": rules.iter().map(ReplicationRule::to_cfn_json).collect::<Vec<_>>(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(storage_class: Option<StorageClass>) -> ReplicationRule {
        ReplicationRule {
            id: "eu-west-1".into(),
            priority: 0,
            destination_bucket: "arn:aws:s3:::wese-replication-eu-west-1".into(),
            replica_kms_key_id: "arn:aws:kms:eu-west-1:123456789012:alias/wese/replication".into(),
            storage_class,
            delete_marker_replication: true,
            sse_kms_encrypted_objects: true,
            status: RuleStatus::Enabled,
        }
    }

    #[test]
    fn rule_renders_destination_and_selection() {
        let v = rule(None).to_cfn_json();
        assert_eq!(v["Id"], "eu-west-1");
        assert_eq!(v["Priority"], 0);
        assert_eq!(v["Destination"]["EncryptionConfiguration"]["ReplicaKmsKeyID"], "arn:aws:kms:eu-west-1:123456789012:alias/wese/replication");
        assert!(v["Destination"].get("StorageClass").is_none());
        assert_eq!(v["DeleteMarkerReplication"]["Status"], "Enabled");
        assert_eq!(v["SourceSelectionCriteria"]["SseKmsEncryptedObjects"]["Status"], "Enabled");
    }

    #[test]
    fn storage_class_is_emitted_when_set() {
        let v = rule(Some(StorageClass::GlacierIr)).to_cfn_json();
        assert_eq!(v["Destination"]["StorageClass"], "GLACIER_IR");
    }

    #[test]
    fn storage_class_names_round_trip_through_serde() {
        let sc: StorageClass = serde_json::from_value(json!("DEEP_ARCHIVE")).unwrap();
        assert_eq!(sc, StorageClass::DeepArchive);
        assert_eq!(serde_json::to_value(StorageClass::OnezoneIa).unwrap(), json!(StorageClass::OnezoneIa.as_str()));
    }

    #[test]
    fn bucket_is_encrypted_versioned_and_private() {
        let b = AwsResource::S3Bucket {
            bucket_name: "wese".into(),
            kms_key: Expr::Arn(NodeId::new("Key")),
            bucket_key_enabled: true,
            versioned: true,
            block_public_access: true,
            owner_enforced: true,
        };
        let p = b.to_cfn_properties();
        assert_eq!(
            p["BucketEncryption"]["ServerSideEncryptionConfiguration"][0]["ServerSideEncryptionByDefault"]["KMSMasterKeyID"],
            json!({ "Fn::GetAtt": ["Key", "Arn"] })
        );
        assert_eq!(p["VersioningConfiguration"]["Status"], "Enabled");
        assert_eq!(p["PublicAccessBlockConfiguration"]["RestrictPublicBuckets"], true);
        assert_eq!(b.references(), vec![&NodeId::new("Key")]);
    }

    #[test]
    fn rule_table_is_embedded_in_its_bucket() {
        let t = AwsResource::ReplicationRuleTable {
            bucket: NodeId::new("Bucket"),
            role: Expr::Arn(NodeId::new("ReplicationRole")),
            rules: vec![rule(None)],
        };
        assert_eq!(t.embedded_in(), Some(&NodeId::new("Bucket")));
        assert_eq!(t.references(), vec![&NodeId::new("ReplicationRole"), &NodeId::new("Bucket")]);
        assert_eq!(t.to_cfn_properties()["Role"], json!({ "Fn::GetAtt": ["ReplicationRole", "Arn"] }));
    }
}
