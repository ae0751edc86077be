use anyhow::Result;
use serde_json::Value as Json;

use std::sync::OnceLock;

use regex::Regex;

const BUCKET: &str = "AWS::S3::Bucket";
const ROLE_POLICY: &str = "AWS::IAM::Policy";

fn wildcard_region_kms() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^arn:aws:kms:\*:").expect("kms wildcard regex"))
}

/// Plan-time checks over a rendered CloudFormation template.
pub struct Policy { pub allow_unencrypted: bool }

impl Policy {
    pub fn new(allow_unencrypted: bool) -> Self { Self { allow_unencrypted } }

    pub fn check_template(&self, tpl: &Json) -> Result<()> {
        let Some(resources) = tpl.get("Resources").and_then(Json::as_object) else {
            anyhow::bail!("Policy: template has no Resources section");
        };
        for (name, res) in resources {
            let props = res.get("Properties").cloned().unwrap_or(Json::Null);
            match res.get("Type").and_then(Json::as_str) {
                Some(BUCKET) => self.check_bucket(name, &props)?,
                Some(ROLE_POLICY) => check_role_policy(name, &props)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn check_bucket(&self, name: &str, props: &Json) -> Result<()> {
        if props.get("BucketEncryption").is_none() && !self.allow_unencrypted {
            anyhow::bail!("Policy: S3 bucket {name} requires encryption (SSE-S3 or KMS).");
        }
        if props.get("ReplicationConfiguration").is_none() {
            return Ok(());
        }
        if props.pointer("/VersioningConfiguration/Status").and_then(Json::as_str) != Some("Enabled") {
            anyhow::bail!("Policy: replicated bucket {name} must have versioning enabled.");
        }
        let block = props.get("PublicAccessBlockConfiguration");
        let all_blocked = ["BlockPublicAcls", "BlockPublicPolicy", "IgnorePublicAcls", "RestrictPublicBuckets"]
            .iter()
            .all(|k| block.and_then(|b| b.get(*k)).and_then(Json::as_bool) == Some(true));
        if !all_blocked {
            anyhow::bail!("Policy: replicated bucket {name} must block all public access.");
        }
        Ok(())
    }
}

fn check_role_policy(name: &str, props: &Json) -> Result<()> {
    let statements = props.pointer("/PolicyDocument/Statement").and_then(Json::as_array).cloned().unwrap_or_default();
    for st in statements {
        let resources = match st.get("Resource") {
            Some(Json::Array(items)) => items.clone(),
            Some(v) => vec![v.clone()],
            None => continue,
        };
        for r in resources.iter().filter_map(Json::as_str) {
            if wildcard_region_kms().is_match(r) {
                anyhow::bail!("Policy: {name} grants KMS access across all regions ({r}); scope it to one region.");
            }
        }
    }
    Ok(())
}
