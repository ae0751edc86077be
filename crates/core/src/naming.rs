//! Naming convention binding the primary bucket to the replica resources.
//!
//! Replica buckets and their keys are created asynchronously in other regions
//! by the stack set, so they are addressed by derived names rather than by
//! graph references. Every derived name is produced here.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::PlanError;

const MAX_BUCKET_NAME: usize = 63;

fn bucket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9.-]*[a-z0-9]$").expect("bucket name regex"))
}

fn region_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]{2}(-gov)?-[a-z]+-[0-9]+$").expect("region regex"))
}

fn account_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{12}$").expect("account regex"))
}

fn key_arn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^arn:aws[a-z-]*:kms:[a-z0-9-]+:[0-9]{12}:(key/[A-Za-z0-9-]+|alias/[A-Za-z0-9/_-]+)$").expect("key arn regex"))
}

pub fn bucket_arn(name: &str) -> String { format!("arn:aws:s3:::{name}") }

pub fn objects_arn(name: &str) -> String { format!("arn:aws:s3:::{name}/*") }

pub fn replica_bucket_name(name: &str, region: &str) -> String { format!("{name}-replication-{region}") }

pub fn replica_bucket_arn(name: &str, region: &str) -> String { bucket_arn(&replica_bucket_name(name, region)) }

pub fn replica_objects_arn(name: &str, region: &str) -> String { objects_arn(&replica_bucket_name(name, region)) }

/// Wildcard covering every replica bucket of `name`, in any region.
pub fn replica_bucket_arn_pattern(name: &str) -> String { format!("arn:aws:s3:::{name}-replication-*") }

pub fn primary_key_alias(name: &str) -> String { format!("alias/{name}") }

/// Alias every replica region gives its own key. Same string in each region.
pub fn replica_key_alias(name: &str) -> String { format!("alias/{name}/replication") }

pub fn replica_key_alias_arn(name: &str, region: &str, account: &str) -> String {
    format!("arn:aws:kms:{region}:{account}:{}", replica_key_alias(name))
}

pub fn stack_set_name(name: &str) -> String { format!("{name}-replication") }

/// `eu-west-1` -> `EuWest1`. Used to build statement ids, which must be alphanumeric.
pub fn sid_fragment(region: &str) -> String {
    region
        .split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(c) => c.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

pub fn validate_bucket_name(name: &str) -> Result<(), PlanError> {
    if name.len() < 3 || name.len() > MAX_BUCKET_NAME {
        return Err(PlanError::config(format!("bucket name '{name}' must be 3 to {MAX_BUCKET_NAME} characters")));
    }
    if !bucket_re().is_match(name) || name.contains("..") {
        return Err(PlanError::config(format!(
            "bucket name '{name}' may only contain lowercase letters, digits, '.' and '-', and must start and end with a letter or digit"
        )));
    }
    Ok(())
}

pub fn validate_region(region: &str) -> Result<(), PlanError> {
    if region_re().is_match(region) { Ok(()) } else {
        Err(PlanError::config(format!("'{region}' is not a region identifier")))
    }
}

pub fn validate_account(account: &str) -> Result<(), PlanError> {
    if account_re().is_match(account) { Ok(()) } else {
        Err(PlanError::config(format!("account '{account}' must be 12 digits")))
    }
}

/// A caller-supplied key must be a full key or alias ARN.
pub fn validate_key_arn(arn: &str) -> Result<(), PlanError> {
    if key_arn_re().is_match(arn) { Ok(()) } else {
        Err(PlanError::config(format!("'{arn}' is not a KMS key or alias ARN")))
    }
}

/// Checks the primary name and every derived replica bucket name.
pub fn validate_layout(name: &str, regions: &[String]) -> Result<(), PlanError> {
    validate_bucket_name(name)?;
    for region in regions {
        validate_region(region)?;
        let replica = replica_bucket_name(name, region);
        if replica.len() > MAX_BUCKET_NAME {
            return Err(PlanError::config(format!(
                "replica bucket name '{replica}' for region {region} exceeds {MAX_BUCKET_NAME} characters; shorten '{name}'"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn derived_names() {
        assert_eq!(replica_bucket_name("wese", "eu-west-1"), "wese-replication-eu-west-1");
        assert_eq!(replica_objects_arn("wese", "eu-west-1"), "arn:aws:s3:::wese-replication-eu-west-1/*");
        assert_eq!(
            replica_key_alias_arn("wese", "eu-north-1", "123456789012"),
            "arn:aws:kms:eu-north-1:123456789012:alias/wese/replication"
        );
        assert_eq!(stack_set_name("wese"), "wese-replication");
    }

    #[test]
    fn replica_names_do_not_collide() {
        let regions = ["eu-west-1", "eu-west-2", "eu-north-1", "us-east-1", "us-gov-west-1"];
        for name in ["wese", "wese-replication-eu-west", "a.b"] {
            let names: HashSet<String> = regions.iter().map(|r| replica_bucket_name(name, r)).collect();
            assert_eq!(names.len(), regions.len());
            assert!(!names.contains(name));
            let arns: HashSet<String> = regions.iter().map(|r| replica_key_alias_arn(name, r, "123456789012")).collect();
            assert_eq!(arns.len(), regions.len());
        }
    }

    #[test]
    fn sid_fragments() {
        assert_eq!(sid_fragment("eu-west-1"), "EuWest1");
        assert_eq!(sid_fragment("us-gov-west-1"), "UsGovWest1");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(validate_bucket_name("Wese").is_err());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("-wese").is_err());
        assert!(validate_bucket_name("we..se").is_err());
        assert!(validate_region("eu_west_1").is_err());
        assert!(validate_region("EU-WEST-1").is_err());
        assert!(validate_account("1234").is_err());
        assert!(validate_account("123456789012").is_ok());
    }

    #[test]
    fn key_arns() {
        assert!(validate_key_arn("arn:aws:kms:eu-central-1:123456789012:key/1234abcd-12ab-34cd-56ef-1234567890ab").is_ok());
        assert!(validate_key_arn("arn:aws:kms:eu-central-1:123456789012:alias/wese").is_ok());
        assert!(validate_key_arn("alias/wese").is_err());
        assert!(validate_key_arn("arn:aws:s3:::wese").is_err());
    }

    #[test]
    fn layout_rejects_overlong_replica_names() {
        let name = "a".repeat(45);
        assert!(validate_bucket_name(&name).is_ok());
        let err = validate_layout(&name, &["ap-southeast-2".to_string()]).unwrap_err();
        assert!(err.to_string().contains("ap-southeast-2"));
        assert!(validate_layout("wese", &["eu-west-1".to_string()]).is_ok());
    }
}
