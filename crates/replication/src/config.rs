use std::collections::BTreeMap;
use std::path::PathBuf;

use geovault_aws::StorageClass;
use geovault_core::{naming, PlanError, RemovalPolicy};
use geovault_policy::synthesizer::check_regions;
use serde::{Deserialize, Serialize};

/// Caller-facing description of one replicated bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplicationConfig {
    /// Primary bucket name. Replica buckets and key aliases derive from it.
    pub name: String,
    pub account: String,
    /// Home region: where the primary bucket and the stack set live.
    pub region: String,
    /// Replica regions. Order sets rule priority; members must be unique.
    pub replicate_to: Vec<String>,
    #[serde(default)]
    pub destination_storage_class: Option<StorageClass>,
    #[serde(default)]
    pub storage_class_overrides: BTreeMap<String, StorageClass>,
    /// Existing key to encrypt the primary with. The plan creates its own when absent.
    #[serde(default)]
    pub encryption_key_arn: Option<String>,
    #[serde(default)]
    pub removal_policy: RemovalPolicy,
    #[serde(default)]
    pub termination_protection: bool,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub stack_name: Option<String>,
    /// Replica stack template; the bundled one is used when absent.
    #[serde(default)]
    pub replica_template: Option<PathBuf>,
}

impl ReplicationConfig {
    pub fn new(name: impl Into<String>, account: impl Into<String>, region: impl Into<String>, replicate_to: Vec<String>) -> Self {
        Self {
            name: name.into(),
            account: account.into(),
            region: region.into(),
            replicate_to,
            destination_storage_class: None,
            storage_class_overrides: BTreeMap::new(),
            encryption_key_arn: None,
            removal_policy: RemovalPolicy::default(),
            termination_protection: false,
            tags: BTreeMap::new(),
            stack_name: None,
            replica_template: None,
        }
    }

    pub fn stack_name(&self) -> String {
        self.stack_name.clone().unwrap_or_else(|| format!("{}-archive", self.name))
    }

    /// Per-region override, else the uniform class, else platform default.
    pub fn storage_class_for(&self, region: &str) -> Option<StorageClass> {
        self.storage_class_overrides.get(region).copied().or(self.destination_storage_class)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        check_regions(&self.replicate_to)?;
        naming::validate_layout(&self.name, &self.replicate_to)?;
        naming::validate_account(&self.account)?;
        naming::validate_region(&self.region)?;
        if let Some(arn) = &self.encryption_key_arn {
            naming::validate_key_arn(arn)?;
        }
        if let Some(region) = self.storage_class_overrides.keys().find(|r| !self.replicate_to.contains(r)) {
            return Err(PlanError::config(format!(
                "storage_class_overrides names region '{region}', which is not in replicate_to"
            )));
        }
        Ok(())
    }
}
