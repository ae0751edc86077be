use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Command, ExitStatus};

use thiserror::Error;

/// Failures that belong to the provisioning platform. Never retried here.
#[derive(Error, Debug)]
pub enum ProvisioningError {
    #[error("aws cli not found in PATH")]
    CliNotFound(#[source] which::Error),
    #[error("spawn aws {command}")]
    Spawn { command: &'static str, #[source] source: std::io::Error },
    #[error("aws {command} failed ({status})")]
    Failed { command: &'static str, status: ExitStatus },
}

/// Stack-level settings shared by every platform command.
#[derive(Debug, Clone, Copy)]
pub struct StackOptions<'a> {
    pub stack_name: &'a str,
    pub region: Option<&'a str>,
    pub tags: &'a BTreeMap<String, String>,
}

fn aws() -> Result<Command, ProvisioningError> {
    let p = which::which("aws").map_err(ProvisioningError::CliNotFound)?;
    Ok(Command::new(p))
}

fn run(mut cmd: Command, command: &'static str) -> Result<(), ProvisioningError> {
    tracing::info!(command, "invoking aws cli");
    let st = cmd.status().map_err(|source| ProvisioningError::Spawn { command, source })?;
    if !st.success() { return Err(ProvisioningError::Failed { command, status: st }); }
    Ok(())
}

pub fn deploy_stack(opts: &StackOptions<'_>, template_file: &Path) -> Result<(), ProvisioningError> {
    let mut cmd = aws()?;
    cmd.arg("cloudformation").arg("deploy")
        .arg("--stack-name").arg(opts.stack_name)
        .arg("--template-file").arg(template_file)
        .arg("--capabilities").arg("CAPABILITY_NAMED_IAM")
        .arg("--no-fail-on-empty-changeset");
    if !opts.tags.is_empty() {
        cmd.arg("--tags");
        for (k, v) in opts.tags { cmd.arg(format!("{k}={v}")); }
    }
    if let Some(r) = opts.region { cmd.arg("--region").arg(r); }
    run(cmd, "cloudformation deploy")
}

pub fn set_termination_protection(opts: &StackOptions<'_>, enabled: bool) -> Result<(), ProvisioningError> {
    let mut cmd = aws()?;
    cmd.arg("cloudformation").arg("update-termination-protection")
        .arg("--stack-name").arg(opts.stack_name)
        .arg(if enabled { "--enable-termination-protection" } else { "--no-enable-termination-protection" });
    if let Some(r) = opts.region { cmd.arg("--region").arg(r); }
    run(cmd, "cloudformation update-termination-protection")
}

pub fn delete_stack(opts: &StackOptions<'_>) -> Result<(), ProvisioningError> {
    let mut cmd = aws()?;
    cmd.arg("cloudformation").arg("delete-stack")
        .arg("--stack-name").arg(opts.stack_name);
    if let Some(r) = opts.region { cmd.arg("--region").arg(r); }
    run(cmd, "cloudformation delete-stack")
}
