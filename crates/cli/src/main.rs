use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value as Json;
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::format::FmtSpan;

use geovault_cfn as cfn;
use geovault_policy::Policy;
use geovault_replication::{ReplicationConfig, ReplicationPlan, ReplicationPlanBuilder};

const BUNDLED_REPLICA_TEMPLATE: &str = include_str!("../templates/replica.yml");

#[derive(Parser, Debug)]
#[command(author, version, about="geovault: deletion-protected, geo-replicated S3 archives on CloudFormation")]
struct Cli {
    /// Replication config (YAML)
    #[arg(short, long, global = true, default_value="geovault.yml")]
    file: PathBuf,

    /// Output directory for the rendered template
    #[arg(short, long, default_value="out", global = true)]
    out: PathBuf,

    /// Skip the bucket encryption check
    #[arg(long, default_value_t=false, global = true)]
    allow_unencrypted: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Render and check the template without deploying it
    Synth,
    /// Print the creation order of the plan
    Graph,
    /// Synth, then deploy the stack and apply termination protection
    Deploy,
    /// Delete the stack (retained resources stay behind)
    Destroy,
}

fn load_config(path: &Path) -> Result<ReplicationConfig> {
    let raw = std::fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    serde_yaml::from_slice(&raw).with_context(|| format!("parse config {}", path.display()))
}

/// The replica template is opaque here; a relative path resolves against the config file.
fn load_replica_template(cfg: &ReplicationConfig, config_path: &Path) -> Result<String> {
    let Some(p) = &cfg.replica_template else { return Ok(BUNDLED_REPLICA_TEMPLATE.to_string()) };
    let p = if p.is_relative() {
        config_path.parent().map(|d| d.join(p)).unwrap_or_else(|| p.clone())
    } else {
        p.clone()
    };
    std::fs::read_to_string(&p).with_context(|| format!("read replica template {}", p.display()))
}

fn synth(cfg: &ReplicationConfig, replica_template: String, policy: &Policy) -> Result<(ReplicationPlan, Json)> {
    let plan = ReplicationPlanBuilder::build(cfg, replica_template).context("build replication plan")?;
    let tpl = cfn::render(&plan.graph, &format!("Replicated archive bucket {}", cfg.name)).context("render template")?;
    let tpl = tpl.to_json()?;
    policy.check_template(&tpl)?;
    Ok((plan, tpl))
}

fn write_template(tpl: &Json, out: &Path, stack_name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(out).with_context(|| format!("create {}", out.display()))?;
    let path = out.join(format!("{stack_name}.template.json"));
    std::fs::write(&path, serde_json::to_string_pretty(tpl)?)?;
    Ok(path)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().json().with_span_events(FmtSpan::CLOSE).init();
    let cli = Cli::parse();
    let policy = Policy::new(cli.allow_unencrypted);
    let cfg = load_config(&cli.file)?;

    let stack_name = cfg.stack_name();
    let opts = cfn::StackOptions { stack_name: &stack_name, region: Some(&cfg.region), tags: &cfg.tags };
    match cli.cmd {
        Cmd::Synth => {
            let (plan, tpl) = synth(&cfg, load_replica_template(&cfg, &cli.file)?, &policy)?;
            let path = write_template(&tpl, &cli.out, &plan.stack_name)?;
            tracing::info!(path = %path.display(), "template written");
        }
        Cmd::Graph => {
            let (plan, _) = synth(&cfg, load_replica_template(&cfg, &cli.file)?, &policy)?;
            for (i, id) in plan.graph.topological_order()?.into_iter().enumerate() {
                let deps: Vec<&str> = plan.graph.dependencies_of(id).into_iter().map(|d| d.as_str()).collect();
                println!("{i:>2} {id} <- [{}]", deps.join(", "));
            }
        }
        Cmd::Deploy => {
            let (plan, tpl) = synth(&cfg, load_replica_template(&cfg, &cli.file)?, &policy)?;
            let path = write_template(&tpl, &cli.out, &plan.stack_name)?;
            cfn::deploy_stack(&opts, &path)?;
            cfn::set_termination_protection(&opts, plan.termination_protection)?;
        }
        Cmd::Destroy => {
            if cfg.termination_protection {
                tracing::warn!(stack = opts.stack_name, "termination protection is on; delete-stack will be refused");
            }
            cfn::delete_stack(&opts)?;
        }
    }
    Ok(())
}
