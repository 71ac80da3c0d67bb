//! Administrative CLI for the gateway: upsert a project's policy, run a
//! one-shot `Decide` against a JSON action file, and inspect the audit log.

#![deny(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use audit::JsonlAuditSink;
use clap::{Parser, Subcommand};
use gateway::{DecideOptions, Engine, GatewayConfig, InMemoryPolicyStore, PolicyStore};
use gateway_core::{Action, AuditEntry, SystemClock};
use policy::Policy;
use quota::InMemoryCounterStore;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "gateway-cli", about = "Administer and exercise the action-validation gateway")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate and install a project's policy document (YAML or JSON).
    UpsertPolicy {
        #[arg(long)]
        state_dir: PathBuf,
        #[arg(long)]
        project_id: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Evaluate a single action against a project's installed policy.
    Decide {
        #[arg(long)]
        state_dir: PathBuf,
        #[arg(long)]
        project_id: String,
        #[arg(long)]
        agent_name: String,
        #[arg(long)]
        action_type: String,
        /// Path to a JSON file containing the action's parameter bag.
        /// Defaults to `{}` when omitted.
        #[arg(long)]
        params_file: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        simulate: bool,
        #[arg(long, default_value_t = true)]
        fail_closed: bool,
    },
    /// List audit entries recorded for a project.
    AuditList {
        #[arg(long)]
        state_dir: PathBuf,
        #[arg(long)]
        project_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_json_logging();
    let cli = Cli::parse();
    match cli.cmd {
        Command::UpsertPolicy { state_dir, project_id, file } => cmd_upsert_policy(&state_dir, &project_id, &file)?,
        Command::Decide { state_dir, project_id, agent_name, action_type, params_file, simulate, fail_closed } => {
            cmd_decide(&state_dir, &project_id, &agent_name, &action_type, params_file.as_deref(), simulate, fail_closed)?
        }
        Command::AuditList { state_dir, project_id } => cmd_audit_list(&state_dir, &project_id)?,
    }
    Ok(())
}

fn policy_path(state_dir: &Path, project_id: &str) -> PathBuf {
    state_dir.join(format!("{project_id}.policy.json"))
}

fn audit_path(state_dir: &Path) -> PathBuf {
    state_dir.join("audit.jsonl")
}

fn load_raw_document(file: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(file)?;
    let is_yaml = matches!(
        file.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        Ok(serde_yaml::from_str(&text)?)
    } else {
        Ok(serde_json::from_str(&text)?)
    }
}

fn cmd_upsert_policy(state_dir: &Path, project_id: &str, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(state_dir)?;
    let raw = load_raw_document(file)?;
    // Validate before installing; a malformed document is never written.
    let policy = Policy::load(&raw)?;
    fs::write(policy_path(state_dir, project_id), serde_json::to_string_pretty(&raw)?)?;
    println!("installed policy '{}' (version={}) for project '{project_id}'", policy.name, policy.version);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_decide(
    state_dir: &Path,
    project_id: &str,
    agent_name: &str,
    action_type: &str,
    params_file: Option<&Path>,
    simulate: bool,
    fail_closed: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(state_dir)?;
    let store = InMemoryPolicyStore::new();
    let policy_file = policy_path(state_dir, project_id);
    if policy_file.exists() {
        let raw: Value = serde_json::from_str(&fs::read_to_string(&policy_file)?)?;
        store.put(project_id, Policy::load(&raw)?)?;
    }

    let params: Value = match params_file {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => serde_json::json!({}),
    };

    let audit_sink = JsonlAuditSink::open(audit_path(state_dir), 1024)?;
    let config = GatewayConfig { fail_closed, ..GatewayConfig::default() };
    let engine = Engine::new(Arc::new(store), Arc::new(InMemoryCounterStore::new()), Arc::new(audit_sink), Arc::new(SystemClock), config);

    let action = Action::new(project_id, agent_name, action_type, params)?;
    let decision = engine.decide(&action, DecideOptions { simulate })?;
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

fn cmd_audit_list(state_dir: &Path, project_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = audit_path(state_dir);
    if !path.exists() {
        println!("[]");
        return Ok(());
    }
    let contents = fs::read_to_string(&path)?;
    let entries: Vec<AuditEntry> = contents
        .lines()
        .filter(|line| !line.is_empty())
        .map(serde_json::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    let filtered: Vec<&AuditEntry> = entries.iter().filter(|e| e.project_id == project_id).collect();
    println!("{}", serde_json::to_string_pretty(&filtered)?);
    Ok(())
}
