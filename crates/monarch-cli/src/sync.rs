//! `monarch sync`: push stored observations to Label Studio.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, ValueEnum};
use monarch_store::DuckStore;
use monarch_sync::{AnnotationClient, AnnotationSettings, AuthScheme};
use tracing::{info, warn};

#[derive(Args)]
pub struct SyncArgs {
    /// Number of observations to sync, newest first (default: all)
    #[arg(short = 'n', long = "num")]
    num: Option<usize>,

    /// Look up existing tasks first and skip observations already imported
    #[arg(long)]
    skip_duplicates: bool,

    #[arg(long, env = "LABEL_STUDIO_URL", default_value = "http://localhost:8080")]
    label_studio_url: String,

    #[arg(long, env = "LABEL_STUDIO_PROJECT_ID", default_value = "1")]
    project_id: String,

    /// API token
    #[arg(long, env = "LABEL_STUDIO_API_TOKEN", hide_env_values = true)]
    token: String,

    /// How the token is sent: `Authorization: Bearer` or legacy `Authorization: Token`
    #[arg(long, env = "LABEL_STUDIO_AUTH_SCHEME", value_enum, default_value_t = AuthArg::Bearer)]
    auth_scheme: AuthArg,

    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AuthArg {
    Bearer,
    Token,
}

impl From<AuthArg> for AuthScheme {
    fn from(arg: AuthArg) -> Self {
        match arg {
            AuthArg::Bearer => AuthScheme::Bearer,
            AuthArg::Token => AuthScheme::Token,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct SyncStats {
    created: usize,
    skipped: usize,
    failed: usize,
}

pub async fn run(args: SyncArgs, store: &DuckStore) -> anyhow::Result<()> {
    let settings = AnnotationSettings {
        base_url: args.label_studio_url,
        project_id: args.project_id,
        timeout: Duration::from_secs(args.timeout_secs),
    };
    let auth = AuthScheme::from(args.auth_scheme).strategy(args.token);
    let client = AnnotationClient::new(settings, auth).context("building Label Studio client")?;

    client
        .check_connection()
        .await
        .context("cannot connect to Label Studio")?;

    let existing = if args.skip_duplicates {
        client.existing_task_ids().await.unwrap_or_else(|e| {
            warn!(error = %e, "could not list existing tasks; importing without duplicate check");
            HashSet::new()
        })
    } else {
        HashSet::new()
    };

    let tasks = store
        .annotation_tasks(args.num)
        .context("reading stored observations")?;
    info!(count = tasks.len(), "observations to sync");

    let mut stats = SyncStats::default();
    for task in &tasks {
        if existing.contains(&task.observation_id) {
            stats.skipped += 1;
            continue;
        }
        match client.import_task(task).await {
            Ok(()) => stats.created += 1,
            Err(e) => {
                warn!(observation = %task.observation_id, error = %e, "task import failed");
                stats.failed += 1;
            }
        }
    }

    println!(
        "created: {}, skipped: {}, failed: {} (of {} observations)",
        stats.created,
        stats.skipped,
        stats.failed,
        tasks.len()
    );
    Ok(())
}
