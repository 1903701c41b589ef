//! Execution of `dynconf` commands

use std::fmt::Write;

use dynconf_model::{
    Applicability, Cluster, DynamicConfigNomadChange, LockContext, SettingChange,
    SettingOperation, Stripe,
};
use dynconf_nomad::client::LoggingResultsReceiver;
use dynconf_nomad::{NomadChange, NomadChangeInfo};
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use crate::cli::{Args, Command};
use crate::error::{Error, Result};
use crate::local::LocalCluster;

/// Run a command, returning what to print
pub async fn run(args: Args) -> Result<String> {
    match &args.command {
        Command::Init { name, nodes } => {
            let topology = Cluster::new(name, vec![Stripe::new("stripe-1", nodes.clone())]);
            let cluster = LocalCluster::init(&args.config_dir, topology).await?;
            Ok(format!(
                "Cluster '{}' initialized with {} node(s)",
                name,
                cluster.node_count()
            ))
        }
        Command::Activate { license_file } => {
            let cluster = LocalCluster::open(&args.config_dir).await?;
            if let Some(path) = license_file {
                let content = fs::read_to_string(path)
                    .await
                    .map_err(|e| Error::io(path, e))?;
                let license = cluster.install_license(&content).await?;
                info!("License valid until {}", license.expiry_date);
            }
            let change = DynamicConfigNomadChange::activation(cluster.topology().clone())?;
            apply(&args, &cluster, change).await
        }
        Command::Set { setting, node } => {
            change_setting(&args, SettingOperation::Set, setting, node.as_deref()).await
        }
        Command::Unset { setting, node } => {
            change_setting(&args, SettingOperation::Unset, setting, node.as_deref()).await
        }
        Command::Attach { stripe, node } => {
            let mut cluster = LocalCluster::open(&args.config_dir).await?;
            let current = activated(&cluster).await?;
            let target = current
                .stripes
                .iter()
                .find(|candidate| candidate.name == *stripe)
                .ok_or_else(|| Error::Usage(format!("unknown stripe '{stripe}'")))?;
            let active = target
                .nodes
                .first()
                .map(|active| active.name.clone())
                .ok_or_else(|| Error::Usage(format!("stripe '{stripe}' has no node")))?;

            let change =
                DynamicConfigNomadChange::node_addition(&current, target.uid, node.clone())?;
            let topology = resulting_topology(&change)?;
            let applied = apply(&args, &cluster, change).await?;

            let outcome = cluster.attach(topology, &node.name, &active).await?;
            Ok(format!(
                "{applied}\nNode '{}' synced from '{}': {}",
                node.name, active, outcome
            ))
        }
        Command::Detach { node } => {
            let mut cluster = LocalCluster::open(&args.config_dir).await?;
            let current = activated(&cluster).await?;
            let target = current
                .find_node(node)
                .ok_or_else(|| Error::Usage(format!("unknown node '{node}'")))?;

            let change = DynamicConfigNomadChange::node_removal(&current, &target.uid)?;
            let topology = resulting_topology(&change)?;
            cluster.take_out(node)?;
            let applied = apply(&args, &cluster, change).await?;

            cluster.detach(topology, node).await?;
            Ok(format!("{applied}\nNode '{node}' detached"))
        }
        Command::Lock { owner, tags } => {
            let cluster = LocalCluster::open(&args.config_dir).await?;
            let token = args
                .lock_token
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let change = DynamicConfigNomadChange::LockConfig {
                lock_context: LockContext::new(token.clone(), owner, tags),
            };
            let outcome = apply_unwrapped(&args, &cluster, change).await?;
            Ok(format!("{outcome}\nLock token: {token}"))
        }
        Command::Unlock { force } => {
            let cluster = LocalCluster::open(&args.config_dir).await?;
            apply(
                &args,
                &cluster,
                DynamicConfigNomadChange::UnlockConfig { forced: *force },
            )
            .await
        }
        Command::Log { node } => {
            let cluster = LocalCluster::open(&args.config_dir).await?;
            let changes = cluster.server(node)?.get_all_nomad_changes().await?;
            Ok(format_log(&changes))
        }
        Command::Diagnostic => {
            let cluster = LocalCluster::open(&args.config_dir).await?;
            diagnostic(&args, &cluster).await
        }
        Command::Repair { force } => {
            let cluster = LocalCluster::open(&args.config_dir).await?;
            let client = cluster.client(&args.host, &args.user, args.client_config())?;
            let outcome = client
                .try_recovery(&LoggingResultsReceiver, cluster.node_count(), *force)
                .await;
            if outcome.is_success() {
                Ok(format!("Repair done: {outcome}"))
            } else {
                Err(Error::RepairFailed(format!("Repair failed: {outcome}")))
            }
        }
    }
}

async fn change_setting(
    args: &Args,
    operation: SettingOperation,
    expression: &str,
    node: Option<&str>,
) -> Result<String> {
    let cluster = LocalCluster::open(&args.config_dir).await?;
    let current = activated(&cluster).await?;

    let applicability = match node {
        Some(name) => {
            let node = current
                .find_node(name)
                .ok_or_else(|| Error::Usage(format!("unknown node '{name}'")))?;
            Applicability::Node(node.uid)
        }
        None => Applicability::Cluster,
    };

    let change = SettingChange::parse(applicability, operation, expression)?;
    apply(args, &cluster, DynamicConfigNomadChange::Setting(change)).await
}

async fn activated(cluster: &LocalCluster) -> Result<Cluster> {
    cluster.current_cluster().await?.ok_or_else(|| {
        Error::Usage("the cluster is not activated: run `dynconf activate` first".to_string())
    })
}

fn resulting_topology(change: &DynamicConfigNomadChange) -> Result<Cluster> {
    change.topology().cloned().ok_or_else(|| {
        Error::Usage(format!("'{}' does not change the topology", change.summary()))
    })
}

/// Apply a change, made by the lock holder when a lock token is given
async fn apply(
    args: &Args,
    cluster: &LocalCluster,
    change: DynamicConfigNomadChange,
) -> Result<String> {
    let change = match &args.lock_token {
        Some(token) => change.with_lock_token(token.clone()),
        None => change,
    };
    apply_unwrapped(args, cluster, change).await
}

async fn apply_unwrapped(
    args: &Args,
    cluster: &LocalCluster,
    change: DynamicConfigNomadChange,
) -> Result<String> {
    let summary = change.summary();
    let client = cluster.client(&args.host, &args.user, args.client_config())?;
    let outcome = client
        .try_apply_change(&LoggingResultsReceiver, change)
        .await;

    if outcome.is_applied() {
        Ok(format!("{summary}: {outcome}"))
    } else {
        Err(Error::ChangeFailed(format!("{summary}: {outcome}")))
    }
}

async fn diagnostic(args: &Args, cluster: &LocalCluster) -> Result<String> {
    let client = cluster.client(&args.host, &args.user, args.client_config())?;
    let analyzer = client.discover(&LoggingResultsReceiver).await;
    let state = analyzer.global_state();

    let mut output = format!("Cluster state: {} ({})", state, state.description());
    for (node, response) in analyzer.responses() {
        let _ = write!(
            output,
            "\n{}: {} count={} version={}/{}",
            node,
            response.mode,
            response.mutative_message_count,
            response.current_version,
            response.highest_version
        );
        if let Some(latest) = &response.latest_change {
            let _ = write!(
                output,
                " latest={} {}",
                latest.change_uuid, latest.change_request_state
            );
        }
        if let (Some(host), Some(user)) = (
            &response.last_mutation_host,
            &response.last_mutation_user,
        ) {
            let _ = write!(output, " last-mutation={user}@{host}");
        }
    }
    if let Some((node, reason)) = analyzer.discover_failure() {
        let _ = write!(output, "\n{node}: unreachable ({reason})");
    }
    if let Some(checkpoint) = analyzer.checkpoint() {
        let _ = write!(
            output,
            "\nLatest common checkpoint: {} (version {})",
            checkpoint.change_uuid, checkpoint.version
        );
    }
    Ok(output)
}

/// One line per change, oldest first
pub fn format_log(changes: &[NomadChangeInfo<DynamicConfigNomadChange>]) -> String {
    if changes.is_empty() {
        return "<empty>".to_string();
    }

    changes
        .iter()
        .map(|change| {
            format!(
                "{:>4} {} {} {} | {}@{} - {}",
                change.version,
                change.creation_timestamp.format("%Y-%m-%dT%H:%M:%S%.3f"),
                change.change_uuid,
                change.change_request_state,
                change.creation_user,
                change.creation_host,
                change.nomad_change.summary()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};
    use dynconf_model::Setting;
    use dynconf_nomad::ChangeRequestState;

    #[test]
    fn test_format_empty_log() {
        assert_eq!(format_log(&[]), "<empty>");
    }

    #[test]
    fn test_format_log_line() {
        let change = NomadChangeInfo {
            change_uuid: Uuid::nil(),
            nomad_change: DynamicConfigNomadChange::Setting(
                SettingChange::set(
                    Applicability::Cluster,
                    Setting::OffheapResources,
                    Some("main"),
                    "1GB",
                )
                .unwrap(),
            ),
            change_request_state: ChangeRequestState::Committed,
            version: 12,
            creation_host: "host-a".to_string(),
            creation_user: "alice".to_string(),
            creation_timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 5).unwrap(),
        };

        assert_eq!(
            format_log(&[change]),
            "  12 2024-03-01T10:30:05.000 00000000-0000-0000-0000-000000000000 COMMITTED | alice@host-a - set offheap-resources.main=1GB"
        );
    }
}
