//! Discovery fan-out feeding a [`ConsistencyAnalyzer`]
//!
//! Discovery runs twice. A node whose mutative message count moved between
//! the two rounds was mutated by someone else meanwhile.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::change::{ChangeRequestState, NomadChange};
use crate::messages::{DiscoverResponse, NomadServerMode};

use super::analyzer::ConsistencyAnalyzer;
use super::config::NomadClientConfig;
use super::endpoint::{NodeAddress, NomadEndpoint};
use super::fanout::fan_out;
use super::receiver::DiscoverResultsReceiver;

type Discovered<C> = Vec<(NodeAddress, Result<DiscoverResponse<C>, crate::EndpointError>)>;

async fn discover_round<C: NomadChange>(
    config: &NomadClientConfig,
    endpoints: &[Arc<dyn NomadEndpoint<C>>],
) -> Discovered<C> {
    let targets = endpoints.iter().map(|e| (e.clone(), ())).collect();
    fan_out(config, "discover", targets, |endpoint, ()| async move {
        endpoint.discover().await
    })
    .await
}

/// Discover every endpoint and classify the cluster.
///
/// `node_count` is the size of the whole cluster, which may exceed the
/// number of endpoints when some nodes are known to be offline. A count
/// below the number of endpoints is raised to it.
pub(crate) async fn discover_cluster<C, R>(
    config: &NomadClientConfig,
    endpoints: &[Arc<dyn NomadEndpoint<C>>],
    node_count: usize,
    receiver: &R,
) -> ConsistencyAnalyzer<C>
where
    C: NomadChange,
    R: DiscoverResultsReceiver<C> + ?Sized,
{
    let addresses: Vec<NodeAddress> = endpoints.iter().map(|e| e.address().clone()).collect();
    receiver.start_discovery(&addresses);

    if node_count < endpoints.len() {
        debug!(
            "Expected node count {} is below the {} configured endpoints, using {}",
            node_count,
            endpoints.len(),
            endpoints.len()
        );
    }
    let mut analyzer = ConsistencyAnalyzer::new(node_count.max(endpoints.len()));
    let mut first = BTreeMap::new();

    for (node, result) in discover_round(config, endpoints).await {
        match result {
            Ok(response) => {
                receiver.discovered(&node, &response);
                if response.mode == NomadServerMode::Prepared
                    && let Some(latest) = &response.latest_change
                {
                    receiver.discover_already_prepared(
                        &node,
                        latest.change_uuid,
                        &latest.creation_host,
                        &latest.creation_user,
                    );
                }
                first.insert(node, response);
            }
            Err(e) => {
                let reason = e.to_string();
                receiver.discover_fail(&node, &reason);
                analyzer.discover_fail(node, reason);
            }
        }
    }

    if analyzer.discover_failure().is_none() {
        // Second round: anything that moved was touched by another client
        for (node, result) in discover_round(config, endpoints).await {
            match result {
                Ok(second) => {
                    let moved = first
                        .get(&node)
                        .is_some_and(|r| r.mutative_message_count != second.mutative_message_count);
                    if moved {
                        warn!("{} was mutated during discovery", node);
                        receiver.discover_other_client(
                            &node,
                            second.last_mutation_host.as_deref(),
                            second.last_mutation_user.as_deref(),
                        );
                        analyzer.discover_other_client(
                            node,
                            second.last_mutation_host,
                            second.last_mutation_user,
                        );
                    }
                }
                Err(e) => {
                    let reason = e.to_string();
                    receiver.discover_fail(&node, &reason);
                    analyzer.discover_fail(node, reason);
                }
            }
        }
    }

    if let Some((change_uuid, committed, rolled_back)) = find_divergence(&first) {
        receiver.discover_cluster_inconsistent(change_uuid, &committed, &rolled_back);
        analyzer.discover_cluster_inconsistent(change_uuid, committed, rolled_back);
    }

    for (node, response) in first {
        analyzer.discovered(node, response);
    }

    debug!("Discovery finished: {}", analyzer.global_state());
    receiver.end_discovery();
    analyzer
}

/// A latest change committed on some nodes and rolled back on others
fn find_divergence<C>(
    responses: &BTreeMap<NodeAddress, DiscoverResponse<C>>,
) -> Option<(Uuid, Vec<NodeAddress>, Vec<NodeAddress>)> {
    let mut by_uuid: BTreeMap<Uuid, (Vec<NodeAddress>, Vec<NodeAddress>)> = BTreeMap::new();

    for (node, response) in responses {
        let Some(latest) = &response.latest_change else {
            continue;
        };
        let (committed, rolled_back) = by_uuid.entry(latest.change_uuid).or_default();
        match latest.change_request_state {
            ChangeRequestState::Committed => committed.push(node.clone()),
            ChangeRequestState::RolledBack => rolled_back.push(node.clone()),
            ChangeRequestState::Prepared => {}
        }
    }

    by_uuid
        .into_iter()
        .find(|(_, (committed, rolled_back))| !committed.is_empty() && !rolled_back.is_empty())
        .map(|(uuid, (committed, rolled_back))| (uuid, committed, rolled_back))
}
