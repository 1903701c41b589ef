//! Client side of the protocol
//!
//! A [`NomadClient`] drives discovery, change and recovery runs against a
//! fixed set of [`NomadEndpoint`]s. Each run builds its own
//! [`ConsistencyAnalyzer`] and never holds any state across phases: safety
//! comes from every server's mutation counter.

mod analyzer;
mod change;
mod config;
mod discovery;
mod endpoint;
mod fanout;
mod receiver;
mod recovery;

pub use analyzer::{ClusterInconsistency, ConsistencyAnalyzer, GlobalState, OtherClient};
pub use change::{ChangeOutcome, ChangePhase, ServerFailure};
pub use config::{ConcurrencySizing, DEFAULT_MAX_CONCURRENCY, NomadClientConfig};
pub use endpoint::{LocalEndpoint, NodeAddress, NomadEndpoint};
pub use receiver::{
    ChangeResultsReceiver, CommitRollbackResultsReceiver, DiscoverResultsReceiver,
    LoggingResultsReceiver, RecoveryResultsReceiver,
};
pub use recovery::{ForcedState, RecoveryOutcome};

use std::sync::Arc;

use tracing::debug;

use crate::change::NomadChange;
use crate::error::{NomadError, NomadResult};

/// Entry point for changing the configuration of a set of nodes
pub struct NomadClient<C: NomadChange> {
    endpoints: Vec<Arc<dyn NomadEndpoint<C>>>,
    host: String,
    user: String,
    config: NomadClientConfig,
}

impl<C: NomadChange> std::fmt::Debug for NomadClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NomadClient")
            .field(
                "endpoints",
                &self
                    .endpoints
                    .iter()
                    .map(|e| e.address().clone())
                    .collect::<Vec<_>>(),
            )
            .field("host", &self.host)
            .field("user", &self.user)
            .field("config", &self.config)
            .finish()
    }
}

impl<C: NomadChange> NomadClient<C> {
    /// Create a client acting as `user` on `host`
    pub fn new(
        endpoints: Vec<Arc<dyn NomadEndpoint<C>>>,
        host: impl Into<String>,
        user: impl Into<String>,
    ) -> NomadResult<Self> {
        if endpoints.is_empty() {
            return Err(NomadError::Configuration(
                "There must be at least one server".to_string(),
            ));
        }

        Ok(Self {
            endpoints,
            host: host.into(),
            user: user.into(),
            config: NomadClientConfig::default(),
        })
    }

    /// Replace the timeouts and fan-out limits
    pub fn with_config(mut self, config: NomadClientConfig) -> Self {
        self.config = config;
        self
    }

    /// The configured endpoints
    pub fn endpoints(&self) -> &[Arc<dyn NomadEndpoint<C>>] {
        &self.endpoints
    }

    /// The active configuration
    pub fn config(&self) -> &NomadClientConfig {
        &self.config
    }

    /// Discover every node without changing anything
    pub async fn discover<R>(&self, receiver: &R) -> ConsistencyAnalyzer<C>
    where
        R: DiscoverResultsReceiver<C> + ?Sized,
    {
        discovery::discover_cluster(&self.config, &self.endpoints, self.endpoints.len(), receiver)
            .await
    }

    /// Apply `change` on every node, or on none
    pub async fn try_apply_change<R>(&self, receiver: &R, change: C) -> ChangeOutcome
    where
        R: ChangeResultsReceiver<C> + ?Sized,
    {
        debug!("Applying change: {}", change.summary());
        change::ChangeProcess::new(self).apply_change(receiver, change).await
    }

    /// Heal a cluster left in a partial state.
    ///
    /// `expected_node_count` is the size of the whole cluster: when it
    /// exceeds the number of endpoints the missing nodes count as
    /// unreachable. A count below the number of endpoints is raised to it.
    /// `forced_state` settles states recovery cannot decide on its own.
    pub async fn try_recovery<R>(
        &self,
        receiver: &R,
        expected_node_count: usize,
        forced_state: Option<ForcedState>,
    ) -> RecoveryOutcome
    where
        R: RecoveryResultsReceiver<C> + ?Sized,
    {
        recovery::RecoveryProcess::new(self)
            .recover(receiver, expected_node_count, forced_state)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::change::ChangeRequestState;
    use crate::test_helpers::{TestChange, local_endpoints, new_test_cluster};
    use assert_matches::assert_matches;
    use tracing_test::traced_test;

    #[test]
    fn test_client_requires_endpoints() {
        let result = NomadClient::<TestChange>::new(Vec::new(), "host", "user");
        assert_matches!(result, Err(NomadError::Configuration(_)));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_apply_change_on_every_node() {
        let cluster = new_test_cluster(&["node-1", "node-2", "node-3"]);
        let client = NomadClient::new(local_endpoints(&cluster), "host", "user").unwrap();

        let outcome = client
            .try_apply_change(&LoggingResultsReceiver, TestChange::set("a"))
            .await;
        let ChangeOutcome::Applied {
            change_uuid,
            version,
        } = &outcome
        else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert_eq!(*version, 1);

        for (_, server) in &cluster {
            let changes = server.get_all_nomad_changes().await.unwrap();
            assert_eq!(changes.len(), 1);
            assert_eq!(changes[0].change_uuid, *change_uuid);
            assert_eq!(changes[0].change_request_state, ChangeRequestState::Committed);
        }

        let analyzer = client.discover(&LoggingResultsReceiver).await;
        assert_eq!(analyzer.global_state(), GlobalState::Accepting);
        assert!(logs_contain("committed on every node"));
    }

    #[tokio::test]
    async fn test_recovery_on_healthy_cluster() {
        let cluster = new_test_cluster(&["node-1", "node-2"]);
        let client = NomadClient::new(local_endpoints(&cluster), "host", "user").unwrap();

        let outcome = client.try_recovery(&LoggingResultsReceiver, 2, None).await;
        assert_eq!(outcome, RecoveryOutcome::NothingToRecover);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_node_count_below_endpoints_is_raised() {
        let cluster = new_test_cluster(&["node-1", "node-2", "node-3"]);
        let client = NomadClient::new(local_endpoints(&cluster), "host", "user").unwrap();

        let outcome = client.try_recovery(&LoggingResultsReceiver, 1, None).await;
        assert_eq!(outcome, RecoveryOutcome::NothingToRecover);
        assert!(logs_contain(
            "Expected node count 1 is below the 3 configured endpoints, using 3"
        ));
    }
}
