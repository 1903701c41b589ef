//! Test helpers for driving a Nomad client against in-process servers
//!
//! Servers run over memory storage. Every endpoint can be told to fail,
//! lose replies, stall or be interfered with by another client.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dynconf_nomad::client::{
    ChangeResultsReceiver, CommitRollbackResultsReceiver, DiscoverResultsReceiver,
    LocalEndpoint, RecoveryOutcome, RecoveryResultsReceiver,
};
use dynconf_nomad::{
    AcceptRejectResponse, ChangeApplicator, ChangeOutcome, DiscoverResponse, EndpointError,
    MutativeMessage, NodeAddress, NomadChange, NomadClient, NomadEndpoint, NomadServer,
    PotentialApplicationResult,
};
use dynconf_storage::StorageNamespace;
use dynconf_storage_memory::MemoryStorage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sets or removes one key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvChange {
    pub key: String,
    pub value: Option<String>,
}

impl KvChange {
    pub fn set(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: Some(value.to_string()),
        }
    }
}

impl NomadChange for KvChange {
    fn summary(&self) -> String {
        match &self.value {
            Some(value) => format!("set {}={}", self.key, value),
            None => format!("unset {}", self.key),
        }
    }
}

pub type KvConfig = BTreeMap<String, String>;

/// Refuses one key, when configured to
pub struct KvApplicator {
    forbidden_key: Option<String>,
}

impl ChangeApplicator<KvChange, KvConfig> for KvApplicator {
    fn try_apply(
        &self,
        existing: Option<&KvConfig>,
        change: &KvChange,
    ) -> PotentialApplicationResult<KvConfig> {
        if self.forbidden_key.as_deref() == Some(change.key.as_str()) {
            return PotentialApplicationResult::Reject(format!("{} is read-only", change.key));
        }
        let mut config = existing.cloned().unwrap_or_default();
        match &change.value {
            Some(value) => config.insert(change.key.clone(), value.clone()),
            None => config.remove(&change.key),
        };
        PotentialApplicationResult::Allow(config)
    }
}

pub type KvServer = NomadServer<KvChange, KvConfig, MemoryStorage>;

/// Endpoint with injectable faults
pub struct FaultyEndpoint {
    inner: LocalEndpoint<KvChange, KvConfig, MemoryStorage>,
    server: Arc<KvServer>,
    fail_discover: AtomicBool,
    interfere_after_discover: AtomicBool,
    fail_on: Mutex<HashSet<&'static str>>,
    lose_reply_on: Mutex<HashSet<&'static str>>,
    delay: Mutex<Option<Duration>>,
}

impl FaultyEndpoint {
    fn new(name: &str, server: Arc<KvServer>) -> Self {
        Self {
            inner: LocalEndpoint::new(name, server.clone()),
            server,
            fail_discover: AtomicBool::new(false),
            interfere_after_discover: AtomicBool::new(false),
            fail_on: Mutex::new(HashSet::new()),
            lose_reply_on: Mutex::new(HashSet::new()),
            delay: Mutex::new(None),
        }
    }

    /// Make discovery fail
    pub fn fail_discover(&self) {
        self.fail_discover.store(true, Ordering::SeqCst);
    }

    /// Refuse to deliver messages of this kind
    pub fn fail_on(&self, mutation: &'static str) {
        self.fail_on.lock().unwrap().insert(mutation);
    }

    /// Deliver messages of this kind but report a connection failure
    pub fn lose_reply_on(&self, mutation: &'static str) {
        self.lose_reply_on.lock().unwrap().insert(mutation);
    }

    /// Stall every call
    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Let another client take the node over right after the next discovery
    pub fn interfere_after_discover(&self) {
        self.interfere_after_discover.store(true, Ordering::SeqCst);
    }

    /// Back to normal operation
    pub fn clear_faults(&self) {
        self.fail_discover.store(false, Ordering::SeqCst);
        self.interfere_after_discover.store(false, Ordering::SeqCst);
        self.fail_on.lock().unwrap().clear();
        self.lose_reply_on.lock().unwrap().clear();
        *self.delay.lock().unwrap() = None;
    }

    async fn stall(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl NomadEndpoint<KvChange> for FaultyEndpoint {
    fn address(&self) -> &NodeAddress {
        self.inner.address()
    }

    async fn discover(&self) -> Result<DiscoverResponse<KvChange>, EndpointError> {
        self.stall().await;
        if self.fail_discover.load(Ordering::SeqCst) {
            return Err(EndpointError::Connection("connection refused".to_string()));
        }

        let response = self.inner.discover().await?;
        if self.interfere_after_discover.swap(false, Ordering::SeqCst) {
            let takeover = MutativeMessage::takeover(
                response.mutative_message_count,
                "intruder-host",
                "intruder",
                Utc::now(),
            );
            self.server.process(takeover).await?;
        }
        Ok(response)
    }

    async fn send(
        &self,
        message: MutativeMessage<KvChange>,
    ) -> Result<AcceptRejectResponse, EndpointError> {
        self.stall().await;
        let kind = message.mutation.name();
        if self.fail_on.lock().unwrap().contains(kind) {
            return Err(EndpointError::Connection(format!("{kind} not delivered")));
        }

        let response = self.inner.send(message).await?;
        if self.lose_reply_on.lock().unwrap().contains(kind) {
            return Err(EndpointError::Connection(format!("{kind} reply lost")));
        }
        Ok(response)
    }
}

/// A set of servers with faulty endpoints in front of them
pub struct TestCluster {
    pub servers: Vec<Arc<KvServer>>,
    pub endpoints: Vec<Arc<FaultyEndpoint>>,
}

impl TestCluster {
    pub fn new(size: usize) -> Self {
        Self::with_forbidden_keys(vec![None; size])
    }

    /// One node per entry, refusing the given key
    pub fn with_forbidden_keys(forbidden: Vec<Option<&str>>) -> Self {
        let mut servers = Vec::new();
        let mut endpoints = Vec::new();

        for (i, forbidden_key) in forbidden.into_iter().enumerate() {
            let name = format!("node-{}", i + 1);
            let server = Arc::new(NomadServer::new(
                MemoryStorage::new(),
                StorageNamespace::new(name.clone()),
                Arc::new(KvApplicator {
                    forbidden_key: forbidden_key.map(str::to_string),
                }) as Arc<dyn ChangeApplicator<KvChange, KvConfig>>,
            ));
            endpoints.push(Arc::new(FaultyEndpoint::new(&name, server.clone())));
            servers.push(server);
        }

        Self { servers, endpoints }
    }

    pub fn endpoint(&self, node: usize) -> &FaultyEndpoint {
        &self.endpoints[node - 1]
    }

    pub fn server(&self, node: usize) -> &KvServer {
        &self.servers[node - 1]
    }

    /// A client over the given nodes (1-based)
    pub fn client_for(&self, nodes: &[usize]) -> NomadClient<KvChange> {
        let endpoints = nodes
            .iter()
            .map(|n| self.endpoints[n - 1].clone() as Arc<dyn NomadEndpoint<KvChange>>)
            .collect();
        NomadClient::new(endpoints, "client-host", "tester").unwrap()
    }

    /// A client over every node
    pub fn client(&self) -> NomadClient<KvChange> {
        let nodes: Vec<usize> = (1..=self.servers.len()).collect();
        self.client_for(&nodes)
    }

    /// Prepare a change directly on the given nodes, as a client that then crashes
    pub async fn prepare_on(&self, nodes: &[usize], version: u64, change: KvChange) -> Uuid {
        let uuid = Uuid::new_v4();
        for n in nodes {
            let server = self.server(*n);
            let count = server.discover().await.unwrap().mutative_message_count;
            let message = MutativeMessage::prepare(
                count,
                "crashed-host",
                "crashed",
                Utc::now(),
                uuid,
                version,
                change.clone(),
            );
            assert!(server.process(message).await.unwrap().is_accepted());
        }
        uuid
    }

    /// Commit a prepared change directly on the given nodes
    pub async fn commit_on(&self, nodes: &[usize], uuid: Uuid) {
        for n in nodes {
            let server = self.server(*n);
            let count = server.discover().await.unwrap().mutative_message_count;
            let message = MutativeMessage::commit(count, "crashed-host", "crashed", Utc::now(), uuid);
            assert!(server.process(message).await.unwrap().is_accepted());
        }
    }

    /// Current committed configuration of every node
    pub async fn configs(&self) -> Vec<Option<KvConfig>> {
        let mut configs = Vec::new();
        for server in &self.servers {
            configs.push(server.get_current_config().await.unwrap().map(|(_, c)| c));
        }
        configs
    }
}

/// Receiver recording every event as a line of text
#[derive(Default)]
pub struct RecordingReceiver {
    events: Mutex<Vec<String>>,
}

impl RecordingReceiver {
    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn saw(&self, prefix: &str) -> bool {
        self.events().iter().any(|e| e.starts_with(prefix))
    }
}

impl DiscoverResultsReceiver<KvChange> for RecordingReceiver {
    fn discovered(&self, node: &NodeAddress, _response: &DiscoverResponse<KvChange>) {
        self.record(format!("discovered {node}"));
    }

    fn discover_fail(&self, node: &NodeAddress, reason: &str) {
        self.record(format!("discover_fail {node} {reason}"));
    }

    fn discover_other_client(
        &self,
        node: &NodeAddress,
        last_mutation_host: Option<&str>,
        _last_mutation_user: Option<&str>,
    ) {
        self.record(format!(
            "discover_other_client {node} {}",
            last_mutation_host.unwrap_or("?")
        ));
    }
}

impl CommitRollbackResultsReceiver for RecordingReceiver {
    fn committed(&self, node: &NodeAddress) {
        self.record(format!("committed {node}"));
    }

    fn commit_fail(&self, node: &NodeAddress, reason: &str) {
        self.record(format!("commit_fail {node} {reason}"));
    }

    fn rolled_back(&self, node: &NodeAddress) {
        self.record(format!("rolled_back {node}"));
    }

    fn rollback_fail(&self, node: &NodeAddress, reason: &str) {
        self.record(format!("rollback_fail {node} {reason}"));
    }
}

impl ChangeResultsReceiver<KvChange> for RecordingReceiver {
    fn start_prepare(&self, change_uuid: Uuid) {
        self.record(format!("start_prepare {change_uuid}"));
    }

    fn prepared(&self, node: &NodeAddress) {
        self.record(format!("prepared {node}"));
    }

    fn prepare_change_unacceptable(&self, node: &NodeAddress, reason: &str) {
        self.record(format!("prepare_change_unacceptable {node} {reason}"));
    }

    fn change_done(&self, outcome: &ChangeOutcome) {
        self.record(format!("change_done {outcome}"));
    }
}

impl RecoveryResultsReceiver<KvChange> for RecordingReceiver {
    fn taken_over(&self, node: &NodeAddress) {
        self.record(format!("taken_over {node}"));
    }

    fn recovery_done(&self, outcome: &RecoveryOutcome) {
        self.record(format!("recovery_done {outcome}"));
    }
}
