//! Test helpers for driving Nomad clusters in memory
//!
//! The helpers use a toy change type that appends a string to a list, which
//! is enough to observe ordering, rejection and checkpoint behaviour.

use std::sync::Arc;

use dynconf_storage::StorageNamespace;
use dynconf_storage_memory::MemoryStorage;
use serde::{Deserialize, Serialize};

use crate::change::NomadChange;
use crate::client::{LocalEndpoint, NomadEndpoint};
use crate::server::{ChangeApplicator, NomadServer, PotentialApplicationResult};

/// Appends `value` to the configuration list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestChange {
    /// The appended value
    pub value: String,
    /// Whether the change is a checkpoint
    pub checkpoint: bool,
}

impl TestChange {
    /// A regular change
    pub fn set(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            checkpoint: false,
        }
    }

    /// A checkpoint change
    pub fn checkpoint(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            checkpoint: true,
        }
    }
}

impl NomadChange for TestChange {
    fn summary(&self) -> String {
        format!("append '{}'", self.value)
    }

    fn is_checkpoint(&self) -> bool {
        self.checkpoint
    }
}

/// Configuration produced by [`TestChange`]s
pub type TestConfig = Vec<String>;

/// Applicator for [`TestChange`]; refuses the value [`TestApplicator::FORBIDDEN`]
#[derive(Clone, Debug, Default)]
pub struct TestApplicator;

impl TestApplicator {
    /// Value every node refuses
    pub const FORBIDDEN: &'static str = "forbidden";
}

impl ChangeApplicator<TestChange, TestConfig> for TestApplicator {
    fn try_apply(
        &self,
        existing: Option<&TestConfig>,
        change: &TestChange,
    ) -> PotentialApplicationResult<TestConfig> {
        if change.value == Self::FORBIDDEN {
            return PotentialApplicationResult::Reject(format!(
                "'{}' is not an allowed value",
                change.value
            ));
        }
        let mut config = existing.cloned().unwrap_or_default();
        config.push(change.value.clone());
        PotentialApplicationResult::Allow(config)
    }
}

/// A server over memory storage
pub type TestServer = NomadServer<TestChange, TestConfig, MemoryStorage>;

/// Create a fresh in-memory server
pub fn new_test_server(name: &str) -> TestServer {
    NomadServer::new(
        MemoryStorage::new(),
        StorageNamespace::new(name),
        Arc::new(TestApplicator),
    )
}

/// Create one fresh server per name
pub fn new_test_cluster(names: &[&str]) -> Vec<(String, Arc<TestServer>)> {
    names
        .iter()
        .map(|name| (name.to_string(), Arc::new(new_test_server(name))))
        .collect()
}

/// Wrap servers as in-process endpoints
pub fn local_endpoints(
    servers: &[(String, Arc<TestServer>)],
) -> Vec<Arc<dyn NomadEndpoint<TestChange>>> {
    servers
        .iter()
        .map(|(name, server)| {
            Arc::new(LocalEndpoint::new(name.clone(), server.clone()))
                as Arc<dyn NomadEndpoint<TestChange>>
        })
        .collect()
}
