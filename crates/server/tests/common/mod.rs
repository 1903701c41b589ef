//! Nodes of one stripe, each with its own in-memory repository

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dynconf_model::{
    Applicability, Cluster, DynamicConfigNomadChange, Node, Setting, SettingChange, Stripe,
};
use dynconf_nomad::{MutativeMessage, NomadChangeInfo};
use dynconf_server::{
    ConfigChangeApplicator, ConfigNomadServer, DynamicConfigurationPassiveSync,
    InMemoryLicenseService, LicenseService, TracingConfigListener, config_nomad_server,
};
use dynconf_storage_memory::MemoryStorage;
use uuid::Uuid;

pub const LICENSE: &str = r#"{"capabilities":{"OffHeap":4096},"expiryDate":"2032-12-31"}"#;

/// Two nodes, one stripe
pub fn stripe_cluster() -> Cluster {
    Cluster::new(
        "sync-test",
        vec![Stripe::new(
            "stripe-1",
            vec![
                Node::new("node-1", "localhost", 9410),
                Node::new("node-2", "localhost", 9420),
            ],
        )],
    )
}

pub fn activation(cluster: &Cluster) -> DynamicConfigNomadChange {
    DynamicConfigNomadChange::activation(cluster.clone()).unwrap()
}

/// `offheap-resources.<name>=<size>` for the whole cluster
pub fn offheap(name: &str, size: &str) -> DynamicConfigNomadChange {
    DynamicConfigNomadChange::Setting(
        SettingChange::set(
            Applicability::Cluster,
            Setting::OffheapResources,
            Some(name),
            size,
        )
        .unwrap(),
    )
}

pub struct TestNode {
    pub server: Arc<ConfigNomadServer<MemoryStorage>>,
    pub license: Arc<InMemoryLicenseService>,
    pub sync: DynamicConfigurationPassiveSync<MemoryStorage>,
}

impl TestNode {
    pub fn new(name: &str) -> Self {
        let applicator =
            ConfigChangeApplicator::new(name).with_listener(Arc::new(TracingConfigListener));
        let server = Arc::new(config_nomad_server(MemoryStorage::new(), applicator));
        let license = Arc::new(InMemoryLicenseService::new());
        let sync = DynamicConfigurationPassiveSync::new(
            server.clone(),
            license.clone() as Arc<dyn LicenseService>,
        );
        Self {
            server,
            license,
            sync,
        }
    }

    /// Prepare `change` as an administrator would
    pub async fn prepare(
        &self,
        change: DynamicConfigNomadChange,
        uuid: Uuid,
        timestamp: DateTime<Utc>,
    ) {
        let discovery = self.server.discover().await.unwrap();
        let message = MutativeMessage::prepare(
            discovery.mutative_message_count,
            "admin-host",
            "admin",
            timestamp,
            uuid,
            discovery.highest_version + 1,
            change,
        );
        let response = self.server.process(message).await.unwrap();
        assert!(response.is_accepted(), "{response:?}");
    }

    /// Commit or roll back the prepared change
    pub async fn settle(&self, uuid: Uuid, commit: bool) {
        let count = self.server.discover().await.unwrap().mutative_message_count;
        let message = if commit {
            MutativeMessage::commit(count, "admin-host", "admin", Utc::now(), uuid)
        } else {
            MutativeMessage::rollback(count, "admin-host", "admin", Utc::now(), uuid)
        };
        let response = self.server.process(message).await.unwrap();
        assert!(response.is_accepted(), "{response:?}");
    }

    /// Prepare then commit
    pub async fn commit(&self, change: DynamicConfigNomadChange) -> Uuid {
        let uuid = Uuid::new_v4();
        self.prepare(change, uuid, Utc::now()).await;
        self.settle(uuid, true).await;
        uuid
    }

    /// Prepare then roll back
    pub async fn roll_back(&self, change: DynamicConfigNomadChange) -> Uuid {
        let uuid = Uuid::new_v4();
        self.prepare(change, uuid, Utc::now()).await;
        self.settle(uuid, false).await;
        uuid
    }

    pub async fn changes(&self) -> Vec<NomadChangeInfo<DynamicConfigNomadChange>> {
        self.server.get_all_nomad_changes().await.unwrap()
    }

    pub async fn cluster(&self) -> Option<Cluster> {
        self.server
            .get_current_config()
            .await
            .unwrap()
            .map(|(_, context)| context.cluster)
    }
}
