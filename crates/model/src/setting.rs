//! Named settings and where they apply

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::uid::Uid;

/// Where a setting lives in the topology
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SettingScope {
    /// One value for the whole cluster
    Cluster,
    /// One value per node
    Node,
}

/// Lifecycle stage of a cluster, as far as settings are concerned
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClusterState {
    /// Topology is being built, nothing is running yet
    Configuring,
    /// The cluster has been activated
    Activated,
}

/// A known setting
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Setting {
    /// Name of the cluster
    ClusterName,
    /// How long clients may take to reconnect after a failover
    ClientReconnectWindow,
    /// Lease granted to clients
    ClientLeaseDuration,
    /// Availability or consistency, with its voter count
    FailoverPriority,
    /// Named off-heap resources and their sizes
    OffheapResources,
    /// Name of a node
    NodeName,
    /// Hostname a node binds to
    NodeHostname,
    /// Port a node listens on
    NodePort,
    /// Log directory of a node
    NodeLogDir,
    /// Backup directory of a node
    NodeBackupDir,
    /// Named data directories of a node
    DataDirs,
    /// Named server properties of a node
    TcProperties,
}

impl Setting {
    /// Every known setting
    pub const ALL: [Setting; 12] = [
        Self::ClusterName,
        Self::ClientReconnectWindow,
        Self::ClientLeaseDuration,
        Self::FailoverPriority,
        Self::OffheapResources,
        Self::NodeName,
        Self::NodeHostname,
        Self::NodePort,
        Self::NodeLogDir,
        Self::NodeBackupDir,
        Self::DataDirs,
        Self::TcProperties,
    ];

    /// The name used on the command line and in stored configurations
    pub fn key(self) -> &'static str {
        match self {
            Self::ClusterName => "cluster-name",
            Self::ClientReconnectWindow => "client-reconnect-window",
            Self::ClientLeaseDuration => "client-lease-duration",
            Self::FailoverPriority => "failover-priority",
            Self::OffheapResources => "offheap-resources",
            Self::NodeName => "name",
            Self::NodeHostname => "hostname",
            Self::NodePort => "port",
            Self::NodeLogDir => "log-dir",
            Self::NodeBackupDir => "backup-dir",
            Self::DataDirs => "data-dirs",
            Self::TcProperties => "tc-properties",
        }
    }

    /// Where the setting lives
    pub fn scope(self) -> SettingScope {
        match self {
            Self::ClusterName
            | Self::ClientReconnectWindow
            | Self::ClientLeaseDuration
            | Self::FailoverPriority
            | Self::OffheapResources => SettingScope::Cluster,
            Self::NodeName
            | Self::NodeHostname
            | Self::NodePort
            | Self::NodeLogDir
            | Self::NodeBackupDir
            | Self::DataDirs
            | Self::TcProperties => SettingScope::Node,
        }
    }

    /// Whether values are addressed by an entry name (`key.name=value`)
    pub fn is_map(self) -> bool {
        matches!(
            self,
            Self::OffheapResources | Self::DataDirs | Self::TcProperties
        )
    }

    /// Whether the setting may be changed in the given cluster state
    pub fn is_writable_when(self, state: ClusterState) -> bool {
        match state {
            ClusterState::Configuring => true,
            ClusterState::Activated => !matches!(
                self,
                Self::NodeName | Self::NodeHostname | Self::NodePort
            ),
        }
    }

    /// Whether the setting may be removed rather than only replaced
    pub fn allows_unset(self) -> bool {
        !matches!(
            self,
            Self::ClusterName | Self::NodeName | Self::NodeHostname | Self::NodePort
        )
    }
}

impl Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for Setting {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|setting| setting.key() == s)
            .ok_or_else(|| ModelError::UnknownSetting(s.to_string()))
    }
}

/// The part of the topology a setting change targets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "level", content = "uid", rename_all = "lowercase")]
pub enum Applicability {
    /// Every node, or the cluster itself for cluster settings
    Cluster,
    /// Every node of one stripe
    Stripe(Uid),
    /// A single node
    Node(Uid),
}

impl Display for Applicability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster => write!(f, "cluster"),
            Self::Stripe(uid) => write!(f, "stripe {uid}"),
            Self::Node(uid) => write!(f, "node {uid}"),
        }
    }
}
