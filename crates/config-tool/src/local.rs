//! A cluster whose node repositories live in one local directory
//!
//! ```text
//! <dir>/cluster.json          topology to activate, then the attached nodes
//! <dir>/license.json          installed license, if any
//! <dir>/nodes/<node name>/    file storage of each node's repository
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dynconf_model::{Cluster, DynamicConfigNomadChange, License};
use dynconf_nomad::client::LocalEndpoint;
use dynconf_nomad::{NomadClient, NomadClientConfig, NomadEndpoint};
use dynconf_server::{
    ConfigChangeApplicator, ConfigNomadServer, DynamicConfigurationPassiveSync,
    InMemoryLicenseService, LicenseService, SyncOutcome, TracingConfigListener,
    config_nomad_server,
};
use dynconf_storage_fs::FsStorage;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Topology file
pub const CLUSTER_FILE: &str = "cluster.json";

/// License file
pub const LICENSE_FILE: &str = "license.json";

const NODES_DIR: &str = "nodes";

/// The nodes of a local cluster and their repositories
pub struct LocalCluster {
    dir: PathBuf,
    topology: Cluster,
    servers: Vec<(String, Arc<ConfigNomadServer<FsStorage>>)>,
}

impl std::fmt::Debug for LocalCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCluster")
            .field("dir", &self.dir)
            .field("cluster", &self.topology.name)
            .field("nodes", &self.servers.len())
            .finish()
    }
}

impl LocalCluster {
    /// Write `topology` into an empty configuration directory
    pub async fn init(dir: impl AsRef<Path>, topology: Cluster) -> Result<Self> {
        let dir = dir.as_ref();
        topology.validate()?;

        let path = dir.join(CLUSTER_FILE);
        if fs::try_exists(&path).await.map_err(|e| Error::io(&path, e))? {
            return Err(Error::Usage(format!(
                "{} is already initialized",
                dir.display()
            )));
        }

        fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::io(dir, e))?;
        write_topology(dir, &topology).await?;

        info!(
            "Initialized cluster '{}' with {} node(s) in {}",
            topology.name,
            topology.node_count(),
            dir.display()
        );
        Self::open(dir).await
    }

    /// Open an initialized configuration directory
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let path = dir.join(CLUSTER_FILE);

        let json = match fs::read(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::Usage(format!(
                    "{} is not initialized: run `dynconf init` first",
                    dir.display()
                )));
            }
            Err(e) => return Err(Error::io(&path, e)),
        };
        let topology: Cluster = serde_json::from_slice(&json)?;

        let servers = topology
            .nodes()
            .map(|node| (node.name.clone(), node_server(&dir, &node.name)))
            .collect();

        debug!("Opened {}", dir.display());
        Ok(Self {
            dir,
            topology,
            servers,
        })
    }

    /// The configuration directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The topology written at init, or by the latest attach or detach
    pub fn topology(&self) -> &Cluster {
        &self.topology
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.servers.len()
    }

    /// The repository of a node
    pub fn server(&self, node_name: &str) -> Result<&Arc<ConfigNomadServer<FsStorage>>> {
        self.servers
            .iter()
            .find(|(name, _)| name == node_name)
            .map(|(_, server)| server)
            .ok_or_else(|| Error::Usage(format!("unknown node '{node_name}'")))
    }

    /// The committed cluster configuration, once activated
    pub async fn current_cluster(&self) -> Result<Option<Cluster>> {
        for (_, server) in &self.servers {
            if let Some((_, context)) = server.get_current_config().await? {
                return Ok(Some(context.cluster));
            }
        }
        Ok(None)
    }

    /// A client over every node
    pub fn client(
        &self,
        host: &str,
        user: &str,
        config: NomadClientConfig,
    ) -> Result<NomadClient<DynamicConfigNomadChange>> {
        let endpoints = self
            .servers
            .iter()
            .map(|(name, server)| {
                Arc::new(LocalEndpoint::new(name.clone(), server.clone()))
                    as Arc<dyn NomadEndpoint<DynamicConfigNomadChange>>
            })
            .collect();
        Ok(NomadClient::new(endpoints, host, user)?.with_config(config))
    }

    /// Bring up the repository of a node attached to `topology` and sync it
    /// from the repository of `active`.
    ///
    /// Whatever a previous node of the same name left on disk is wiped first.
    /// The node joins the cluster and `topology` is written once the sync
    /// succeeded.
    pub async fn attach(
        &mut self,
        topology: Cluster,
        node_name: &str,
        active: &str,
    ) -> Result<SyncOutcome> {
        let server = node_server(&self.dir, node_name);
        server.reset().await?;

        let active_license: Arc<dyn LicenseService> = match self.license().await? {
            Some(content) => Arc::new(InMemoryLicenseService::with_content(content)),
            None => Arc::new(InMemoryLicenseService::new()),
        };
        let sync_data =
            DynamicConfigurationPassiveSync::new(self.server(active)?.clone(), active_license)
                .get_sync_data()
                .await?;

        let passive = DynamicConfigurationPassiveSync::new(
            server.clone(),
            Arc::new(InMemoryLicenseService::new()) as Arc<dyn LicenseService>,
        );
        let outcome = passive.sync(&sync_data).await?;
        info!("Node '{}' synced from '{}': {}", node_name, active, outcome);

        self.servers.push((node_name.to_string(), server));
        self.save_topology(topology).await?;
        Ok(outcome)
    }

    /// Take a node out of the cluster, before its removal is applied.
    ///
    /// Nothing is written: a failed removal leaves the directory untouched.
    pub fn take_out(&mut self, node_name: &str) -> Result<()> {
        let position = self
            .servers
            .iter()
            .position(|(name, _)| name == node_name)
            .ok_or_else(|| Error::Usage(format!("unknown node '{node_name}'")))?;
        self.servers.remove(position);
        Ok(())
    }

    /// Record a detached node: write `topology` and delete the node's repository
    pub async fn detach(&mut self, topology: Cluster, node_name: &str) -> Result<()> {
        self.save_topology(topology).await?;

        let path = self.dir.join(NODES_DIR).join(node_name);
        match fs::remove_dir_all(&path).await {
            Ok(()) => info!("Deleted the repository of node '{}'", node_name),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Node '{}' had no repository", node_name);
            }
            Err(e) => return Err(Error::io(&path, e)),
        }
        Ok(())
    }

    async fn save_topology(&mut self, topology: Cluster) -> Result<()> {
        topology.validate()?;
        write_topology(&self.dir, &topology).await?;
        self.topology = topology;
        Ok(())
    }

    /// Validate and install license content
    pub async fn install_license(&self, content: &str) -> Result<License> {
        let license = License::parse(content)?;
        let path = self.dir.join(LICENSE_FILE);
        fs::write(&path, content)
            .await
            .map_err(|e| Error::io(&path, e))?;
        Ok(license)
    }

    /// The installed license content
    pub async fn license(&self) -> Result<Option<String>> {
        let path = self.dir.join(LICENSE_FILE);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(&path, e)),
        }
    }
}

fn node_server(dir: &Path, node_name: &str) -> Arc<ConfigNomadServer<FsStorage>> {
    let storage = FsStorage::new(dir.join(NODES_DIR).join(node_name));
    let applicator =
        ConfigChangeApplicator::new(node_name).with_listener(Arc::new(TracingConfigListener));
    Arc::new(config_nomad_server(storage, applicator))
}

async fn write_topology(dir: &Path, topology: &Cluster) -> Result<()> {
    let path = dir.join(CLUSTER_FILE);
    let json = serde_json::to_vec_pretty(topology)?;
    fs::write(&path, json)
        .await
        .map_err(|e| Error::io(&path, e))
}
