//! Transport seam between the client and each node's Nomad server

use std::fmt::{self, Display};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use dynconf_storage::{LogStorage, MetadataStorage};

use crate::change::NomadChange;
use crate::error::EndpointError;
use crate::messages::{AcceptRejectResponse, DiscoverResponse, MutativeMessage};
use crate::server::NomadServer;

/// Address a node is known by, e.g. `host:port` or a node name
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Create a new node address
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The address as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

/// A request/response channel to one node's Nomad server.
///
/// Transport failures are reported as [`EndpointError`]s. Protocol refusals
/// are successful calls answering [`AcceptRejectResponse::Reject`].
#[async_trait]
pub trait NomadEndpoint<C>: Send + Sync + 'static
where
    C: NomadChange,
{
    /// Address of the node behind this endpoint
    fn address(&self) -> &NodeAddress;

    /// Establish the connection; no-op for connectionless transports
    async fn connect(&self) -> Result<(), EndpointError> {
        Ok(())
    }

    /// Query the node's protocol state
    async fn discover(&self) -> Result<DiscoverResponse<C>, EndpointError>;

    /// Deliver a mutative message
    async fn send(&self, message: MutativeMessage<C>)
    -> Result<AcceptRejectResponse, EndpointError>;
}

/// In-process endpoint calling a [`NomadServer`] directly
pub struct LocalEndpoint<C, T, S> {
    address: NodeAddress,
    server: Arc<NomadServer<C, T, S>>,
}

impl<C, T, S> LocalEndpoint<C, T, S> {
    /// Wrap `server` as the node at `address`
    pub fn new(address: impl Into<String>, server: Arc<NomadServer<C, T, S>>) -> Self {
        Self {
            address: NodeAddress::new(address),
            server,
        }
    }
}

#[async_trait]
impl<C, T, S> NomadEndpoint<C> for LocalEndpoint<C, T, S>
where
    C: NomadChange,
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    S: LogStorage + MetadataStorage,
{
    fn address(&self) -> &NodeAddress {
        &self.address
    }

    async fn discover(&self) -> Result<DiscoverResponse<C>, EndpointError> {
        Ok(self.server.discover().await?)
    }

    async fn send(
        &self,
        message: MutativeMessage<C>,
    ) -> Result<AcceptRejectResponse, EndpointError> {
        Ok(self.server.process(message).await?)
    }
}
