//! Command line arguments

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dynconf_model::Node;
use dynconf_nomad::{ForcedState, NomadClientConfig};

/// Dynamic configuration of a local cluster
#[derive(Clone, Debug, Parser)]
#[command(name = "dynconf", version, about, long_about = None)]
pub struct Args {
    /// Directory holding the cluster file and the node repositories
    #[arg(long, env = "DYNCONF_CONFIG_DIR")]
    pub config_dir: PathBuf,

    /// Token of the configuration lock, when the configuration is locked
    #[arg(long, env = "DYNCONF_LOCK_TOKEN")]
    pub lock_token: Option<String>,

    /// Host recorded with every change
    #[arg(long, default_value = "localhost", env = "DYNCONF_HOST")]
    pub host: String,

    /// User recorded with every change
    #[arg(long, default_value = "dynconf", env = "USER")]
    pub user: String,

    /// Timeout of a single call to a node, in milliseconds
    #[arg(long, default_value_t = 10_000, env = "DYNCONF_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Log protocol activity
    #[arg(long, env = "DYNCONF_DEBUG")]
    pub debug: bool,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// Client settings derived from the arguments
    pub fn client_config(&self) -> NomadClientConfig {
        NomadClientConfig::default()
            .with_request_timeout(Duration::from_millis(self.request_timeout_ms))
    }
}

/// `dynconf` commands
#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Write a one-stripe topology into an empty configuration directory
    Init {
        /// Cluster name
        #[arg(long)]
        name: String,

        /// A node, as <name>=<host>:<port>
        #[arg(long = "node", required = true, value_parser = parse_node)]
        nodes: Vec<Node>,
    },

    /// Activate the topology on every node
    Activate {
        /// License to install
        #[arg(long)]
        license_file: Option<PathBuf>,
    },

    /// Set a setting: <setting>[.<name>]=<value>
    Set {
        /// The assignment
        #[arg(long)]
        setting: String,

        /// Only change this node
        #[arg(long)]
        node: Option<String>,
    },

    /// Unset a setting: <setting>[.<name>]
    Unset {
        /// The setting
        #[arg(long)]
        setting: String,

        /// Only change this node
        #[arg(long)]
        node: Option<String>,
    },

    /// Attach a node to a stripe and bring its repository up to date
    Attach {
        /// Name of the stripe
        #[arg(long)]
        stripe: String,

        /// The node, as <name>=<host>:<port>
        #[arg(long, value_parser = parse_node)]
        node: Node,
    },

    /// Detach a node from its stripe and delete its repository
    Detach {
        /// The node
        #[arg(long)]
        node: String,
    },

    /// Lock the configuration
    Lock {
        /// Name of the lock holder
        #[arg(long)]
        owner: String,

        /// Tags describing the lock holder
        #[arg(long, default_value = "")]
        tags: String,
    },

    /// Unlock the configuration
    Unlock {
        /// Unlock without the lock token
        #[arg(long)]
        force: bool,
    },

    /// Print the change log of a node
    Log {
        /// The node
        #[arg(long)]
        node: String,
    },

    /// Print the state of every node and of the cluster
    Diagnostic,

    /// Settle a change left half-way
    Repair {
        /// Final state of a change recovery cannot settle on its own
        #[arg(long)]
        force: Option<ForcedState>,
    },
}

fn parse_node(s: &str) -> Result<Node, String> {
    let (name, address) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <name>=<host>:<port> but got '{s}'"))?;
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| format!("expected <host>:<port> but got '{address}'"))?;
    let port = port
        .parse()
        .map_err(|_| format!("invalid port '{port}' for node '{name}'"))?;
    Ok(Node::new(name, host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_init() {
        let args = Args::try_parse_from([
            "dynconf",
            "--config-dir",
            "/tmp/cluster",
            "init",
            "--name",
            "demo",
            "--node",
            "node-1=localhost:9410",
            "--node",
            "node-2=localhost:9420",
        ])
        .unwrap();

        let Command::Init { name, nodes } = args.command else {
            panic!("unexpected command");
        };
        assert_eq!(name, "demo");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].address(), "localhost:9420");
    }

    #[test]
    fn test_parse_node_errors() {
        assert!(parse_node("node-1").is_err());
        assert!(parse_node("node-1=localhost").is_err());
        assert!(parse_node("node-1=localhost:http").is_err());
    }

    #[test]
    fn test_parse_attach() {
        let args = Args::try_parse_from([
            "dynconf",
            "--config-dir",
            "/tmp/cluster",
            "attach",
            "--stripe",
            "stripe-1",
            "--node",
            "node-3=10.0.0.3:9430",
        ])
        .unwrap();

        let Command::Attach { stripe, node } = args.command else {
            panic!("unexpected command");
        };
        assert_eq!(stripe, "stripe-1");
        assert_eq!(node.name, "node-3");
        assert_eq!(node.address(), "10.0.0.3:9430");
    }

    #[test]
    fn test_parse_repair() {
        let args = Args::try_parse_from([
            "dynconf",
            "--config-dir",
            "/tmp/cluster",
            "--request-timeout-ms",
            "500",
            "repair",
            "--force",
            "rollback",
        ])
        .unwrap();

        assert_eq!(
            args.client_config().request_timeout,
            Duration::from_millis(500)
        );
        assert!(matches!(
            args.command,
            Command::Repair {
                force: Some(ForcedState::Rollback)
            }
        ));
    }
}
