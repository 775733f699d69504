//! Where a node's commands run, and the `host:port/path` spec syntax.

use crate::error::{Result, SyncError};
use crate::exec::shell_join;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default ssh port when a node spec omits one
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default remote shell program
pub const DEFAULT_SSH_PROGRAM: &str = "ssh";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeAddress {
    /// Commands run directly on this host
    Local,
    /// Commands run through a remote shell
    Remote { host: String, port: u16 },
}

impl NodeAddress {
    pub fn remote(host: impl Into<String>, port: u16) -> Self {
        NodeAddress::Remote {
            host: host.into(),
            port,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, NodeAddress::Local)
    }

    /// Wrap `argv` for execution at this address.
    ///
    /// Remote commands become `<ssh> -p<port> <host> "<argv>"`.
    pub fn wrap(&self, ssh_program: &str, argv: Vec<String>) -> Vec<String> {
        match self {
            NodeAddress::Local => argv,
            NodeAddress::Remote { host, port } => vec![
                ssh_program.to_string(),
                format!("-p{}", port),
                host.clone(),
                shell_join(&argv),
            ],
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeAddress::Local => f.write_str("local"),
            NodeAddress::Remote { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

/// Parsed node specification: `<host>[:<port>]/<absolute path>` or a bare
/// absolute path for the local host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub address: NodeAddress,
    pub mount_point: PathBuf,
}

impl FromStr for NodeSpec {
    type Err = SyncError;

    fn from_str(spec: &str) -> Result<Self> {
        let invalid = |reason: &str| SyncError::InvalidNodeSpec {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        if spec.starts_with('/') {
            return Ok(NodeSpec {
                address: NodeAddress::Local,
                mount_point: PathBuf::from(spec),
            });
        }

        let slash = spec
            .find('/')
            .ok_or_else(|| invalid("missing absolute mount point"))?;
        let (authority, path) = spec.split_at(slash);

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port.parse().map_err(|_| invalid("invalid port"))?;
                if port == 0 {
                    return Err(invalid("port must be non-zero"));
                }
                (host, port)
            }
            None => (authority, DEFAULT_SSH_PORT),
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }

        Ok(NodeSpec {
            address: NodeAddress::remote(host, port),
            mount_point: PathBuf::from(path),
        })
    }
}

impl fmt::Display for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            NodeAddress::Local => write!(f, "{}", self.mount_point.display()),
            remote => write!(f, "{}{}", remote, self.mount_point.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_remote_spec() {
        let spec: NodeSpec = "target-host:10022/mnt".parse().unwrap();
        assert_eq!(spec.address, NodeAddress::remote("target-host", 10022));
        assert_eq!(spec.mount_point, PathBuf::from("/mnt"));
        assert_eq!(spec.to_string(), "target-host:10022/mnt");
    }

    #[test]
    fn test_parse_default_port() {
        let spec: NodeSpec = "backup@nas/srv/backup".parse().unwrap();
        assert_eq!(spec.address, NodeAddress::remote("backup@nas", 22));
        assert_eq!(spec.mount_point, PathBuf::from("/srv/backup"));
    }

    #[test]
    fn test_parse_local_spec() {
        let spec: NodeSpec = "/mnt".parse().unwrap();
        assert!(spec.address.is_local());
        assert_eq!(spec.to_string(), "/mnt");
    }

    #[test]
    fn test_parse_invalid_specs() {
        for bad in ["host", "host:abc/mnt", "host:0/mnt", ":22/mnt", "host:99999/mnt", ""] {
            assert!(
                matches!(bad.parse::<NodeSpec>(), Err(SyncError::InvalidNodeSpec { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_wrap_remote() {
        let addr = NodeAddress::remote("foo", 123);
        let argv = vec!["btrfs".to_string(), "receive".to_string(), "/foo".to_string()];
        assert_eq!(
            addr.wrap("ssh", argv),
            vec!["ssh", "-p123", "foo", "btrfs receive /foo"]
        );
    }

    #[test]
    fn test_wrap_local_is_identity() {
        let argv = vec!["btrfs".to_string(), "send".to_string()];
        assert_eq!(NodeAddress::Local.wrap("ssh", argv.clone()), argv);
    }
}
