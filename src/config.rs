//! Storage node configuration, parsed from `--flag value` pairs.

use crate::membership::types::NodeId;
use anyhow::{Context, Result, bail};
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 9101;
const DEFAULT_DATA_DIR: &str = "./data/storage-node";
const DEFAULT_LOCK_STRIPES: usize = 64;

pub const USAGE: &str = "Usage: storage-node [--port <port>] [--data-dir <path>] [--node-id <id>] \
[--advertise <host:port>] [--seed <host:port>]... [--lock-stripes <n>] [--log-level <level>]";

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub node_id: NodeId,
    /// Address other nodes and coordinators use to reach this node.
    pub advertise: String,
    /// Peers announced to on startup.
    pub seeds: Vec<String>,
    pub lock_stripes: usize,
    pub log_level: tracing::Level,
}

impl NodeConfig {
    pub fn from_env() -> Result<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self::from_args(&args)
    }

    /// Parses flags, excluding the program name.
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut port = DEFAULT_PORT;
        let mut data_dir = PathBuf::from(DEFAULT_DATA_DIR);
        let mut node_id: Option<NodeId> = None;
        let mut advertise: Option<String> = None;
        let mut seeds = Vec::new();
        let mut lock_stripes = DEFAULT_LOCK_STRIPES;
        let mut log_level = tracing::Level::INFO;

        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--port" => {
                    port = value(args, i)?
                        .parse()
                        .with_context(|| format!("invalid --port {:?}", args[i + 1]))?;
                }
                "--data-dir" => data_dir = PathBuf::from(value(args, i)?),
                "--node-id" => node_id = Some(NodeId::from(value(args, i)?)),
                "--advertise" => advertise = Some(value(args, i)?.to_string()),
                "--seed" => seeds.push(value(args, i)?.to_string()),
                "--lock-stripes" => {
                    lock_stripes = value(args, i)?
                        .parse()
                        .with_context(|| format!("invalid --lock-stripes {:?}", args[i + 1]))?;
                    if lock_stripes == 0 {
                        bail!("--lock-stripes must be at least 1");
                    }
                }
                "--log-level" => {
                    log_level = value(args, i)?
                        .parse()
                        .with_context(|| format!("invalid --log-level {:?}", args[i + 1]))?;
                }
                other => bail!("unknown argument {:?}\n{}", other, USAGE),
            }
            i += 2;
        }

        Ok(Self {
            port,
            data_dir,
            node_id: node_id.unwrap_or_default(),
            advertise: advertise.unwrap_or_else(|| format!("127.0.0.1:{}", port)),
            seeds,
            lock_stripes,
            log_level,
        })
    }
}

fn value(args: &[String], i: usize) -> Result<&str> {
    args.get(i + 1)
        .map(String::as_str)
        .with_context(|| format!("{} requires a value\n{}", args[i], USAGE))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        let config = NodeConfig::from_args(&[]).unwrap();

        assert_eq!(config.port, 9101);
        assert_eq!(config.data_dir, PathBuf::from("./data/storage-node"));
        assert_eq!(config.advertise, "127.0.0.1:9101");
        assert_eq!(config.lock_stripes, 64);
        assert_eq!(config.log_level, tracing::Level::INFO);
        assert!(config.seeds.is_empty());
        assert!(!config.node_id.as_str().is_empty());
    }

    #[test]
    fn test_all_flags() {
        let config = NodeConfig::from_args(&args(&[
            "--port",
            "9200",
            "--data-dir",
            "/tmp/node-a",
            "--node-id",
            "node-a",
            "--seed",
            "10.0.0.1:9101",
            "--seed",
            "10.0.0.2:9101",
            "--lock-stripes",
            "8",
            "--log-level",
            "debug",
        ]))
        .unwrap();

        assert_eq!(config.port, 9200);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/node-a"));
        assert_eq!(config.node_id, NodeId::from("node-a"));
        assert_eq!(config.advertise, "127.0.0.1:9200");
        assert_eq!(config.seeds, vec!["10.0.0.1:9101", "10.0.0.2:9101"]);
        assert_eq!(config.lock_stripes, 8);
        assert_eq!(config.log_level, tracing::Level::DEBUG);
    }

    #[test]
    fn test_explicit_advertise() {
        let config =
            NodeConfig::from_args(&args(&["--advertise", "storage-1.internal:9101"])).unwrap();

        assert_eq!(config.advertise, "storage-1.internal:9101");
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(NodeConfig::from_args(&args(&["--port"])).is_err());
        assert!(NodeConfig::from_args(&args(&["--port", "not-a-port"])).is_err());
        assert!(NodeConfig::from_args(&args(&["--lock-stripes", "0"])).is_err());
        assert!(NodeConfig::from_args(&args(&["--log-level", "loud"])).is_err());
        assert!(NodeConfig::from_args(&args(&["--bogus", "1"])).is_err());
    }
}
