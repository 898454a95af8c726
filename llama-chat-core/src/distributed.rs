/*
Distributed Module
Resolves the identity of this process inside a (possibly multi-process) launch
*/

use std::collections::BTreeMap;

use crate::errors::ConfigError;

pub const RANK: &str = "RANK";
pub const WORLD_SIZE: &str = "WORLD_SIZE";
pub const MASTER_ADDR: &str = "MASTER_ADDR";
pub const MASTER_PORT: &str = "MASTER_PORT";
pub const DEVICE: &str = "DEVICE";

pub const DEFAULT_RANK: &str = "0";
pub const DEFAULT_WORLD_SIZE: &str = "1";
pub const DEFAULT_MASTER_ADDR: &str = "localhost";
pub const DEFAULT_MASTER_PORT: &str = "12355";

/// Keys captured from the process environment
const PROCESS_KEYS: [&str; 5] = [RANK, WORLD_SIZE, MASTER_ADDR, MASTER_PORT, DEVICE];

/// ProcessConfig
/// A snapshot of the process level key/value configuration.
/// Launchers such as torchrun or mpirun pre-populate these values, a standalone launch leaves them empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessConfig {
    values: BTreeMap<String, String>,
}

impl ProcessConfig {
    /// Capture the distributed identity keys from the process environment
    pub fn from_env() -> Self {
        Self::from_pairs(
            PROCESS_KEYS
                .iter()
                .filter_map(|key| std::env::var(key).ok().map(|value| (*key, value))),
        )
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Write `value` under `key` unless the key is already present.
    /// Returns true when the value was written.
    pub fn set_if_absent(&mut self, key: &str, value: impl Into<String>) -> bool {
        if self.values.contains_key(key) {
            return false;
        }
        self.values.insert(key.to_string(), value.into());
        true
    }
}

/// Fill in every distributed identity key that is not already set.
/// Values provided by an external launcher are never overwritten, so calling this more than once is harmless.
pub fn bootstrap(config: &mut ProcessConfig, world_size: Option<usize>) {
    config.set_if_absent(RANK, DEFAULT_RANK);
    config.set_if_absent(
        WORLD_SIZE,
        world_size
            .map(|world_size| world_size.to_string())
            .unwrap_or_else(|| DEFAULT_WORLD_SIZE.to_string()),
    );
    config.set_if_absent(MASTER_ADDR, DEFAULT_MASTER_ADDR);
    config.set_if_absent(MASTER_PORT, DEFAULT_MASTER_PORT);
}

/// DistributedConfig
/// Typed distributed identity, passed explicitly into generator construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedConfig {
    /// Index of this process, 0 is the rendezvous host
    pub rank: usize,

    /// Total number of participating processes
    pub world_size: usize,

    /// Rendezvous host name or ip
    pub master_addr: String,

    /// Rendezvous port
    pub master_port: u16,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            rank: 0,
            world_size: 1,
            master_addr: DEFAULT_MASTER_ADDR.to_string(),
            master_port: 12355,
        }
    }
}

impl DistributedConfig {
    /// Parse a bootstrapped process config
    pub fn resolve(config: &ProcessConfig) -> Result<Self, ConfigError> {
        let rank = parse_integer(config, RANK)?;
        let world_size = parse_integer(config, WORLD_SIZE)?;
        if world_size == 0 {
            return Err(ConfigError::ZeroWorldSize);
        }
        if rank >= world_size {
            return Err(ConfigError::RankOutOfRange { rank, world_size });
        }

        let master_addr = config
            .get(MASTER_ADDR)
            .ok_or(ConfigError::Missing(MASTER_ADDR))?
            .trim()
            .to_string();
        if master_addr.is_empty() {
            return Err(ConfigError::EmptyAddress);
        }

        let port = config
            .get(MASTER_PORT)
            .ok_or(ConfigError::Missing(MASTER_PORT))?;
        let master_port = match port.trim().parse::<u16>() {
            Ok(0) | Err(_) => return Err(ConfigError::InvalidPort(port.to_string())),
            Ok(port) => port,
        };

        Ok(Self {
            rank,
            world_size,
            master_addr,
            master_port,
        })
    }

    /// Whether this process hosts the rendezvous
    pub fn is_leader(&self) -> bool {
        self.rank == 0
    }

    pub fn rendezvous_addr(&self) -> String {
        format!("{}:{}", self.master_addr, self.master_port)
    }
}

fn parse_integer(config: &ProcessConfig, key: &'static str) -> Result<usize, ConfigError> {
    let value = config.get(key).ok_or(ConfigError::Missing(key))?;
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidInteger {
            key,
            value: value.to_string(),
        })
}
