//! IP address allocation within a CIDR block.

use crate::error::{IpamError, Result};
use crate::lock::LockMode;
use crate::store::RecordStore;
use ipnet::IpNet;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;


const NAMESPACE: &str = "network";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRecord {
    #[serde(alias = "CIDR")]
    pub cidr: String,
    /// Address ID -> assigned address.
    #[serde(alias = "Allocated", default)]
    pub allocations: BTreeMap<String, IpAddr>,
}

impl NetworkRecord {
    fn new(cidr: &str) -> Self {
        Self {
            cidr: cidr.to_string(),
            allocations: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
pub struct NetworkAllocator {
    store: RecordStore<NetworkRecord>,
}

impl NetworkAllocator {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: RecordStore::new(data_dir, NAMESPACE),
        }
    }

    pub fn create_network(&self, network_id: &str, cidr: &str) -> Result<()> {
        let net = parse_cidr(cidr)?;
        let _lock = self.store.lock(network_id, LockMode::Exclusive)?;

        if self.store.exists(network_id)? {
            return Err(IpamError::already_exists(NAMESPACE, network_id));
        }

        self.store.save(network_id, &NetworkRecord::new(cidr))?;
        info!("Created network {} ({})", network_id, net);
        Ok(())
    }

    pub fn destroy_network(&self, network_id: &str) -> Result<()> {
        let _lock = self.store.lock(network_id, LockMode::Exclusive)?;
        self.store.delete(network_id)?;
        info!("Destroyed network {}", network_id);
        Ok(())
    }

    /// Assigns `address_id` the lowest free host address of the network.
    pub fn allocate_address(&self, network_id: &str, address_id: &str) -> Result<IpAddr> {
        let _lock = self.store.lock(network_id, LockMode::Exclusive)?;
        let mut record = self.store.load(network_id)?;

        if record.allocations.contains_key(address_id) {
            return Err(IpamError::already_exists("address", address_id));
        }

        let net = self.stored_cidr(network_id, &record)?;
        let used: HashSet<IpAddr> = record.allocations.values().copied().collect();
        let address = first_free_address(net, &used)
            .ok_or_else(|| IpamError::exhausted("address", network_id))?;

        record.allocations.insert(address_id.to_string(), address);
        self.store.save(network_id, &record)?;
        info!(
            "Allocated {} to {} in network {}",
            address, address_id, network_id
        );
        Ok(address)
    }

    pub fn free_address(&self, network_id: &str, address_id: &str) -> Result<()> {
        let _lock = self.store.lock(network_id, LockMode::Exclusive)?;
        let mut record = self.store.load(network_id)?;

        let address = record
            .allocations
            .remove(address_id)
            .ok_or_else(|| IpamError::not_found("address", address_id))?;

        self.store.save(network_id, &record)?;
        info!(
            "Freed {} from {} in network {}",
            address, address_id, network_id
        );
        Ok(())
    }

    pub fn list_allocations(&self, network_id: &str) -> Result<BTreeMap<String, IpAddr>> {
        let _lock = self.store.lock(network_id, LockMode::Shared)?;
        let record = self.store.load(network_id)?;
        debug!(
            "Network {} has {} allocations",
            network_id,
            record.allocations.len()
        );
        Ok(record.allocations)
    }

    fn stored_cidr(&self, network_id: &str, record: &NetworkRecord) -> Result<IpNet> {
        record.cidr.parse::<IpNet>().map_err(|e| IpamError::Corrupt {
            path: self.store.record_path(network_id).unwrap_or_default(),
            reason: format!("stored CIDR '{}' is invalid: {}", record.cidr, e),
        })
    }
}

pub fn parse_cidr(cidr: &str) -> Result<IpNet> {
    cidr.parse::<IpNet>()
        .map_err(|e| IpamError::InvalidArgument(format!("invalid CIDR '{}': {}", cidr, e)))
}

/// Walks `net` upward from its network address and returns the first address that is
/// neither the network address, the broadcast address, nor in `used`.
///
/// Each step either returns or skips an address from `used`, so the walk ends after at
/// most `used.len() + 2` steps no matter how large the block is.
pub fn first_free_address(net: IpNet, used: &HashSet<IpAddr>) -> Option<IpAddr> {
    let (network, broadcast) = bounds(net);
    let mut candidate = network;

    loop {
        if candidate != network && candidate != broadcast {
            let address = to_address(net, candidate);
            if !used.contains(&address) {
                return Some(address);
            }
        }
        if candidate == broadcast {
            return None;
        }
        candidate += 1;
    }
}

fn bounds(net: IpNet) -> (u128, u128) {
    match net {
        IpNet::V4(net) => (
            u128::from(u32::from(net.network())),
            u128::from(u32::from(net.broadcast())),
        ),
        IpNet::V6(net) => (u128::from(net.network()), u128::from(net.broadcast())),
    }
}

fn to_address(net: IpNet, value: u128) -> IpAddr {
    match net {
        // Values come from within a v4 block, so they fit in 32 bits.
        IpNet::V4(_) => IpAddr::V4(Ipv4Addr::from(value as u32)),
        IpNet::V6(_) => IpAddr::V6(Ipv6Addr::from(value)),
    }
}
