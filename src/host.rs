//! Port allocation within a host's contiguous port range.

use crate::error::{IpamError, Result};
use crate::lock::LockMode;
use crate::store::RecordStore;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::ops::RangeInclusive;
use std::path::PathBuf;


const NAMESPACE: &str = "host";

pub const MIN_PORT: i64 = 1;
pub const MAX_PORT: i64 = 65535;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRecord {
    pub port_range_start: u16,
    pub port_range_end: u16,
    /// Port ID -> assigned port.
    #[serde(alias = "allocatedPorts", default)]
    pub allocations: BTreeMap<String, u16>,
}

impl HostRecord {
    pub fn range(&self) -> RangeInclusive<u16> {
        self.port_range_start..=self.port_range_end
    }
}

#[derive(Debug)]
pub struct HostAllocator {
    store: RecordStore<HostRecord>,
}

impl HostAllocator {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: RecordStore::new(data_dir, NAMESPACE),
        }
    }

    /// Ports are taken as wide integers so out-of-range input is reported rather than
    /// truncated.
    pub fn create_host(&self, host_id: &str, start_port: i64, end_port: i64) -> Result<()> {
        let (start, end) = validate_range(start_port, end_port)?;
        let _lock = self.store.lock(host_id, LockMode::Exclusive)?;

        if self.store.exists(host_id)? {
            return Err(IpamError::already_exists(NAMESPACE, host_id));
        }

        let record = HostRecord {
            port_range_start: start,
            port_range_end: end,
            allocations: BTreeMap::new(),
        };
        self.store.save(host_id, &record)?;
        info!("Created host {} with ports {}-{}", host_id, start, end);
        Ok(())
    }

    pub fn delete_host(&self, host_id: &str) -> Result<()> {
        let _lock = self.store.lock(host_id, LockMode::Exclusive)?;
        self.store.delete(host_id)?;
        info!("Deleted host {}", host_id);
        Ok(())
    }

    /// Assigns `port_id` the lowest free port in the host's range.
    pub fn allocate_port(&self, host_id: &str, port_id: &str) -> Result<u16> {
        let _lock = self.store.lock(host_id, LockMode::Exclusive)?;
        let mut record = self.load(host_id)?;

        if record.allocations.contains_key(port_id) {
            return Err(IpamError::already_exists("port", port_id));
        }

        let used: HashSet<u16> = record.allocations.values().copied().collect();
        let port = record
            .range()
            .find(|port| !used.contains(port))
            .ok_or_else(|| IpamError::exhausted("port", host_id))?;

        record.allocations.insert(port_id.to_string(), port);
        self.store.save(host_id, &record)?;
        info!("Allocated port {} to {} on host {}", port, port_id, host_id);
        Ok(port)
    }

    pub fn free_port(&self, host_id: &str, port_id: &str) -> Result<()> {
        let _lock = self.store.lock(host_id, LockMode::Exclusive)?;
        let mut record = self.load(host_id)?;

        let port = record
            .allocations
            .remove(port_id)
            .ok_or_else(|| IpamError::not_found("port", port_id))?;

        self.store.save(host_id, &record)?;
        info!("Freed port {} from {} on host {}", port, port_id, host_id);
        Ok(())
    }

    pub fn list_ports(&self, host_id: &str) -> Result<BTreeMap<String, u16>> {
        let _lock = self.store.lock(host_id, LockMode::Shared)?;
        let record = self.load(host_id)?;
        debug!(
            "Host {} has {} ports allocated",
            host_id,
            record.allocations.len()
        );
        Ok(record.allocations)
    }

    /// Loads a record and rejects ranges that `create_host` would never have written.
    fn load(&self, host_id: &str) -> Result<HostRecord> {
        let record = self.store.load(host_id)?;
        let (start, end) = (record.port_range_start, record.port_range_end);

        if let Err(e) = validate_range(i64::from(start), i64::from(end)) {
            return Err(IpamError::Corrupt {
                path: self.store.record_path(host_id)?,
                reason: format!("stored port range {}-{} is invalid: {}", start, end, e),
            });
        }
        Ok(record)
    }
}

fn validate_range(start_port: i64, end_port: i64) -> Result<(u16, u16)> {
    if start_port < MIN_PORT || end_port > MAX_PORT {
        return Err(IpamError::InvalidArgument(format!(
            "port range must be between {} and {}",
            MIN_PORT, MAX_PORT
        )));
    }
    if start_port > end_port {
        return Err(IpamError::InvalidArgument(format!(
            "start port {} must be <= end port {}",
            start_port, end_port
        )));
    }
    // Both bounds are now within 1..=65535.
    Ok((start_port as u16, end_port as u16))
}
