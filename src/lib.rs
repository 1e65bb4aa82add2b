//! File-backed IP address and port allocation.
//!
//! Every network and host is a JSON record in a data directory, guarded by an advisory lock
//! file next to it. Independent processes may call into the allocators concurrently; writes
//! to one record are serialized by an exclusive lock and reads take a shared one.

pub mod error;
pub mod host;
pub mod lock;
pub mod network;
pub mod store;

pub use error::{ErrorKind, IpamError};
pub use host::{HostAllocator, HostRecord};
pub use network::{NetworkAllocator, NetworkRecord};
