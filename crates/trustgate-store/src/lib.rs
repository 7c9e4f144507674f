// crates/trustgate-store/src/lib.rs
//
// trustgate-store: File-backed storage for TrustGate.
//
// Provides the per-broker reputation store (one text file per broker, counters
// only grow), the directory-backed `StoreSource` the aggregator reads from, the
// base-topology and network-map codecs, and write-then-rename file replacement
// so readers never observe a partially written file.

pub mod atomic;
pub mod network_map;
pub mod reputation_store;
pub mod store_dir;

// Re-export key types for ergonomic access from downstream crates.
pub use atomic::write_atomic;
pub use network_map::{read_network_map, read_topology, render_network_map, write_network_map, MapLine};
pub use reputation_store::{Counters, ReputationStore};
pub use store_dir::{store_file_name, StoreDirectory};
