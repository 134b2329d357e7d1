//! Column family layout.
//!
//! Job records live in their own column family so the default one stays
//! free for future metadata.

use rocksdb::{ColumnFamilyDescriptor, DBCompressionType, Options};

/// Persisted job records, keyed by `job:{ulid}`
pub const CF_JOBS: &str = "jobs";

pub const ALL_CF_NAMES: &[&str] = &[CF_JOBS];

pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    // Records are small JSON blobs rewritten after every tick
    let mut jobs = Options::default();
    jobs.set_compression_type(DBCompressionType::Lz4);
    vec![ColumnFamilyDescriptor::new(CF_JOBS, jobs)]
}
