use dashmap::DashMap;
use keeper_config::LogType;
use tracing::debug;
use xxhash_rust::xxh64::xxh64;

const FIELD_SEPARATOR: u8 = 0x1F;
/// Slot for a view with no servers in it. Not a valid panel identifier.
const EMPTY_SET_KEY: &str = "\u{1F}empty";

/// Last published content hash per server id.
///
/// Entries are overwritten on every check and never expire.
#[derive(Debug, Default)]
pub struct ChangeCache {
    hashes: DashMap<String, u64>,
}

/// Hash of the displayed fields, in order.
pub fn content_hash(fields: &[&str]) -> u64 {
    let mut buffer = Vec::with_capacity(fields.iter().map(|f| f.len() + 1).sum());
    for field in fields {
        buffer.extend_from_slice(field.as_bytes());
        buffer.push(FIELD_SEPARATOR);
    }
    xxh64(&buffer, 0)
}

impl ChangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when any of `ids` had a different or no stored hash.
    /// `hash` is stored for all of them either way. An empty `ids`
    /// compares against its own slot, so an empty view publishes once.
    pub fn has_changed(&self, ids: &[&str], hash: u64) -> bool {
        let changed = if ids.is_empty() {
            self.hashes.insert(EMPTY_SET_KEY.to_string(), hash) != Some(hash)
        } else {
            self.hashes.remove(EMPTY_SET_KEY);
            self.store(ids, hash)
        };

        debug!(
            log_type = LogType::Cache.as_str(),
            "Content hash {:016x} for {} id(s): {}",
            hash,
            ids.len(),
            if changed { "changed" } else { "unchanged" }
        );
        changed
    }

    fn store(&self, ids: &[&str], hash: u64) -> bool {
        let mut changed = false;
        for id in ids {
            let previous = self.hashes.insert(id.to_string(), hash);
            if previous != Some(hash) {
                changed = true;
            }
        }
        changed
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}
