//! Shared key namespace.
//!
//! Every key the engine writes lives under a single configurable root:
//!
//! - `{root}:{environment}:{protocol}` — card cache hash, partitioned
//!   by environment+protocol to bound hash size and let queries fan
//!   out only over relevant partitions
//! - `{root}:operations:{operation}:in-progress:{identifier}` — dedup
//!   lock string with TTL
//! - `{root}:stats:{name}` — client metric counters

/// Metric counter names under `{root}:stats:`.
pub const STAT_ACTIVE_CLIENTS: &str = "current_clients_count";
pub const STAT_LIFETIME_CLIENTS: &str = "lifetime_clients_count";
pub const STAT_MAX_CONCURRENT_CLIENTS: &str = "max_concurrent_clients_count";

/// Builder for namespaced store keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    root: String,
}

impl KeySpace {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Card cache partition: `{root}:{environment}:{protocol}`.
    pub fn cache(&self, environment: &str, protocol: &str) -> String {
        format!("{}:{}:{}", self.root, environment, protocol)
    }

    /// Dedup lock: `{root}:operations:{operation}:in-progress:{identifier}`.
    pub fn lock(&self, operation: &str, identifier: &str) -> String {
        format!(
            "{}:operations:{}:in-progress:{}",
            self.root, operation, identifier
        )
    }

    /// Metric counter: `{root}:stats:{name}`.
    pub fn stat(&self, name: &str) -> String {
        format!("{}:stats:{}", self.root, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys_are_partitioned() {
        let keys = KeySpace::new("cardbox");
        assert_eq!(keys.cache("qa", "api"), "cardbox:qa:api");
        assert_eq!(keys.cache("uat", "ui"), "cardbox:uat:ui");
    }

    #[test]
    fn lock_keys_carry_operation_and_identifier() {
        let keys = KeySpace::new("cardbox");
        assert_eq!(
            keys.lock("download", "12-31-2025_08-30-00_AM"),
            "cardbox:operations:download:in-progress:12-31-2025_08-30-00_AM"
        );
    }

    #[test]
    fn stat_keys_live_under_stats() {
        let keys = KeySpace::new("cardbox");
        assert_eq!(
            keys.stat(STAT_ACTIVE_CLIENTS),
            "cardbox:stats:current_clients_count"
        );
    }
}
