use std::env;

const HOST_ADDRESS_ENV_VAR: &str = "DURABLE_WORKER_HOST_ADDRESS";
const DEFAULT_HOST_ADDRESS: &str = "http://127.0.0.1:4001";
const DEFAULT_MAX_CONCURRENT_WORK_ITEMS: usize = 16;
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;

/// Worker-wide configuration. Only `host_address` has an environment
/// default, mirroring the original source's single `get_default_host_address()`
/// helper — everything else is a plain constructor argument, since a
/// one-field config doesn't warrant pulling in a configuration-file crate.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub host_address: String,
    pub max_concurrent_work_items: usize,
    pub reconnect_delay_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            host_address: env::var(HOST_ADDRESS_ENV_VAR).unwrap_or_else(|_| DEFAULT_HOST_ADDRESS.to_string()),
            max_concurrent_work_items: DEFAULT_MAX_CONCURRENT_WORK_ITEMS,
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
        }
    }
}

impl WorkerConfig {
    pub fn new(host_address: impl Into<String>) -> Self {
        Self {
            host_address: host_address.into(),
            ..Self::default()
        }
    }

    pub fn with_max_concurrent_work_items(mut self, max: usize) -> Self {
        self.max_concurrent_work_items = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_host_address_falls_back_when_env_var_unset() {
        unsafe {
            std::env::remove_var(HOST_ADDRESS_ENV_VAR);
        }
        assert_eq!(WorkerConfig::default().host_address, DEFAULT_HOST_ADDRESS);
    }

    #[test]
    fn new_overrides_host_address_only() {
        let config = WorkerConfig::new("http://example.com:9000");
        assert_eq!(config.host_address, "http://example.com:9000");
        assert_eq!(config.max_concurrent_work_items, DEFAULT_MAX_CONCURRENT_WORK_ITEMS);
    }
}
