use super::env::{parse_u64, parse_usize};
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub heartbeat_interval_secs: u64,
    /// Capacity of the publish -> tracker and tracker -> learning channels
    pub channel_capacity: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 5,
            channel_capacity: 256,
        }
    }
}

impl LifecycleConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            heartbeat_interval_secs: parse_u64("HEARTBEAT_INTERVAL_SECS", d.heartbeat_interval_secs)?.max(1),
            channel_capacity: parse_usize("LIFECYCLE_CHANNEL_CAPACITY", d.channel_capacity)?.max(1),
        })
    }
}
