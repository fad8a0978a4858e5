/*!
 * Simulator Configuration
 * Environment-driven tunables with defaults
 */

use crate::core::types::{Cycles, Size};
use crate::scheduler::Policy;
use log::warn;
use serde::Serialize;
use std::str::FromStr;

pub const DEFAULT_TOTAL_RAM: Size = 4096;
pub const DEFAULT_PAGE_SIZE: Size = 256;
pub const DEFAULT_CACHE_CAPACITY: usize = 16;
pub const DEFAULT_QUANTUM: Cycles = 50;
pub const DEFAULT_MAILBOX_COUNT: usize = 10;
pub const DEFAULT_MAILBOX_CAPACITY: usize = 32;
pub const DEFAULT_INTAKE_CAPACITY: usize = 64;

/// Simulator configuration
///
/// Every field can be overridden through an `OSSIM_*` environment
/// variable; malformed values fall back to the default with a warning.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SimConfig {
    pub total_ram: Size,
    pub page_size: Size,
    pub cache_capacity: usize,
    pub quantum: Cycles,
    pub policy: Policy,
    pub mailbox_count: usize,
    pub mailbox_capacity: usize,
    pub intake_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            total_ram: DEFAULT_TOTAL_RAM,
            page_size: DEFAULT_PAGE_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            quantum: DEFAULT_QUANTUM,
            policy: Policy::RoundRobin,
            mailbox_count: DEFAULT_MAILBOX_COUNT,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            intake_capacity: DEFAULT_INTAKE_CAPACITY,
        }
    }
}

impl SimConfig {
    /// Build a configuration from the environment, falling back to
    /// defaults for anything unset
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            total_ram: env_or("OSSIM_TOTAL_RAM", defaults.total_ram),
            page_size: env_or("OSSIM_PAGE_SIZE", defaults.page_size),
            cache_capacity: env_or("OSSIM_CACHE_CAP", defaults.cache_capacity),
            quantum: env_or("OSSIM_QUANTUM", defaults.quantum),
            policy: env_or("OSSIM_POLICY", defaults.policy),
            mailbox_count: env_or("OSSIM_MAILBOXES", defaults.mailbox_count),
            mailbox_capacity: env_or("OSSIM_MAILBOX_CAP", defaults.mailbox_capacity),
            intake_capacity: env_or("OSSIM_INTAKE_CAP", defaults.intake_capacity),
        }
    }

    /// Number of physical frames derived from total RAM and page size
    pub fn frame_capacity(&self) -> usize {
        self.total_ram / self.page_size
    }
}

fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("ignoring malformed {}={:?}, using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_capacity_derived_from_ram_and_page_size() {
        let config = SimConfig::default();
        assert_eq!(
            config.frame_capacity(),
            DEFAULT_TOTAL_RAM / DEFAULT_PAGE_SIZE
        );
    }

    #[test]
    fn defaults_are_consistent() {
        let config = SimConfig::default();
        assert!(config.frame_capacity() > 0);
        assert!(config.mailbox_count > 0);
    }
}
