use std::env;

use anyhow::{Context, Result};
use tracing::warn;

use crate::error::IdError;

/// 10-bit worker identity embedded in every generated id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerId(u16);

impl WorkerId {
    pub const MAX: u16 = 1023;

    pub fn new(id: u16) -> Result<Self, IdError> {
        if id > Self::MAX {
            return Err(IdError::WorkerIdOutOfRange(id));
        }
        Ok(Self(id))
    }

    /// Derive a worker id from the low 10 bits of the primary MAC address.
    ///
    /// MAC suffixes are only probabilistically unique across a fleet, so this
    /// logs a warning; explicit assignment is preferred for production.
    pub fn from_mac() -> Result<Self, IdError> {
        let mac = mac_address::get_mac_address()
            .ok()
            .flatten()
            .ok_or(IdError::MacUnavailable)?;

        let bytes = mac.bytes();
        let suffix = (u16::from(bytes[4]) << 8 | u16::from(bytes[5])) & Self::MAX;
        warn!(
            worker_id = suffix,
            mac = %mac,
            "worker id derived from MAC address suffix; assign one explicitly to rule out collisions"
        );
        Ok(Self(suffix))
    }

    pub fn get(&self) -> u16 {
        self.0
    }
}

/// Worker-id assignment settings.
#[derive(Debug, Clone)]
pub struct IdGeneratorConfig {
    /// Explicit worker id, 0..=1023.
    pub worker_id: Option<u16>,
    /// Fall back to MAC-derived assignment when no explicit id is set.
    pub auto_generate: bool,
}

impl Default for IdGeneratorConfig {
    fn default() -> Self {
        Self {
            worker_id: None,
            auto_generate: true,
        }
    }
}

impl IdGeneratorConfig {
    pub fn from_env() -> Result<Self> {
        let worker_id = match env::var("ID_GENERATOR_WORKER_ID") {
            Ok(raw) => Some(raw.parse().context("Invalid ID_GENERATOR_WORKER_ID")?),
            Err(_) => None,
        };

        Ok(Self {
            worker_id,
            auto_generate: env::var("ID_GENERATOR_AUTO_GENERATE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .context("Invalid ID_GENERATOR_AUTO_GENERATE")?,
        })
    }

    /// Resolve the effective worker id, preferring an explicit assignment.
    pub fn resolve(&self) -> Result<WorkerId, IdError> {
        match self.worker_id {
            Some(id) => WorkerId::new(id),
            None if self.auto_generate => WorkerId::from_mac(),
            None => Err(IdError::MacUnavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_id_range_is_enforced() {
        assert!(WorkerId::new(0).is_ok());
        assert!(WorkerId::new(1023).is_ok());
        assert!(matches!(
            WorkerId::new(1024),
            Err(IdError::WorkerIdOutOfRange(1024))
        ));
    }

    #[test]
    fn explicit_worker_id_wins_over_auto() {
        let config = IdGeneratorConfig {
            worker_id: Some(99),
            auto_generate: true,
        };
        assert_eq!(config.resolve().unwrap().get(), 99);
    }

    #[test]
    fn mac_derived_worker_id_fits_ten_bits() {
        // Environments without a usable interface report MacUnavailable;
        // both outcomes are acceptable here.
        if let Ok(worker) = WorkerId::from_mac() {
            assert!(worker.get() <= WorkerId::MAX);
        }
    }
}
