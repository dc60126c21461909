//! Node configuration
//!
//! [`Config`] is the small, immutable tuple `(degree, degree_shift,
//! backup_successors)` shared across every node in a ring. `degree_shift`
//! is derived (`log2(degree)`) and cached at construction so hot-path
//! arithmetic in [`crate::lookup`] never recomputes it.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Errors produced when constructing a [`Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// `degree` was smaller than the minimum of 2.
    #[error("degree must be >= 2 (got {0})")]
    DegreeTooSmall(u32),
    /// `degree` was not an exact power of two.
    #[error("degree must be a power of two (got {0})")]
    DegreeNotPowerOfTwo(u32),
    /// `backup_successors` was zero, which leaves no ring fallback.
    #[error("backup_successors must be >= 1 (got 0)")]
    ZeroBackupSuccessors,
}

/// Immutable per-node configuration: de Bruijn fan-out and successor-list
/// length.
///
/// Construct with [`Config::new`]; the fields are private so the
/// `degree_shift`/`degree` relationship can never be violated after
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    degree: u32,
    degree_shift: u32,
    backup_successors: u32,
}

impl Config {
    /// Construct a checked configuration.
    ///
    /// `degree` must be a power of two `>= 2`; `backup_successors` must be
    /// `>= 1` (a value of `0` would leave the ring with no successor-list
    /// fallback for termination or correction, which the lookup engine
    /// relies on).
    pub fn new(degree: u32, backup_successors: u32) -> Result<Config, ConfigError> {
        if degree < 2 {
            return Err(ConfigError::DegreeTooSmall(degree));
        }
        if !degree.is_power_of_two() {
            return Err(ConfigError::DegreeNotPowerOfTwo(degree));
        }
        if backup_successors == 0 {
            return Err(ConfigError::ZeroBackupSuccessors);
        }
        Ok(Config {
            degree,
            degree_shift: degree.trailing_zeros(),
            backup_successors,
        })
    }

    /// De Bruijn fan-out `d`.
    #[inline]
    pub fn degree(&self) -> u32 {
        self.degree
    }

    /// `log2(degree)`, the number of key bits consumed per de Bruijn hop.
    #[inline]
    pub fn degree_shift(&self) -> u32 {
        self.degree_shift
    }

    /// Successor-list length `s`.
    #[inline]
    pub fn backup_successors(&self) -> u32 {
        self.backup_successors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degree_below_two() {
        assert_eq!(Config::new(0, 4).unwrap_err(), ConfigError::DegreeTooSmall(0));
        assert_eq!(Config::new(1, 4).unwrap_err(), ConfigError::DegreeTooSmall(1));
    }

    #[test]
    fn rejects_non_power_of_two_degree() {
        assert_eq!(
            Config::new(3, 4).unwrap_err(),
            ConfigError::DegreeNotPowerOfTwo(3)
        );
        assert_eq!(
            Config::new(6, 4).unwrap_err(),
            ConfigError::DegreeNotPowerOfTwo(6)
        );
    }

    #[test]
    fn rejects_zero_backup_successors() {
        assert_eq!(Config::new(16, 0).unwrap_err(), ConfigError::ZeroBackupSuccessors);
    }

    #[test]
    fn derives_degree_shift() {
        let cfg = Config::new(16, 8).unwrap();
        assert_eq!(cfg.degree(), 16);
        assert_eq!(cfg.degree_shift(), 4);
        assert_eq!(cfg.backup_successors(), 8);

        let cfg2 = Config::new(2, 1).unwrap();
        assert_eq!(cfg2.degree_shift(), 1);
    }

    #[test]
    fn equal_inputs_produce_equal_configs() {
        // Property P5: Config(d, s) succeeds iff d is a power of two >= 2
        // and s >= 1; equal inputs produce equal configurations.
        assert_eq!(Config::new(16, 16).unwrap(), Config::new(16, 16).unwrap());
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = Config::new(8, 4).unwrap();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
