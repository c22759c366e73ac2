// Copyright (C) 2022 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! How many cases each check runs, and how big they get.

use std::str::FromStr;

use crate::gen;

/// Case counts and generation parameters shared by every check in a run.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Config {
    /// Cases for cheap property checks (message and textual round-trips).
    #[cfg_attr(feature = "serde", serde(default = "default_cases"))]
    pub cases: usize,

    /// Cases for checks that drive the incremental decoder (round-trip, chunked round-trip,
    /// fuzz decode), which are comparatively expensive.
    #[cfg_attr(feature = "serde", serde(default = "default_expensive_cases"))]
    pub expensive_cases: usize,

    /// Longest arbitrary input fed to the decoder by the fuzz check. At most
    /// [`crate::gen::MAX_RAW_LEN`].
    #[cfg_attr(feature = "serde", serde(default = "default_max_size"))]
    pub max_size: usize,

    /// Seed for every check's random source.
    #[cfg_attr(feature = "serde", serde(default))]
    pub seed: u64,
}

fn default_cases() -> usize {
    256
}

fn default_expensive_cases() -> usize {
    50
}

fn default_max_size() -> usize {
    100
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cases: default_cases(),
            expensive_cases: default_expensive_cases(),
            max_size: default_max_size(),
            seed: 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {var} should be a non-negative integer; got {value:?}")]
    BadVar { var: &'static str, value: String },

    #[error("environment variable {var} should be at most {max}; got {value}")]
    OutOfRange {
        var: &'static str,
        value: usize,
        max: usize,
    },
}

impl Config {
    pub fn with_cases(mut self, cases: usize) -> Self {
        self.cases = cases;
        self
    }

    pub fn with_expensive_cases(mut self, cases: usize) -> Self {
        self.expensive_cases = cases;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Returns the defaults overridden by any of `WIRECHECK_CASES`, `WIRECHECK_EXPENSIVE_CASES`,
    /// `WIRECHECK_MAX_SIZE`, and `WIRECHECK_SEED`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overridden_by(|var| std::env::var(var).ok())
    }

    /// Applies overrides looked up by variable name.
    pub fn overridden_by<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        override_var(&lookup, "WIRECHECK_CASES", &mut self.cases)?;
        override_var(&lookup, "WIRECHECK_EXPENSIVE_CASES", &mut self.expensive_cases)?;
        override_var(&lookup, "WIRECHECK_MAX_SIZE", &mut self.max_size)?;
        if self.max_size > gen::MAX_RAW_LEN {
            return Err(ConfigError::OutOfRange {
                var: "WIRECHECK_MAX_SIZE",
                value: self.max_size,
                max: gen::MAX_RAW_LEN,
            });
        }
        override_var(&lookup, "WIRECHECK_SEED", &mut self.seed)?;
        Ok(self)
    }
}

fn override_var<F, T>(lookup: &F, var: &'static str, field: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(var) {
        *field = T::from_str(value.trim()).map_err(|_| ConfigError::BadVar { var, value })?;
    }
    Ok(())
}
