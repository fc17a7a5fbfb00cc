//! Configuration of lookup table generation.

use crate::io;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::{Path, PathBuf},
    thread,
};

/// Number of Monte Carlo samples used by default for each texel.
pub const DEFAULT_SAMPLE_COUNT: u32 = 16384;

/// Number of consecutive samples integrated by default before their partial
/// sums are combined with those of other sample chunks.
pub const DEFAULT_SAMPLE_GRAIN_SIZE: usize = 64;

/// Default width of the lookup table (the number of view angles).
pub const DEFAULT_WIDTH: u32 = 128;

/// Default height of the lookup table (the number of roughness values).
pub const DEFAULT_HEIGHT: u32 = 128;

/// Configuration parameters for the Monte Carlo integration of a single
/// texel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    /// Number of samples drawn from the Hammersley point set.
    pub sample_count: NonZeroU32,
    /// Number of consecutive samples in each partial sum of the reduction.
    pub sample_grain_size: NonZeroUsize,
}

/// Configuration parameters for generating the lookup table and writing it
/// to file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupTableConfig {
    /// Number of texels along the view angle axis.
    pub width: u32,
    /// Number of texels along the roughness axis.
    pub height: u32,
    /// Number of worker threads integrating texels.
    pub n_worker_threads: NonZeroUsize,
    /// Number of consecutive texels handed to a worker at a time.
    pub texel_grain_size: NonZeroUsize,
    pub integration: IntegrationConfig,
    pub output: OutputConfig,
}

/// Where and how the finished lookup table is written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path of the DDS texture to write, or [`None`] to skip it.
    pub dds_file_path: Option<PathBuf>,
    /// Path of the generated C++ header to write, or [`None`] to skip it.
    pub source_file_path: Option<PathBuf>,
    /// Prefix for the identifiers declared in the generated header.
    pub identifier_prefix: String,
}

impl LookupTableConfig {
    /// Reads the configuration from the RON file at the given path. Fields
    /// missing from the file get their default values.
    ///
    /// # Errors
    /// Returns an error if the file can not be read or parsed, or if the
    /// resulting configuration is invalid (see [`Self::validate`]).
    pub fn from_ron_file(file_path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = io::parse_ron_file(file_path)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration describes a table that can be built.
    ///
    /// # Errors
    /// Returns an error if the table is narrower or lower than two texels,
    /// or if the identifier prefix is not a valid C++ identifier.
    pub fn validate(&self) -> Result<()> {
        if self.width < 2 || self.height < 2 {
            bail!(
                "Lookup table dimensions must be at least 2x2, got {}x{}",
                self.width,
                self.height
            );
        }
        io::source::validate_identifier_prefix(&self.output.identifier_prefix)
    }
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            sample_count: NonZeroU32::new(DEFAULT_SAMPLE_COUNT).unwrap(),
            sample_grain_size: NonZeroUsize::new(DEFAULT_SAMPLE_GRAIN_SIZE).unwrap(),
        }
    }
}

impl Default for LookupTableConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            n_worker_threads: thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
            texel_grain_size: NonZeroUsize::MIN,
            integration: IntegrationConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dds_file_path: Some(PathBuf::from(
                "hemispherical_directional_reflectance_lut.dds",
            )),
            source_file_path: Some(PathBuf::from(
                "hemispherical_directional_reflectance_lut.h",
            )),
            identifier_prefix: "brx_hdr_lut".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = LookupTableConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.integration.sample_count.get(), 16384);
        assert_eq!(config.integration.sample_grain_size.get(), 64);
    }

    #[test]
    fn missing_fields_get_default_values() {
        let config: LookupTableConfig =
            ron::from_str("(width: 64, integration: (sample_count: 1024))").unwrap();
        assert_eq!(config.width, 64);
        assert_eq!(config.height, DEFAULT_HEIGHT);
        assert_eq!(config.integration.sample_count.get(), 1024);
        assert_eq!(
            config.integration.sample_grain_size.get(),
            DEFAULT_SAMPLE_GRAIN_SIZE
        );
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn output_paths_can_be_disabled() {
        let config: LookupTableConfig =
            ron::from_str("(output: (dds_file_path: None, identifier_prefix: \"brdf\"))").unwrap();
        assert!(config.output.dds_file_path.is_none());
        assert!(config.output.source_file_path.is_some());
        assert_eq!(config.output.identifier_prefix, "brdf");
    }

    #[test]
    fn zero_sample_count_is_rejected_when_parsing() {
        assert!(ron::from_str::<IntegrationConfig>("(sample_count: 0)").is_err());
    }

    #[test]
    fn too_small_table_is_invalid() {
        let config = LookupTableConfig {
            width: 1,
            ..LookupTableConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_identifier_prefix_is_rejected() {
        let mut config = LookupTableConfig::default();
        config.output.identifier_prefix = "2fast".to_owned();
        assert!(config.validate().is_err());
    }
}
