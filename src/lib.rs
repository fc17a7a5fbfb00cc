//! Generation of lookup tables of the hemispherical-directional reflectance
//! of the Trowbridge-Reitz (GGX) specular microfacet BRDF.
//!
//! Each texel holds the zeroth moments `f0_norm` and `f90_norm` of the
//! Schlick Fresnel weights, so that the directional albedo for any `F0` and
//! `F90` is `F0 * f0_norm + F90 * f90_norm`. The cosine of the view angle
//! decreases along the width of the table and the roughness decreases along
//! its height.

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]
#![warn(clippy::cast_lossless)]

#[macro_use]
mod macros;

pub mod config;
pub mod integration;
pub mod io;
pub mod microfacet;
pub mod sequence;
pub mod table;
pub mod thread;
pub mod validation;

pub use config::{IntegrationConfig, LookupTableConfig, OutputConfig};
pub use integration::{ReflectanceNorm, SampleEvaluator};
pub use table::{LookupTableBuilder, ReflectanceLookupTable};

use anyhow::Result;

/// Builds the lookup table described by the given configuration and writes
/// it to each output whose path is set.
///
/// # Errors
/// Returns an error if the configuration is invalid, if integrating a texel
/// failed or if an output file could not be written.
pub fn generate_lookup_table_files(config: &LookupTableConfig) -> Result<ReflectanceLookupTable> {
    config.validate()?;

    let mut builder = LookupTableBuilder::from_config(config);
    let table = builder.build(config.width, config.height)?;

    let output = &config.output;

    if let Some(dds_file_path) = &output.dds_file_path {
        with_debug_logging!("Writing DDS texture to {}", dds_file_path.display(); {
            io::dds::save_lookup_table_as_dds(&table, dds_file_path)
        })?;
        log::info!("Wrote lookup table texture to {}", dds_file_path.display());
    }

    if let Some(source_file_path) = &output.source_file_path {
        with_debug_logging!("Writing header to {}", source_file_path.display(); {
            io::source::save_lookup_table_as_source(
                &table,
                &output.identifier_prefix,
                source_file_path,
            )
        })?;
        log::info!("Wrote lookup table header to {}", source_file_path.display());
    }

    Ok(table)
}
