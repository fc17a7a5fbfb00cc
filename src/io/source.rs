//! Writing lookup tables as C++ source code.

use crate::{io, table::ReflectanceLookupTable};
use anyhow::{Context, Result, bail};
use std::{fmt::Write, path::Path};

/// Checks that the given prefix can start a C++ identifier and only contains
/// ASCII letters, digits and underscores.
///
/// # Errors
/// Returns an error describing the problem with the prefix.
pub fn validate_identifier_prefix(prefix: &str) -> Result<()> {
    let mut chars = prefix.chars();
    match chars.next() {
        None => bail!("Identifier prefix is empty"),
        Some(first) if !(first.is_ascii_alphabetic() || first == '_') => {
            bail!("Identifier prefix `{prefix}` must start with a letter or underscore")
        }
        Some(_) => {}
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("Identifier prefix `{prefix}` contains characters not allowed in identifiers");
    }
    Ok(())
}

/// Generates a C++ header declaring the dimensions of the lookup table and
/// its texels as half-precision bit patterns. For the prefix `brx_hdr_lut`,
/// the header declares `g_brx_hdr_lut_width`, `g_brx_hdr_lut_height` and
/// `g_brx_hdr_lut_norms`, the latter holding the `f0_norm` and `f90_norm` of each
/// texel in row-major order.
pub fn generate_lookup_table_header(table: &ReflectanceLookupTable, identifier_prefix: &str) -> String {
    let guard = format!("{}_H", identifier_prefix.to_ascii_uppercase());
    let width_name = format!("g_{identifier_prefix}_width");
    let height_name = format!("g_{identifier_prefix}_height");
    let norms_name = format!("g_{identifier_prefix}_norms");

    // Each texel line holds 22 characters
    let mut source = String::with_capacity(512 + 24 * table.norms().len());

    // Writing into a `String` can not fail
    let _ = write!(
        source,
        "// Generated by generate_reflectance_lut. Do not edit.\n\
         \n\
         #ifndef {guard}\n\
         #define {guard} 1\n\
         \n\
         #include <cstdint>\n\
         \n\
         // clang-format off\n\
         \n\
         static constexpr uint32_t const {width_name} = {width}U;\n\
         static constexpr uint32_t const {height_name} = {height}U;\n\
         static constexpr uint16_t const {norms_name}[2U * {width_name} * {height_name}] = {{\n",
        width = table.width(),
        height = table.height(),
    );

    let halves: Vec<u16> = io::norms_to_half_floats(table.norms())
        .map(|value| value.to_bits())
        .collect();

    let n_texels = halves.len() / 2;
    for (texel_idx, pair) in halves.chunks_exact(2).enumerate() {
        let separator = if texel_idx + 1 == n_texels { "" } else { "," };
        let _ = writeln!(source, "    0X{:04X}U, 0X{:04X}U{}", pair[0], pair[1], separator);
    }

    source.push_str("};\n\n// clang-format on\n\n#endif\n");

    source
}

/// Writes the lookup table as a C++ header at the given path, creating any
/// missing directories.
///
/// # Errors
/// Returns an error if the identifier prefix is invalid or the file can not
/// be written.
pub fn save_lookup_table_as_source(
    table: &ReflectanceLookupTable,
    identifier_prefix: &str,
    output_file_path: impl AsRef<Path>,
) -> Result<()> {
    validate_identifier_prefix(identifier_prefix)?;
    let output_file_path = output_file_path.as_ref();
    let source = generate_lookup_table_header(table, identifier_prefix);
    io::write_text_file(&source, output_file_path)
        .with_context(|| format!("Failed to write header to {}", output_file_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::ReflectanceNorm;

    fn test_table() -> ReflectanceLookupTable {
        ReflectanceLookupTable::new(
            2,
            2,
            vec![
                ReflectanceNorm {
                    f0_norm: 1.0,
                    f90_norm: 0.0,
                },
                ReflectanceNorm {
                    f0_norm: 0.5,
                    f90_norm: 0.25,
                },
                ReflectanceNorm {
                    f0_norm: 0.0,
                    f90_norm: 1.0,
                },
                ReflectanceNorm {
                    f0_norm: 0.75,
                    f90_norm: 0.125,
                },
            ],
        )
    }

    #[test]
    fn header_declares_dimensions_and_texels() {
        let source = generate_lookup_table_header(&test_table(), "hdr_lut");
        assert!(source.contains("#ifndef HDR_LUT_H\n#define HDR_LUT_H 1\n"));
        assert!(source.contains("static constexpr uint32_t const g_hdr_lut_width = 2U;\n"));
        assert!(source.contains("static constexpr uint32_t const g_hdr_lut_height = 2U;\n"));
        assert!(source.contains(
            "static constexpr uint16_t const g_hdr_lut_norms[2U * g_hdr_lut_width * g_hdr_lut_height] = {\n"
        ));
        assert!(source.ends_with("};\n\n// clang-format on\n\n#endif\n"));
    }

    #[test]
    fn texels_are_written_one_per_line_without_trailing_comma() {
        let source = generate_lookup_table_header(&test_table(), "hdr_lut");
        let texel_lines: Vec<&str> = source
            .lines()
            .filter(|line| line.starts_with("    0X"))
            .collect();
        assert_eq!(
            texel_lines,
            vec![
                "    0X3C00U, 0X0000U,",
                "    0X3800U, 0X3400U,",
                "    0X0000U, 0X3C00U,",
                "    0X3A00U, 0X3000U",
            ]
        );
    }

    #[test]
    fn default_prefix_gives_established_identifiers() {
        let prefix = crate::config::OutputConfig::default().identifier_prefix;
        let source = generate_lookup_table_header(&test_table(), &prefix);
        assert!(source.contains("#ifndef BRX_HDR_LUT_H\n"));
        assert!(source.contains("static constexpr uint32_t const g_brx_hdr_lut_width = 2U;\n"));
        assert!(source.contains("static constexpr uint32_t const g_brx_hdr_lut_height = 2U;\n"));
        assert!(source.contains("g_brx_hdr_lut_norms[2U * g_brx_hdr_lut_width * g_brx_hdr_lut_height]"));
    }

    #[test]
    fn valid_identifier_prefixes_are_accepted() {
        for prefix in ["hdr_lut", "_x", "Lut2"] {
            assert!(validate_identifier_prefix(prefix).is_ok());
        }
    }

    #[test]
    fn invalid_identifier_prefixes_are_rejected() {
        for prefix in ["", "9lut", "hdr-lut", "hdr lut"] {
            assert!(validate_identifier_prefix(prefix).is_err());
        }
    }
}
