//! Utilities for input/output.

pub mod dds;
pub mod source;

use crate::integration::ReflectanceNorm;
use anyhow::{Context, Result};
use half::f16;
use std::{
    fs::{self, File},
    io::{self, Write},
    path::Path,
};

/// Writes the given string to the file at the given path, replacing any
/// existing file and creating missing parent directories.
pub fn write_text_file(text: &str, output_file_path: impl AsRef<Path>) -> io::Result<()> {
    save_data_as_binary(output_file_path, text.as_bytes())
}

/// Writes the given bytes to the file at the given path, replacing any
/// existing file and creating missing parent directories.
pub fn save_data_as_binary(
    output_file_path: impl AsRef<Path>,
    byte_buffer: &[u8],
) -> io::Result<()> {
    let mut file = create_file_with_parent_directories(output_file_path.as_ref())?;
    file.write_all(byte_buffer)
}

/// Reads the RON file at the given path and deserializes it into a `T`.
pub fn parse_ron_file<T>(file_path: impl AsRef<Path>) -> Result<T>
where
    T: for<'de> serde::de::Deserialize<'de>,
{
    let file_path = file_path.as_ref();

    let text = fs::read_to_string(file_path)
        .with_context(|| format!("Could not open {}", file_path.display()))?;

    ron::from_str::<T>(&text).with_context(|| format!("Invalid syntax in {}", file_path.display()))
}

// The path always names a file, whether or not it has an extension
fn create_file_with_parent_directories(file_path: &Path) -> io::Result<File> {
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    File::create(file_path)
}

/// Converts the given texels to half precision, yielding the `f0_norm` and
/// `f90_norm` of each texel in turn.
pub fn norms_to_half_floats(norms: &[ReflectanceNorm]) -> impl Iterator<Item = f16> + '_ {
    bytemuck::cast_slice::<ReflectanceNorm, f32>(norms)
        .iter()
        .map(|&value| f16::from_f32(value))
}
