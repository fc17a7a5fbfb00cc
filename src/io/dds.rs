//! Writing lookup tables as DirectDraw Surface (DDS) textures.

use crate::{io, table::ReflectanceLookupTable};
use anyhow::{Context, Result};
use std::{mem, path::Path};

/// The four bytes `"DDS "` starting every DDS file.
pub const DDS_MAGIC: u32 = 0x2053_4444;

const DDS_HEADER_SIZE: u32 = 124;
const DDS_PIXEL_FORMAT_SIZE: u32 = 32;

const DDSD_CAPS: u32 = 0x1;
const DDSD_HEIGHT: u32 = 0x2;
const DDSD_WIDTH: u32 = 0x4;
const DDSD_PIXELFORMAT: u32 = 0x1000;

const DDPF_FOURCC: u32 = 0x4;

/// Direct3D 9 format code of a two-channel texture of 16-bit floats.
pub const D3DFMT_G16R16F: u32 = 112;

const DDSCAPS_TEXTURE: u32 = 0x1000;

/// Number of 32-bit words in the magic number and header.
const HEADER_WORD_COUNT: usize = 32;

/// Size in bytes of the magic number and header preceding the texel data.
pub const DDS_PREAMBLE_SIZE: usize = HEADER_WORD_COUNT * mem::size_of::<u32>();

/// Creates the magic number and `DDS_HEADER` for a single two-dimensional
/// G16R16F texture without mipmaps.
pub fn create_g16r16f_header(width: u32, height: u32) -> [u32; HEADER_WORD_COUNT] {
    let mut words = [0; HEADER_WORD_COUNT];

    words[0] = DDS_MAGIC;
    words[1] = DDS_HEADER_SIZE;
    words[2] = DDSD_CAPS | DDSD_HEIGHT | DDSD_WIDTH | DDSD_PIXELFORMAT;
    words[3] = height;
    words[4] = width;
    // Pitch, depth, mipmap count and the 11 reserved words stay zero

    // DDS_PIXELFORMAT
    words[19] = DDS_PIXEL_FORMAT_SIZE;
    words[20] = DDPF_FOURCC;
    words[21] = D3DFMT_G16R16F;
    // Bit count and channel masks are unused with a FourCC

    words[27] = DDSCAPS_TEXTURE;

    words
}

/// Encodes the lookup table as a little-endian DDS file with the `f0_norm`
/// and `f90_norm` of each texel as the red and green half-precision
/// channels.
pub fn encode_lookup_table(table: &ReflectanceLookupTable) -> Vec<u8> {
    let texel_data_size = table.norms().len() * 2 * mem::size_of::<u16>();
    let mut bytes = Vec::with_capacity(DDS_PREAMBLE_SIZE + texel_data_size);

    for word in create_g16r16f_header(table.width(), table.height()) {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    for value in io::norms_to_half_floats(table.norms()) {
        bytes.extend_from_slice(&value.to_le_bytes());
    }

    bytes
}

/// Writes the lookup table as a DDS texture at the given path, creating any
/// missing directories.
///
/// # Errors
/// Returns an error if the file can not be written.
pub fn save_lookup_table_as_dds(
    table: &ReflectanceLookupTable,
    output_file_path: impl AsRef<Path>,
) -> Result<()> {
    let output_file_path = output_file_path.as_ref();
    let bytes = encode_lookup_table(table);
    io::save_data_as_binary(output_file_path, &bytes)
        .with_context(|| format!("Failed to write DDS texture to {}", output_file_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::ReflectanceNorm;

    fn read_word(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn test_table() -> ReflectanceLookupTable {
        ReflectanceLookupTable::new(
            3,
            2,
            (0..6)
                .map(|idx| ReflectanceNorm {
                    f0_norm: 1.0,
                    f90_norm: if idx == 5 { 0.5 } else { 0.0 },
                })
                .collect(),
        )
    }

    #[test]
    fn header_fields_are_at_standard_offsets() {
        let bytes = encode_lookup_table(&test_table());
        assert_eq!(&bytes[0..4], b"DDS ");
        assert_eq!(read_word(&bytes, 4), 124);
        assert_eq!(read_word(&bytes, 8), 0x1007);
        assert_eq!(read_word(&bytes, 12), 2);
        assert_eq!(read_word(&bytes, 16), 3);
        assert_eq!(read_word(&bytes, 28), 0);
        assert_eq!(read_word(&bytes, 76), 32);
        assert_eq!(read_word(&bytes, 80), DDPF_FOURCC);
        assert_eq!(read_word(&bytes, 84), 112);
        assert_eq!(read_word(&bytes, 108), 0x1000);
        assert_eq!(read_word(&bytes, 124), 0);
    }

    #[test]
    fn texel_data_follows_header_as_half_floats() {
        let bytes = encode_lookup_table(&test_table());
        assert_eq!(bytes.len(), DDS_PREAMBLE_SIZE + 6 * 4);
        assert_eq!(&bytes[128..132], &[0x00, 0x3C, 0x00, 0x00]);
        assert_eq!(&bytes[148..152], &[0x00, 0x3C, 0x00, 0x38]);
    }
}
