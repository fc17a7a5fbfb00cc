//! Low-discrepancy sample sequences.

use nalgebra::Vector2;

/// Scale mapping a 24-bit integer onto `[0, 1)`.
const INVERSE_TWO_POW_24: f32 = 1.0 / 16_777_216.0;

/// Returns point `index` of the two-dimensional Hammersley point set with
/// `sequence_length` points. The first coordinate is `index /
/// sequence_length`, the second is the base-2 radical inverse of `index`.
/// Both coordinates lie in `[0, 1)`.
///
/// The point only depends on `index` and `sequence_length`, and is computed
/// with exact integer operations and correctly rounded divisions, so it is
/// identical on every run and platform.
///
/// # Panics
/// If `index` is not smaller than `sequence_length`.
pub fn hammersley_2d(index: u32, sequence_length: u32) -> Vector2<f32> {
    assert!(
        index < sequence_length,
        "Sample index {index} outside sequence of length {sequence_length}"
    );
    // Computed in double precision so that the quotient rounds to a value
    // below one even for long sequences
    let x = (f64::from(index) / f64::from(sequence_length)) as f32;
    Vector2::new(x.min(1.0 - f32::EPSILON / 2.0), radical_inverse_base_2(index))
}

/// Computes the van der Corput radical inverse of `index` in base 2 by
/// mirroring its bits around the binary point. Only the 24 most significant
/// mirrored bits are kept, which makes the result exactly representable as
/// an `f32` strictly smaller than one.
pub fn radical_inverse_base_2(index: u32) -> f32 {
    (index.reverse_bits() >> 8) as f32 * INVERSE_TWO_POW_24
}
