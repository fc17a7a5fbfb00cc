//! Trowbridge-Reitz (GGX) microfacet sampling and weighting.
//!
//! All directions are expressed in the local shading frame, where the
//! macroscopic surface normal is the positive z-axis.

#![allow(non_snake_case)]

use nalgebra::{UnitVector3, Vector2, Vector3};
use std::f32::consts::TAU;

/// Smallest roughness used in sampling and weighting. Smaller roughness
/// values are clamped to this.
pub const ALPHA_MIN: f32 = 1e-3;

/// Smallest cosine of the angle between the view direction and the surface
/// normal. Smaller cosines are clamped to this.
pub const NDOTV_MIN: f32 = 1e-4;

/// Smallest length accepted when normalizing a vector, and smallest squared
/// length of the unnormalized half vector `l + v` before taking its inverse
/// square root.
pub const LENGTH_MIN: f32 = 1e-5;

/// Samples a microfacet normal from the distribution of normals that are
/// visible from the view direction `v` (VNDF) for the isotropic
/// Trowbridge-Reitz distribution with roughness `alpha`, using the two
/// uniformly distributed numbers in `xi`.
///
/// Uses the spherical cap construction of Dupuy and Benyoub (2023): the view
/// direction is stretched into the configuration of a hemisphere with unit
/// roughness, a direction is drawn uniformly on the spherical cap visible
/// from it, and the resulting normal is stretched back.
pub fn sample_visible_half_vector(
    xi: &Vector2<f32>,
    alpha: f32,
    v: &Vector3<f32>,
) -> UnitVector3<f32> {
    let alpha = alpha.max(ALPHA_MIN);

    let v_hemisphere = UnitVector3::try_new(
        Vector3::new(alpha * v.x, alpha * v.y, v.z),
        LENGTH_MIN,
    )
    .unwrap_or_else(Vector3::z_axis);

    let phi = TAU * xi.x;
    let z = (1.0 - xi.y) * (1.0 + v_hemisphere.z) - v_hemisphere.z;
    let sin_theta = f32::sqrt((1.0 - z * z).clamp(0.0, 1.0));
    let (sin_phi, cos_phi) = phi.sin_cos();
    let cap_direction = Vector3::new(sin_theta * cos_phi, sin_theta * sin_phi, z);

    let h_hemisphere = cap_direction + v_hemisphere.into_inner();

    UnitVector3::try_new(
        Vector3::new(
            alpha * h_hemisphere.x,
            alpha * h_hemisphere.y,
            h_hemisphere.z.max(0.0),
        ),
        LENGTH_MIN,
    )
    .unwrap_or_else(Vector3::z_axis)
}

/// Reflects the view direction `v` about the microfacet normal `h` and returns
/// the normalized light direction.
pub fn reflect_about_half_vector(v: &Vector3<f32>, h: &UnitVector3<f32>) -> UnitVector3<f32> {
    let incident = -v;
    let reflected = incident - h.as_ref() * (2.0 * incident.dot(h.as_ref()));
    UnitVector3::try_new(reflected, LENGTH_MIN).unwrap_or_else(Vector3::z_axis)
}

/// Computes the weight of a light direction drawn by reflecting the view
/// direction about a normal from [`sample_visible_half_vector`], excluding
/// the Fresnel reflectance. This is the cosine-weighted specular BRDF
/// `D * G2 / (4 * n_dot_v)` divided by the sampling density. With the
/// separable Smith masking-shadowing function `G2 = G1(v) * G1(l)`, the
/// weight reduces to `G1(l)`, which only depends on the roughness and
/// `n_dot_l`.
///
/// The result lies in `[0, 1]` and vanishes for light directions below the
/// horizon.
pub fn throughput_without_fresnel(alpha: f32, n_dot_l: f32) -> f32 {
    let alpha = alpha.max(ALPHA_MIN);
    let n_dot_l = n_dot_l.max(0.0);
    evaluate_smith_G1(alpha, n_dot_l)
}

/// Evaluates the Smith masking function `G1` for the Trowbridge-Reitz
/// distribution and a direction with cosine `n_dot_w` to the normal.
pub fn evaluate_smith_G1(alpha: f32, n_dot_w: f32) -> f32 {
    let alpha_squared = alpha * alpha;
    let n_dot_w_squared = n_dot_w * n_dot_w;
    let denominator =
        n_dot_w + f32::sqrt(alpha_squared + (1.0 - alpha_squared) * n_dot_w_squared);
    if denominator > 0.0 {
        (2.0 * n_dot_w / denominator).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Computes `v_dot_h` for the half vector between the view and light
/// directions from `v_dot_l` alone, without forming the half vector. Uses
/// `|l + v| = sqrt(2 + 2 * v_dot_l)`, floored by [`LENGTH_MIN`] so that
/// nearly opposite directions stay finite. The result is clamped to `[0, 1]`.
pub fn compute_v_dot_h(v_dot_l: f32) -> f32 {
    let inverse_half_vector_length = 1.0 / f32::sqrt(f32::max(LENGTH_MIN, 2.0 + 2.0 * v_dot_l));
    (inverse_half_vector_length * v_dot_l + inverse_half_vector_length).clamp(0.0, 1.0)
}

/// Computes the weights of `F0` and `F90` in the Schlick approximation of the
/// Fresnel reflectance, `F = F0 * (1 - (1 - v_dot_h)^5) + F90 * (1 -
/// v_dot_h)^5`. Both weights lie in `[0, 1]` and sum to one.
pub fn schlick_fresnel_factors(v_dot_h: f32) -> (f32, f32) {
    let x = (1.0 - v_dot_h).clamp(0.0, 1.0);
    let x2 = x * x;
    let x5 = x * x2 * x2;
    (1.0 - x5, x5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn view_direction(cos_theta: f32, phi: f32) -> Vector3<f32> {
        let sin_theta = f32::sqrt(1.0 - cos_theta * cos_theta);
        Vector3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
    }

    #[test]
    fn smooth_surface_samples_macroscopic_normal() {
        let v = view_direction(0.5, 0.3);
        let h = sample_visible_half_vector(&Vector2::new(0.37, 0.81), ALPHA_MIN, &v);
        assert_abs_diff_eq!(h.z, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn reflecting_about_normal_mirrors_view_direction() {
        let v = view_direction(0.6, 1.2);
        let l = reflect_about_half_vector(&v, &Vector3::z_axis());
        assert_abs_diff_eq!(l.x, -v.x, epsilon = 1e-6);
        assert_abs_diff_eq!(l.y, -v.y, epsilon = 1e-6);
        assert_abs_diff_eq!(l.z, v.z, epsilon = 1e-6);
    }

    #[test]
    fn v_dot_h_matches_explicit_half_vector() {
        let v = view_direction(0.8, 0.0);
        let l = view_direction(0.3, 2.0);
        let h = (v + l).normalize();
        assert_abs_diff_eq!(compute_v_dot_h(v.dot(&l)), v.dot(&h), epsilon = 1e-5);
    }

    #[test]
    fn v_dot_h_is_finite_for_opposite_directions() {
        let v_dot_h = compute_v_dot_h(-1.0);
        assert!(v_dot_h.is_finite());
        assert_eq!(v_dot_h, 0.0);
    }

    #[test]
    fn fresnel_factors_at_limits_are_correct() {
        assert_eq!(schlick_fresnel_factors(1.0), (1.0, 0.0));
        assert_eq!(schlick_fresnel_factors(0.0), (0.0, 1.0));
        assert_eq!(schlick_fresnel_factors(-0.5), (0.0, 1.0));
    }

    #[test]
    fn smith_G1_at_normal_incidence_is_one() {
        assert_abs_diff_eq!(evaluate_smith_G1(0.7, 1.0), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn throughput_below_horizon_vanishes() {
        assert_eq!(throughput_without_fresnel(0.5, -0.2), 0.0);
        assert_eq!(throughput_without_fresnel(0.5, 0.0), 0.0);
    }

    proptest! {
        #[test]
        fn sampled_half_vectors_are_unit_and_in_upper_hemisphere(
            xi_x in 0.0_f32..1.0,
            xi_y in 0.0_f32..1.0,
            alpha in 0.0_f32..1.0,
            cos_theta in NDOTV_MIN..1.0,
            phi in 0.0_f32..TAU,
        ) {
            let v = view_direction(cos_theta, phi);
            let h = sample_visible_half_vector(&Vector2::new(xi_x, xi_y), alpha, &v);
            prop_assert!((h.norm() - 1.0).abs() < 1e-5);
            prop_assert!(h.z >= 0.0);
        }

        #[test]
        fn throughput_lies_in_unit_interval(
            alpha in 0.0_f32..1.0,
            n_dot_l in -1.0_f32..1.0,
        ) {
            let throughput = throughput_without_fresnel(alpha, n_dot_l);
            prop_assert!((0.0..=1.0).contains(&throughput));
        }

        #[test]
        fn fresnel_factors_sum_to_one(v_dot_h in 0.0_f32..1.0) {
            let (f0_factor, f90_factor) = schlick_fresnel_factors(v_dot_h);
            prop_assert!((0.0..=1.0).contains(&f0_factor));
            prop_assert!((0.0..=1.0).contains(&f90_factor));
            prop_assert!((f0_factor + f90_factor - 1.0).abs() < 1e-6);
        }
    }
}
