//! Deterministic quadrature of the reflectance integral, used to check
//! Monte Carlo lookup tables.

#![allow(non_snake_case)]

use crate::{
    integration::ReflectanceNorm,
    table::{self, ReflectanceLookupTable},
};
use std::{f64::consts::PI, num::NonZeroU32};

/// Texels whose view direction has a smaller cosine than this are not
/// validated, since the quadrature does not resolve the lobe there.
pub const VALIDATION_NDOTV_MIN: f32 = 0.1;

/// Largest deviations between the texels of a lookup table and the
/// corresponding quadrature results.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ValidationReport {
    pub n_validated_texels: usize,
    pub max_f0_deviation: f32,
    pub max_f90_deviation: f32,
    /// Coordinates of the texel with the largest total deviation.
    pub worst_texel: Option<(u32, u32)>,
}

impl ValidationReport {
    /// The largest deviation of either value.
    pub fn max_deviation(&self) -> f32 {
        f32::max(self.max_f0_deviation, self.max_f90_deviation)
    }
}

/// Compares every `stride`th texel in each direction of the given table with
/// the quadrature result for its roughness and view direction. Texels with
/// roughness below `min_alpha` or a view cosine below
/// [`VALIDATION_NDOTV_MIN`] are skipped.
pub fn validate_lookup_table(
    table: &ReflectanceLookupTable,
    min_alpha: f32,
    stride: NonZeroU32,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut worst_total_deviation = -1.0;

    for y in (0..table.height()).step_by(stride.get() as usize) {
        for x in (0..table.width()).step_by(stride.get() as usize) {
            let parameters =
                table::texel_integration_parameters(x, y, table.width(), table.height());
            let n_dot_v = parameters.view_direction().z;

            if parameters.alpha() < min_alpha || n_dot_v < VALIDATION_NDOTV_MIN {
                continue;
            }

            let reference = compute_reference_norm(parameters.alpha(), n_dot_v);
            let norm = table.norm(x, y);

            let f0_deviation = (norm.f0_norm - reference.f0_norm).abs();
            let f90_deviation = (norm.f90_norm - reference.f90_norm).abs();

            report.n_validated_texels += 1;
            report.max_f0_deviation = report.max_f0_deviation.max(f0_deviation);
            report.max_f90_deviation = report.max_f90_deviation.max(f90_deviation);

            if f0_deviation + f90_deviation > worst_total_deviation {
                worst_total_deviation = f0_deviation + f90_deviation;
                report.worst_texel = Some((x, y));
            }
        }
    }

    report
}

/// Computes the [`ReflectanceNorm`] for the given roughness and view cosine
/// by quadrature over the hemisphere of light directions, using the
/// Trowbridge-Reitz distribution and the separable Smith masking-shadowing
/// function.
pub fn compute_reference_norm(alpha: f32, n_dot_v: f32) -> ReflectanceNorm {
    let alpha = f64::from(alpha);
    let n_dot_v = f64::from(n_dot_v);

    let compute_fresnel_weighted_reflectance = |fresnel_weight: fn(f64) -> f64| -> f64 {
        compute_reflectance_integral(
            |v_dot_n, l_dot_n, l_dot_v| {
                let (n_dot_h, v_dot_h) = compute_half_vector_dot_products(v_dot_n, l_dot_n, l_dot_v);
                evaluate_specular_brdf_without_fresnel(alpha, v_dot_n, l_dot_n, n_dot_h)
                    * fresnel_weight(v_dot_h)
            },
            n_dot_v,
        )
    };

    ReflectanceNorm {
        f0_norm: compute_fresnel_weighted_reflectance(schlick_f0_weight) as f32,
        f90_norm: compute_fresnel_weighted_reflectance(schlick_f90_weight) as f32,
    }
}

fn schlick_f0_weight(v_dot_h: f64) -> f64 {
    1.0 - schlick_f90_weight(v_dot_h)
}

fn schlick_f90_weight(v_dot_h: f64) -> f64 {
    (1.0 - v_dot_h).clamp(0.0, 1.0).powi(5)
}

/// Integrates the radiance reflected toward the view direction `v` from all
/// light directions `l` in the full hemisphere around the normal vector `n`.
/// The given radiance function should take the dot products `v_dot_n`,
/// `l_dot_n` and `l_dot_v` as its only arguments. The radiance function is
/// assumed isotropic.
pub fn compute_reflectance_integral(
    evaluate_radiance: impl Fn(f64, f64, f64) -> f64,
    v_dot_n: f64,
) -> f64 {
    let evaluate_integrand_for_l_dot_n = |l_dot_n: f64| -> f64 {
        let l_dot_v_offset = v_dot_n * l_dot_n;
        let l_dot_v_scale = f64::sqrt((1.0 - v_dot_n.powi(2)) * (1.0 - l_dot_n.powi(2)));

        let evaluate_integrand_for_phi = |phi: f64| -> f64 {
            let l_dot_v = l_dot_v_offset + f64::cos(phi) * l_dot_v_scale;
            evaluate_radiance(v_dot_n, l_dot_n, l_dot_v)
        };

        l_dot_n * integrate_hundred_point_gauss_legendre(evaluate_integrand_for_phi, 0.0, PI)
    };

    // Multiply with 2 since we only integrated over half the hemisphere (0 <=
    // phi <= pi)
    2.0 * integrate_hundred_point_gauss_legendre(evaluate_integrand_for_l_dot_n, 0.0, 1.0)
}

/// Evaluates `D * G1(v) * G1(l) / (4 * v_dot_n * l_dot_n)`.
fn evaluate_specular_brdf_without_fresnel(
    alpha: f64,
    v_dot_n: f64,
    l_dot_n: f64,
    n_dot_h: f64,
) -> f64 {
    let D = evaluate_ggx_distribution(n_dot_h, alpha);
    let G = evaluate_smith_G1(alpha, v_dot_n) * evaluate_smith_G1(alpha, l_dot_n);
    D * G / (4.0 * v_dot_n * l_dot_n)
}

/// Uses the definition of the half vector, `h = (l + v) / |l + v|`, to
/// compute `n_dot_h` and `v_dot_h` from the dot products of the light
/// direction `l`, view direction `v` and normal vector `n`.
fn compute_half_vector_dot_products(v_dot_n: f64, l_dot_n: f64, l_dot_v: f64) -> (f64, f64) {
    let one_plus_l_dot_v = 1.0 + l_dot_v;
    let inverse_l_plus_v_len = 1.0 / f64::sqrt(f64::max(1e-12, 2.0 * one_plus_l_dot_v));

    let v_dot_h = one_plus_l_dot_v * inverse_l_plus_v_len;
    let n_dot_h = (l_dot_n + v_dot_n) * inverse_l_plus_v_len;

    (n_dot_h, v_dot_h)
}

fn evaluate_smith_G1(alpha: f64, n_dot_w: f64) -> f64 {
    let alpha_squared = alpha * alpha;
    2.0 * n_dot_w / (n_dot_w + f64::sqrt(alpha_squared + (1.0 - alpha_squared) * n_dot_w.powi(2)))
}

/// Evaluates the Trowbridge-Reitz (GGX) distribution of microfacet normals.
fn evaluate_ggx_distribution(n_dot_h: f64, alpha: f64) -> f64 {
    if n_dot_h > 0.0 {
        let alpha_squared = alpha.powi(2);
        alpha_squared / (PI * (1.0 + n_dot_h.powi(2) * (alpha_squared - 1.0)).powi(2))
    } else {
        0.0
    }
}

/// Estimates the integral of the given function over the given interval using a
/// hundred-point Gauss-Legendre quadrature.
fn integrate_hundred_point_gauss_legendre(
    evaluate_integrand: impl Fn(f64) -> f64,
    start: f64,
    end: f64,
) -> f64 {
    #[rustfmt::skip]
    #[allow(clippy::excessive_precision)]
    const COORDS: [f64; 100] = [
        -0.9997137268, -0.9984919506, -0.996295135, -0.993124937, -0.988984395,
        -0.983877541, -0.977809358, -0.970785776, -0.962813654, -0.953900783,
        -0.9440558701, -0.933288535, -0.921609298, -0.909029571, -0.895561645,
        -0.8812186794, -0.8660146885, -0.8499645279, -0.83308388, -0.8153892383,
        -0.796897892, -0.7776279097, -0.757598119, -0.7368280898, -0.7153381176,
        -0.6931491994, -0.6702830156, -0.6467619085, -0.6226088602, -0.5978474703,
        -0.572501933, -0.5465970121, -0.5201580199, -0.4932107892, -0.46578165,
        -0.4378974022, -0.4095852917, -0.3808729816, -0.351788526, -0.3223603439,
        -0.292617188, -0.2625881204, -0.2323024818, -0.2017898641, -0.171080081,
        -0.140203137, -0.109189204, -0.0780685828, -0.046871682, -0.015628984,
        0.0156289844, 0.0468716824, 0.0780685828, 0.1091892036, 0.1402031372,
        0.1710800805, 0.2017898641, 0.2323024818, 0.2625881204, 0.292617188,
        0.322360344, 0.351788526, 0.380872982, 0.4095852917, 0.437897402,
        0.46578165, 0.493210789, 0.5201580199, 0.5465970121, 0.5725019326,
        0.5978474703, 0.62260886, 0.646761909, 0.670283016, 0.693149199,
        0.7153381176, 0.7368280898, 0.7575981185, 0.7776279097, 0.7968978924,
        0.8153892383, 0.8330838799, 0.8499645279, 0.8660146885, 0.8812186794,
        0.895561645, 0.909029571, 0.921609298, 0.933288535, 0.94405587,
        0.9539007829, 0.962813654, 0.9707857758, 0.977809358, 0.9838775407,
        0.9889843952, 0.993124937, 0.996295135, 0.9984919506, 0.999713727,
    ];

    #[rustfmt::skip]
    #[allow(clippy::excessive_precision)]
    const WEIGHTS: [f64; 100] = [
        7.346345E-4, 0.0017093927, 0.002683925372, 0.0036559612, 0.0046244501,
        0.005588428, 0.0065469485, 0.00749907326, 0.008443871, 0.0093804197,
        0.0103078026, 0.011225114, 0.0121314577, 0.013025948, 0.0139077107,
        0.014775885, 0.0156296211, 0.0164680862, 0.0172904606, 0.018095941,
        0.01888374, 0.0196530875, 0.02040323265, 0.0211334421, 0.0218430024,
        0.0225312203, 0.023197423, 0.02384096, 0.024461203, 0.025057544,
        0.025629403, 0.0261762192, 0.0266974592, 0.02719261345, 0.0276611982,
        0.028102756, 0.0285168543, 0.02890309, 0.02926108411, 0.0295904881,
        0.02989098, 0.0301622651, 0.0304040795, 0.030616187, 0.030798379,
        0.0309504789, 0.0310723374, 0.031163836, 0.0312248843, 0.0312554235,
        0.031255423, 0.03122488425, 0.031163836, 0.0310723374, 0.0309504789,
        0.030798379, 0.0306161866, 0.0304040795, 0.030162265, 0.0298909796,
        0.0295904881, 0.029261084, 0.02890309, 0.028516854, 0.0281027557,
        0.0276611982, 0.027192613, 0.026697459, 0.0261762192, 0.0256294029,
        0.0250575445, 0.0244612027, 0.0238409603, 0.023197423, 0.0225312203,
        0.0218430024, 0.0211334421, 0.020403233, 0.0196530875, 0.01888374,
        0.0180959407, 0.017290461, 0.0164680862, 0.0156296211, 0.0147758845,
        0.0139077107, 0.0130259479, 0.012131458, 0.011225114, 0.01030780258,
        0.00938042, 0.0084438715, 0.0074990733, 0.0065469485, 0.005588428,
        0.00462445006, 0.0036559612, 0.0026839254, 0.00170939265, 7.346345E-4,
    ];

    assert!(
        end >= start,
        "Interval end {end} is smaller than interval start {start}"
    );
    let interval_scale = 0.5 * (end - start);
    let interval_offset = 0.5 * (end + start);

    let integral: f64 = COORDS
        .iter()
        .zip(WEIGHTS)
        .map(|(&coord, weight)| weight * evaluate_integrand(interval_offset + interval_scale * coord))
        .sum();

    integral * interval_scale
}
