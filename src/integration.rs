//! Monte Carlo integration of the hemispherical-directional reflectance.

use crate::{
    config::IntegrationConfig,
    microfacet::{self, ALPHA_MIN, NDOTV_MIN},
    sequence,
    thread::{self, RangeTask, RangeTaskChunk, ThreadPool},
};
use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use nalgebra::Vector3;
use std::ops::{Add, Range};

/// The zeroth spherical moments of the `F0` and `F90` weights in the Schlick
/// Fresnel approximation, for one combination of roughness and view
/// direction. The hemispherical-directional reflectance for given `F0` and
/// `F90` is `F0 * f0_norm + F90 * f90_norm`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Zeroable, Pod)]
pub struct ReflectanceNorm {
    pub f0_norm: f32,
    pub f90_norm: f32,
}

/// Running sums of the `F0` and `F90` weighted sample throughputs. Sums over
/// disjoint sample ranges are combined by addition. Accumulation is done in
/// double precision to keep the error of long sums small.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FresnelMoments {
    pub f0: f64,
    pub f90: f64,
}

/// The roughness and view direction that a [`ReflectanceNorm`] is computed
/// for. The roughness and the view direction's cosine to the normal are
/// clamped to [`ALPHA_MIN`] and [`NDOTV_MIN`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntegrationParameters {
    alpha: f32,
    view_direction: Vector3<f32>,
}

/// Computes [`ReflectanceNorm`]s by integrating over a fixed Hammersley
/// point set.
#[derive(Clone, Copy, Debug)]
pub struct SampleEvaluator {
    config: IntegrationConfig,
}

/// A [`RangeTask`] integrating a range of samples for given
/// [`IntegrationParameters`].
#[derive(Clone, Copy, Debug)]
pub struct SampleIntegrationTask {
    parameters: IntegrationParameters,
    sample_count: u32,
}

/// A [`ThreadPool`] that can integrate chunks of samples in parallel.
pub type SampleIntegrationPool = ThreadPool<RangeTaskChunk<SampleIntegrationTask>>;

impl FresnelMoments {
    /// Combines the sums of two disjoint sample ranges.
    pub fn combine(self, other: Self) -> Self {
        Self {
            f0: self.f0 + other.f0,
            f90: self.f90 + other.f90,
        }
    }

    /// Converts the sums to single precision.
    pub fn to_norm(self) -> ReflectanceNorm {
        ReflectanceNorm {
            f0_norm: self.f0 as f32,
            f90_norm: self.f90 as f32,
        }
    }
}

impl Add for FresnelMoments {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.combine(rhs)
    }
}

impl IntegrationParameters {
    /// Creates integration parameters for the given roughness and unit view
    /// direction, clamping the roughness to at least [`ALPHA_MIN`] and the
    /// z-component of the view direction to at least [`NDOTV_MIN`].
    pub fn new(alpha: f32, view_direction: Vector3<f32>) -> Self {
        debug_assert!(alpha >= ALPHA_MIN, "Roughness {alpha} below minimum");
        debug_assert!(
            view_direction.z >= NDOTV_MIN,
            "View direction cosine {} below minimum",
            view_direction.z
        );
        Self {
            alpha: alpha.max(ALPHA_MIN),
            view_direction: Vector3::new(
                view_direction.x,
                view_direction.y,
                view_direction.z.max(NDOTV_MIN),
            ),
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn view_direction(&self) -> &Vector3<f32> {
        &self.view_direction
    }
}

impl SampleEvaluator {
    pub fn new(config: IntegrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    /// Computes the [`ReflectanceNorm`] for the given roughness `alpha` and
    /// view direction `omega_o` on the calling thread.
    pub fn evaluate(&self, alpha: f32, omega_o: &Vector3<f32>) -> ReflectanceNorm {
        self.evaluate_parameters(&IntegrationParameters::new(alpha, *omega_o))
    }

    /// Computes the [`ReflectanceNorm`] for the given parameters on the
    /// calling thread. The samples are summed in chunks of the configured
    /// grain size and the chunk sums are combined pairwise, exactly as in
    /// [`Self::evaluate_with_pool`].
    pub fn evaluate_parameters(&self, parameters: &IntegrationParameters) -> ReflectanceNorm {
        let task = self.create_task(parameters);
        thread::reduce_range_sequentially(
            &task,
            task.sample_range(),
            self.config.sample_grain_size,
            FresnelMoments::combine,
        )
        .to_norm()
    }

    /// Computes the [`ReflectanceNorm`] for the given roughness `alpha` and
    /// view direction `omega_o`, integrating the sample chunks in parallel on
    /// the given thread pool. The result is bitwise identical to that of
    /// [`Self::evaluate`].
    ///
    /// # Errors
    /// Returns an error if a worker failed to integrate its chunk.
    pub fn evaluate_with_pool(
        &self,
        pool: &mut SampleIntegrationPool,
        alpha: f32,
        omega_o: &Vector3<f32>,
    ) -> Result<ReflectanceNorm> {
        let task = self.create_task(&IntegrationParameters::new(alpha, *omega_o));
        let moments = pool.reduce_range(
            &task,
            task.sample_range(),
            self.config.sample_grain_size,
            FresnelMoments::combine,
        )?;
        Ok(moments.to_norm())
    }

    fn create_task(&self, parameters: &IntegrationParameters) -> SampleIntegrationTask {
        SampleIntegrationTask {
            parameters: *parameters,
            sample_count: self.config.sample_count.get(),
        }
    }
}

impl Default for SampleEvaluator {
    fn default() -> Self {
        Self::new(IntegrationConfig::default())
    }
}

impl SampleIntegrationTask {
    fn sample_range(&self) -> Range<usize> {
        0..self.sample_count as usize
    }
}

impl RangeTask for SampleIntegrationTask {
    type Output = FresnelMoments;

    fn execute_range(&self, range: Range<usize>) -> FresnelMoments {
        integrate_sample_range(&self.parameters, self.sample_count, range)
    }
}

/// Sums the contributions of the samples with indices in the given range to
/// the [`FresnelMoments`] estimated with `sample_count` samples in total.
///
/// For each sample, a microfacet normal is drawn from the visible normal
/// distribution and the view direction is reflected about it. The resulting
/// throughput (excluding Fresnel) is weighted by the Schlick `F0` and `F90`
/// factors for the angle between the view direction and the half vector.
///
/// # Panics
/// If the range extends beyond `sample_count`.
pub fn integrate_sample_range(
    parameters: &IntegrationParameters,
    sample_count: u32,
    sample_range: Range<usize>,
) -> FresnelMoments {
    let alpha = parameters.alpha;
    let omega_o = &parameters.view_direction;

    let sample_weight = 1.0 / f64::from(sample_count);

    let mut moments = FresnelMoments::default();

    for sample_index in sample_range {
        let xi = sequence::hammersley_2d(sample_index as u32, sample_count);

        let omega_h = microfacet::sample_visible_half_vector(&xi, alpha, omega_o);
        let omega_i = microfacet::reflect_about_half_vector(omega_o, &omega_h);

        let v_dot_h = microfacet::compute_v_dot_h(omega_o.dot(omega_i.as_ref()));
        let n_dot_l = omega_i.z.max(0.0);

        let throughput = microfacet::throughput_without_fresnel(alpha, n_dot_l);
        debug_assert!(throughput >= 0.0);

        let (f0_factor, f90_factor) = microfacet::schlick_fresnel_factors(v_dot_h);

        moments.f0 += sample_weight * f64::from(throughput) * f64::from(f0_factor);
        moments.f90 += sample_weight * f64::from(throughput) * f64::from(f90_factor);
    }

    moments
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;
    use std::num::{NonZeroU32, NonZeroUsize};

    fn view_direction(cos_theta: f32, phi: f32) -> Vector3<f32> {
        let sin_theta = f32::sqrt(f32::max(0.0, 1.0 - cos_theta * cos_theta));
        Vector3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
    }

    fn evaluator_with_grain_size(grain_size: usize) -> SampleEvaluator {
        SampleEvaluator::new(IntegrationConfig {
            sample_grain_size: NonZeroUsize::new(grain_size).unwrap(),
            ..IntegrationConfig::default()
        })
    }

    fn assert_relative_eq_within(a: f32, b: f32, tolerance: f32) {
        assert!(
            (a - b).abs() <= tolerance * f32::max(a.abs(), b.abs()),
            "{a} and {b} differ by more than {tolerance} relative"
        );
    }

    #[test]
    fn smooth_surface_at_normal_incidence_reflects_everything_through_f0() {
        let norm = SampleEvaluator::default().evaluate(ALPHA_MIN, &Vector3::z());
        assert!(norm.f0_norm > 0.99);
        assert!(norm.f90_norm < 0.01);
    }

    #[test]
    fn grazing_view_on_smooth_surface_is_dominated_by_f90() {
        let norm = SampleEvaluator::default().evaluate(ALPHA_MIN, &view_direction(NDOTV_MIN, 0.0));
        assert!(norm.f90_norm > norm.f0_norm);
    }

    #[test]
    fn rough_surface_reflects_less_than_smooth_surface() {
        let evaluator = SampleEvaluator::default();
        let smooth = evaluator.evaluate(0.1, &Vector3::z());
        let rough = evaluator.evaluate(1.0, &Vector3::z());
        assert!(rough.f0_norm + rough.f90_norm < smooth.f0_norm + smooth.f90_norm);
    }

    #[test]
    fn evaluation_is_independent_of_azimuth() {
        let evaluator = SampleEvaluator::default();
        for (alpha, cos_theta) in [(0.5, 0.6), (0.2, 0.9), (0.9, 0.2)] {
            let reference = evaluator.evaluate(alpha, &view_direction(cos_theta, 0.0));
            for phi in [0.7, 2.5, 4.0] {
                let rotated = evaluator.evaluate(alpha, &view_direction(cos_theta, phi));
                assert_abs_diff_eq!(rotated.f0_norm, reference.f0_norm, epsilon = 0.01);
                assert_abs_diff_eq!(rotated.f90_norm, reference.f90_norm, epsilon = 0.01);
            }
        }
    }

    #[test]
    fn chunking_of_samples_does_not_change_result_beyond_rounding() {
        let omega_o = view_direction(0.4, 0.0);
        let single_chunk = evaluator_with_grain_size(16384).evaluate(0.3, &omega_o);
        for grain_size in [1, 64, 1000, 5000] {
            let chunked = evaluator_with_grain_size(grain_size).evaluate(0.3, &omega_o);
            assert_relative_eq_within(chunked.f0_norm, single_chunk.f0_norm, 1e-6);
            assert_relative_eq_within(chunked.f90_norm, single_chunk.f90_norm, 1e-6);
        }
    }

    #[test]
    fn combining_moments_of_split_ranges_matches_whole_range() {
        let parameters = IntegrationParameters::new(0.6, view_direction(0.7, 0.0));
        let whole = integrate_sample_range(&parameters, 1024, 0..1024);
        let split = integrate_sample_range(&parameters, 1024, 0..100)
            + integrate_sample_range(&parameters, 1024, 100..777)
            + integrate_sample_range(&parameters, 1024, 777..1024);
        assert_abs_diff_eq!(split.f0, whole.f0, epsilon = 1e-12);
        assert_abs_diff_eq!(split.f90, whole.f90, epsilon = 1e-12);
    }

    #[test]
    fn evaluation_on_pool_is_bitwise_identical_to_sequential_evaluation() {
        let evaluator = SampleEvaluator::default();
        let mut pool = SampleIntegrationPool::new(NonZeroUsize::new(3).unwrap());
        let omega_o = view_direction(0.35, 0.0);
        let sequential = evaluator.evaluate(0.45, &omega_o);
        let parallel = evaluator.evaluate_with_pool(&mut pool, 0.45, &omega_o).unwrap();
        assert_eq!(parallel.f0_norm.to_bits(), sequential.f0_norm.to_bits());
        assert_eq!(parallel.f90_norm.to_bits(), sequential.f90_norm.to_bits());
    }

    #[test]
    fn parameters_at_minimums_are_kept() {
        let parameters = IntegrationParameters::new(ALPHA_MIN, Vector3::new(1.0, 0.0, NDOTV_MIN));
        assert_eq!(parameters.alpha(), ALPHA_MIN);
        assert_eq!(parameters.view_direction().z, NDOTV_MIN);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn parameters_below_minimums_are_clamped() {
        let parameters = IntegrationParameters::new(0.0, Vector3::new(1.0, 0.0, -0.5));
        assert_eq!(parameters.alpha(), ALPHA_MIN);
        assert_eq!(parameters.view_direction().z, NDOTV_MIN);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn parameters_below_minimums_are_rejected_in_debug_builds() {
        let _ = IntegrationParameters::new(0.0, Vector3::new(1.0, 0.0, NDOTV_MIN));
    }

    #[test]
    fn reduced_sample_count_still_gives_bounded_result() {
        let evaluator = SampleEvaluator::new(IntegrationConfig {
            sample_count: NonZeroU32::new(100).unwrap(),
            sample_grain_size: NonZeroUsize::new(7).unwrap(),
        });
        let norm = evaluator.evaluate(0.5, &view_direction(0.5, 0.0));
        assert!(norm.f0_norm > 0.0 && norm.f90_norm >= 0.0);
        assert!(norm.f0_norm + norm.f90_norm <= 1.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]
        #[test]
        fn reflectance_norms_respect_energy_bound(
            alpha in ALPHA_MIN..1.0,
            cos_theta in NDOTV_MIN..1.0,
        ) {
            let norm = SampleEvaluator::default().evaluate(alpha, &view_direction(cos_theta, 0.0));
            prop_assert!((0.0..=1.0).contains(&norm.f0_norm));
            prop_assert!((0.0..=1.0).contains(&norm.f90_norm));
            prop_assert!(norm.f0_norm + norm.f90_norm <= 1.05);
        }
    }
}
