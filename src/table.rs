//! Construction of the reflectance lookup table.

use crate::{
    config::{IntegrationConfig, LookupTableConfig},
    integration::{IntegrationParameters, ReflectanceNorm, SampleEvaluator},
    microfacet::{ALPHA_MIN, NDOTV_MIN},
    thread::{self, RangeTask, RangeTaskChunk, ThreadPool},
};
use anyhow::Result;
use nalgebra::Vector3;
use std::{num::NonZeroUsize, ops::Range};

/// A table of [`ReflectanceNorm`]s where the cosine of the view angle
/// decreases from one to zero along the width and the roughness decreases
/// from one to zero along the height. Texels are stored row by row.
#[derive(Clone, Debug, PartialEq)]
pub struct ReflectanceLookupTable {
    width: u32,
    height: u32,
    norms: Vec<ReflectanceNorm>,
}

/// Builds [`ReflectanceLookupTable`]s by integrating texels in parallel on
/// a pool of worker threads.
#[derive(Debug)]
pub struct LookupTableBuilder {
    pool: ThreadPool<RangeTaskChunk<TexelIntegrationTask>>,
    evaluator: SampleEvaluator,
    texel_grain_size: NonZeroUsize,
}

/// A [`RangeTask`] computing the [`ReflectanceNorm`]s for a range of texel
/// indices in a table of the given dimensions.
#[derive(Clone, Copy, Debug)]
pub struct TexelIntegrationTask {
    width: u32,
    height: u32,
    evaluator: SampleEvaluator,
}

impl ReflectanceLookupTable {
    /// Wraps the given row-major texels in a table of the given dimensions.
    ///
    /// # Panics
    /// If the number of texels differs from `width * height`.
    pub fn new(width: u32, height: u32, norms: Vec<ReflectanceNorm>) -> Self {
        assert_eq!(
            norms.len(),
            texel_count(width, height),
            "Texel count does not match {width}x{height} table"
        );
        Self {
            width,
            height,
            norms,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns all texels in row-major order.
    pub fn norms(&self) -> &[ReflectanceNorm] {
        &self.norms
    }

    /// Returns the texel at the given coordinates.
    ///
    /// # Panics
    /// If the coordinates are outside the table.
    pub fn norm(&self, x: u32, y: u32) -> ReflectanceNorm {
        assert!(x < self.width && y < self.height);
        self.norms[texel_index(x, y, self.width)]
    }

    pub fn into_norms(self) -> Vec<ReflectanceNorm> {
        self.norms
    }
}

impl LookupTableBuilder {
    /// Creates a builder integrating texels with the given number of worker
    /// threads, handing `texel_grain_size` consecutive texels to a worker at
    /// a time.
    pub fn new(
        n_worker_threads: NonZeroUsize,
        texel_grain_size: NonZeroUsize,
        integration_config: IntegrationConfig,
    ) -> Self {
        Self {
            pool: ThreadPool::new(n_worker_threads),
            evaluator: SampleEvaluator::new(integration_config),
            texel_grain_size,
        }
    }

    /// Creates a builder with the threading and integration parameters of
    /// the given configuration.
    pub fn from_config(config: &LookupTableConfig) -> Self {
        Self::new(
            config.n_worker_threads,
            config.texel_grain_size,
            config.integration,
        )
    }

    /// Computes a lookup table of the given dimensions.
    ///
    /// # Errors
    /// See [`Self::build_into`].
    ///
    /// # Panics
    /// If `width` or `height` is smaller than two.
    pub fn build(&mut self, width: u32, height: u32) -> Result<ReflectanceLookupTable> {
        let mut norms = vec![ReflectanceNorm::default(); texel_count(width, height)];
        self.build_into(width, height, &mut norms)?;
        Ok(ReflectanceLookupTable::new(width, height, norms))
    }

    /// Computes the texels of a lookup table of the given dimensions and
    /// writes them in row-major order into the given buffer. The result does
    /// not depend on the number of worker threads or the texel grain size.
    ///
    /// # Errors
    /// Returns an error if a worker failed to integrate its texels.
    ///
    /// # Panics
    /// - If `width` or `height` is smaller than two.
    /// - If the length of `norms` differs from `width * height`.
    pub fn build_into(
        &mut self,
        width: u32,
        height: u32,
        norms: &mut [ReflectanceNorm],
    ) -> Result<()> {
        assert!(
            width >= 2 && height >= 2,
            "Lookup table must be at least 2x2, got {width}x{height}"
        );
        assert_eq!(
            norms.len(),
            texel_count(width, height),
            "Output buffer does not match {width}x{height} table"
        );

        let task = TexelIntegrationTask {
            width,
            height,
            evaluator: self.evaluator,
        };
        let texel_range = 0..norms.len();

        log::info!(
            "Integrating {}x{} texels with {} samples each on {} threads",
            width,
            height,
            self.evaluator.config().sample_count,
            self.pool.n_workers()
        );

        let texel_chunks = with_timing_info_logging!(
            "Integrating {}x{} lookup table", width, height;
            self.pool.for_each_range(&task, texel_range.clone(), self.texel_grain_size)
        )?;

        for (chunk_range, chunk_norms) in
            thread::partition_range(texel_range, self.texel_grain_size).zip(texel_chunks)
        {
            norms[chunk_range].copy_from_slice(&chunk_norms);
        }

        Ok(())
    }
}

impl RangeTask for TexelIntegrationTask {
    type Output = Vec<ReflectanceNorm>;

    fn execute_range(&self, range: Range<usize>) -> Vec<ReflectanceNorm> {
        let width = self.width as usize;
        range
            .map(|texel_idx| {
                let x = (texel_idx % width) as u32;
                let y = (texel_idx / width) as u32;
                let parameters = texel_integration_parameters(x, y, self.width, self.height);
                self.evaluator.evaluate_parameters(&parameters)
            })
            .collect()
    }
}

/// Determines the roughness and view direction for the texel at `(x, y)` in
/// a table of the given dimensions.
///
/// The texel coordinates are mapped to `u = x / (width - 1)` and `v = y /
/// (height - 1)`, so the first and last texels lie exactly at `0` and `1`
/// (there is no half-texel offset). The cosine of the view angle is `1 - u`
/// and the roughness is `1 - v`, clamped to [`NDOTV_MIN`] and [`ALPHA_MIN`].
/// The view direction lies in the xz-plane, which is sufficient since the
/// reflectance of an isotropic surface does not depend on the azimuth.
///
/// # Panics
/// - If `width` or `height` is smaller than two.
/// - If the coordinates are outside the table.
pub fn texel_integration_parameters(
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> IntegrationParameters {
    assert!(width >= 2 && height >= 2);
    assert!(x < width, "Texel x-coordinate {x} outside table of width {width}");
    assert!(y < height, "Texel y-coordinate {y} outside table of height {height}");

    let texcoord_u = x as f32 / (width - 1) as f32;
    let texcoord_v = y as f32 / (height - 1) as f32;

    let cos_theta_o = f32::max(NDOTV_MIN, 1.0 - texcoord_u);
    let sin_theta_o = f32::sqrt(f32::max(0.0, 1.0 - cos_theta_o * cos_theta_o));
    let omega_o = Vector3::new(sin_theta_o, 0.0, cos_theta_o);

    let alpha = f32::max(ALPHA_MIN, 1.0 - texcoord_v);

    IntegrationParameters::new(alpha, omega_o)
}

fn texel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

fn texel_index(x: u32, y: u32, width: u32) -> usize {
    y as usize * width as usize + x as usize
}
