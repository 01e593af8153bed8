//! Denoiser Pipeline

use crate::accumulation::TemporalAccumulator;
use crate::reprojection::TemporalReprojector;
use crate::spatial::SpatialFilter;
use raydn_core::buffer::Buffer2D;
use raydn_core::frame::FrameInfo;
use raydn_core::geometry::*;
use raydn_core::raydn::*;
use std::time::Instant;

/// Tunable knobs for the denoising pipeline. The defaults are the
/// constants the filter was tuned with; they are numeric sensitivities,
/// not behavioral modes.
#[derive(Clone, Debug)]
pub struct DenoiserParams {
    /// Half width of the spatial filter window.
    pub kernel_radius: usize,

    /// Screen-space distance sensitivity of the spatial filter.
    pub sigma_coord: Float,

    /// Color difference sensitivity of the spatial filter.
    pub sigma_color: Float,

    /// Normal angle sensitivity of the spatial filter.
    pub sigma_normal: Float,

    /// Tangent plane distance sensitivity of the spatial filter.
    pub sigma_plane: Float,

    /// Temporal blend factor in (0, 1]; the weight of the current frame.
    pub alpha: Float,

    /// Half width of the temporal clamp window, or `None` to disable the
    /// anti-ghosting clamp.
    pub clamp_radius: Option<usize>,

    /// Disocclusion world-distance threshold for reprojection.
    pub position_threshold: Float,

    /// Minimum normal cosine for reprojection.
    pub normal_threshold: Float,

    /// Number of worker threads per pass.
    pub n_threads: usize,
}

impl Default for DenoiserParams {
    /// Returns the tuned default parameters, using every logical CPU.
    fn default() -> Self {
        Self {
            kernel_radius: 16,
            sigma_coord: 32.0,
            sigma_color: 0.6,
            sigma_normal: 0.1,
            sigma_plane: 0.1,
            alpha: 0.2,
            clamp_radius: Some(3),
            position_threshold: 0.1,
            normal_threshold: 0.8,
            n_threads: num_cpus::get(),
        }
    }
}

impl DenoiserParams {
    /// Returns the number of worker threads to use.
    pub fn threads(&self) -> usize {
        let max_threads = num_cpus::get();
        match self.n_threads {
            0 => {
                warn!("Invalid nthreads");
                1
            }
            n if n > max_threads => {
                warn!("Num threads > max logical CPUs {}", max_threads);
                max_threads
            }
            n => n,
        }
    }
}

/// Per-pixel state carried from one frame to the next.
struct History {
    /// The accumulated color, which doubled as the previous frame's
    /// output.
    acc_color: Buffer2D<Vector3f>,

    /// Which pixels kept temporal history on the previous frame.
    valid: Buffer2D<bool>,

    /// The previous frame, retained for its G-buffers and transforms.
    prev_frame: FrameInfo,
}

/// The denoising pipeline. Each call to `process_frame` runs the spatial
/// filter and, once history exists, reprojects and blends the previous
/// accumulated color into the result, which then becomes the new history.
///
/// The pipeline starts cold (no history); the first frame's output is the
/// spatially filtered color alone. It owns its history exclusively and is
/// not reentrant: one frame at a time.
pub struct Denoiser {
    /// The spatial filter pass.
    spatial: SpatialFilter,

    /// The reprojection pass.
    reprojector: TemporalReprojector,

    /// The accumulation pass.
    accumulator: TemporalAccumulator,

    /// History from the previous frame; `None` until the first frame has
    /// been processed.
    history: Option<History>,
}

impl Denoiser {
    /// Create a new `Denoiser` instance in the cold state.
    ///
    /// * `params` - Pipeline parameters.
    pub fn new(params: DenoiserParams) -> Self {
        let n_threads = params.threads();
        Self {
            spatial: SpatialFilter::new(
                params.kernel_radius,
                params.sigma_coord,
                params.sigma_color,
                params.sigma_normal,
                params.sigma_plane,
                n_threads,
            ),
            reprojector: TemporalReprojector::new(
                params.position_threshold,
                params.normal_threshold,
                n_threads,
            ),
            accumulator: TemporalAccumulator::new(params.alpha, params.clamp_radius, n_threads),
            history: None,
        }
    }

    /// Returns true once history from a previous frame is present.
    pub fn is_warm(&self) -> bool {
        self.history.is_some()
    }

    /// Denoise one frame. Runs the spatial filter, then reprojects and
    /// blends history where it exists, and persists the result as the
    /// history for the next call.
    ///
    /// Consecutive frames must share dimensions; a mismatch panics rather
    /// than accumulating into buffers that no longer correspond.
    ///
    /// * `frame` - The frame to denoise.
    pub fn process_frame(&mut self, frame: &FrameInfo) -> Buffer2D<Vector3f> {
        let start = Instant::now();

        // Filter current frame.
        let filtered = self.spatial.filter(frame);

        // Reproject previous frame color to current and blend.
        let (acc_color, valid) = match self.history.take() {
            Some(history) => {
                assert!(
                    history.prev_frame.dimensions() == frame.dimensions(),
                    "frame dimensions changed from {} to {}",
                    history.prev_frame.dimensions(),
                    frame.dimensions()
                );

                let (history_color, valid) =
                    self.reprojector
                        .reproject(frame, &history.prev_frame, &history.acc_color);

                let kept = valid.data().iter().filter(|v| **v).count();
                debug!(
                    "{kept} of {} pixels kept temporal history",
                    frame.width() * frame.height()
                );

                let acc_color = self.accumulator.accumulate(&filtered, &history_color, &valid);
                (acc_color, valid)
            }
            None => {
                // First frame: nothing to blend, the filtered color is
                // the whole answer.
                let valid = Buffer2D::new(frame.width(), frame.height(), false);
                (filtered, valid)
            }
        };

        // Maintain history for the next frame.
        self.history = Some(History {
            acc_color: acc_color.clone(),
            valid,
            prev_frame: frame.clone(),
        });

        info!(
            "Denoised {}x{} frame in {:.2?}",
            frame.width(),
            frame.height(),
            start.elapsed()
        );

        acc_color
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
