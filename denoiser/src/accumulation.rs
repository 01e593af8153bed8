//! Temporal Accumulation

use raydn_core::buffer::Buffer2D;
use raydn_core::geometry::*;
use raydn_core::raydn::*;

/// Blends reprojected history color into the current spatially filtered
/// color with an exponential moving average, gated by the validity mask.
///
/// Pixels with valid history get `lerp(alpha, history, filtered)`; a
/// smaller alpha means more temporal smoothing and more lag. Pixels with
/// invalid history reset to the filtered color outright.
///
/// Before blending, the history color is optionally clamped per channel
/// to the min/max of the current filtered color over a small window
/// around the pixel. History that has drifted far from what the current
/// frame supports (stale but still "valid") is pulled back into range
/// instead of ghosting.
pub struct TemporalAccumulator {
    /// Blend factor in (0, 1]; the weight of the current filtered color.
    alpha: Float,

    /// Half width of the clamp window, or `None` to disable the clamp.
    clamp_radius: Option<usize>,

    /// Number of worker threads for the pass.
    n_threads: usize,
}

impl TemporalAccumulator {
    /// Create a new `TemporalAccumulator` instance.
    ///
    /// * `alpha`        - Blend factor. Must be in (0, 1].
    /// * `clamp_radius` - Half width of the clamp window, or `None` to
    ///                    disable the anti-ghosting clamp.
    /// * `n_threads`    - Number of worker threads for the pass.
    pub fn new(alpha: Float, clamp_radius: Option<usize>, n_threads: usize) -> Self {
        assert!(
            alpha > 0.0 && alpha <= 1.0,
            "blend factor alpha must be in (0, 1], got {alpha}"
        );
        assert!(n_threads > 0, "n_threads must be positive");
        Self {
            alpha,
            clamp_radius,
            n_threads,
        }
    }

    /// Merge the filtered color with the reprojected history, producing
    /// the new accumulated color buffer.
    ///
    /// * `filtered` - The current spatially filtered color.
    /// * `history`  - Reprojected history color candidates.
    /// * `valid`    - Per-pixel history validity.
    pub fn accumulate(
        &self,
        filtered: &Buffer2D<Vector3f>,
        history: &Buffer2D<Vector3f>,
        valid: &Buffer2D<bool>,
    ) -> Buffer2D<Vector3f> {
        assert!(
            filtered.dimensions() == history.dimensions()
                && filtered.dimensions() == valid.dimensions(),
            "accumulation dimensions disagree: filtered {}, history {}, validity {}",
            filtered.dimensions(),
            history.dimensions(),
            valid.dimensions()
        );

        let width = filtered.width();
        let height = filtered.height();
        let mut accumulated = Buffer2D::new(width, height, Vector3f::zero());

        let n_threads = min(self.n_threads, height);
        debug!("Accumulation pass: {width}x{height}, {n_threads} threads");

        crossbeam::scope(|scope| {
            let (tx, rx) = crossbeam_channel::bounded(n_threads);

            // Spawn worker threads.
            for _ in 0..n_threads {
                let rxc: crossbeam_channel::Receiver<(usize, &mut [Vector3f])> = rx.clone();
                scope.spawn(move |_| {
                    for (y, row) in rxc.iter() {
                        for (x, pixel) in row.iter_mut().enumerate() {
                            *pixel = self.accumulate_pixel(filtered, history, valid, x, y);
                        }
                    }
                });
            }
            drop(rx);

            // Send scanlines.
            for (y, row) in accumulated.rows_mut().enumerate() {
                tx.send((y, row)).unwrap();
            }
        })
        .unwrap();

        accumulated
    }

    /// Blend a single pixel.
    ///
    /// * `filtered` - The current spatially filtered color.
    /// * `history`  - Reprojected history color candidates.
    /// * `valid`    - Per-pixel history validity.
    /// * `x`        - X-coordinate.
    /// * `y`        - Y-coordinate.
    fn accumulate_pixel(
        &self,
        filtered: &Buffer2D<Vector3f>,
        history: &Buffer2D<Vector3f>,
        valid: &Buffer2D<bool>,
        x: usize,
        y: usize,
    ) -> Vector3f {
        let current = filtered.get(x, y);

        // Invalid history resets to the filtered color outright.
        if !valid.get(x, y) {
            return current;
        }

        let mut history_color = history.get(x, y);
        if let Some(radius) = self.clamp_radius {
            let (lo, hi) = neighborhood_bounds(filtered, x, y, radius);
            history_color = history_color.clamp(&lo, &hi);
        }

        lerp(self.alpha, history_color, current)
    }
}

/// Per-channel min/max of the buffer over the window of given radius
/// around a pixel, skipping neighbors outside the buffer.
///
/// * `buffer` - The color buffer.
/// * `x`      - X-coordinate of the window center.
/// * `y`      - Y-coordinate of the window center.
/// * `radius` - Half width of the window.
fn neighborhood_bounds(
    buffer: &Buffer2D<Vector3f>,
    x: usize,
    y: usize,
    radius: usize,
) -> (Vector3f, Vector3f) {
    let radius = radius as Int;
    let mut lo = buffer.get(x, y);
    let mut hi = lo;

    for j in -radius..=radius {
        for i in -radius..=radius {
            let qx = x as Int + i;
            let qy = y as Int + j;
            if buffer.contains(qx, qy) {
                let q = buffer.get(qx as usize, qy as usize);
                lo = lo.min(&q);
                hi = hi.max(&q);
            }
        }
    }

    (lo, hi)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
