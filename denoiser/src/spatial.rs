//! Spatial Filter

use raydn_core::buffer::Buffer2D;
use raydn_core::frame::FrameInfo;
use raydn_core::geometry::*;
use raydn_core::raydn::*;

/// A joint bilateral filter. Each output pixel is a weighted average of
/// the beauty colors in the surrounding kernel window, with weights that
/// fall off with screen distance, color difference, normal disagreement
/// and distance from the local tangent plane. Geometric edges therefore
/// stop the blur while smooth noisy regions are averaged down.
pub struct SpatialFilter {
    /// Half width of the square kernel window; the window spans
    /// [-kernel_radius, kernel_radius] in x and y inclusive.
    kernel_radius: usize,

    /// Screen-space distance sensitivity.
    sigma_coord: Float,

    /// Color difference sensitivity.
    sigma_color: Float,

    /// Normal angle sensitivity.
    sigma_normal: Float,

    /// Tangent plane distance sensitivity.
    sigma_plane: Float,

    /// Number of worker threads for the pass.
    n_threads: usize,
}

impl SpatialFilter {
    /// Create a new `SpatialFilter` instance.
    ///
    /// * `kernel_radius` - Half width of the square kernel window.
    /// * `sigma_coord`   - Screen-space distance sensitivity. Must be positive.
    /// * `sigma_color`   - Color difference sensitivity. Must be positive.
    /// * `sigma_normal`  - Normal angle sensitivity. Must be positive.
    /// * `sigma_plane`   - Tangent plane distance sensitivity. Must be
    ///                     non-negative; zero disables the plane term.
    /// * `n_threads`     - Number of worker threads for the pass.
    pub fn new(
        kernel_radius: usize,
        sigma_coord: Float,
        sigma_color: Float,
        sigma_normal: Float,
        sigma_plane: Float,
        n_threads: usize,
    ) -> Self {
        assert!(sigma_coord > 0.0, "sigma_coord must be positive");
        assert!(sigma_color > 0.0, "sigma_color must be positive");
        assert!(sigma_normal > 0.0, "sigma_normal must be positive");
        assert!(sigma_plane >= 0.0, "sigma_plane must be non-negative");
        assert!(n_threads > 0, "n_threads must be positive");
        Self {
            kernel_radius,
            sigma_coord,
            sigma_color,
            sigma_normal,
            sigma_plane,
            n_threads,
        }
    }

    /// Filter a frame's beauty buffer, producing a denoised color buffer
    /// of identical dimensions. Pixels are independent; the pass runs on
    /// worker threads pulling scanlines from a queue.
    ///
    /// * `frame` - The frame to filter.
    pub fn filter(&self, frame: &FrameInfo) -> Buffer2D<Vector3f> {
        let width = frame.width();
        let height = frame.height();
        let mut filtered = Buffer2D::new(width, height, Vector3f::zero());

        let n_threads = min(self.n_threads, height);
        debug!(
            "Spatial pass: {width}x{height}, kernel radius {}, {n_threads} threads",
            self.kernel_radius
        );

        crossbeam::scope(|scope| {
            let (tx, rx) = crossbeam_channel::bounded(n_threads);

            // Spawn worker threads.
            for _ in 0..n_threads {
                let rxc: crossbeam_channel::Receiver<(usize, &mut [Vector3f])> = rx.clone();
                scope.spawn(move |_| {
                    for (y, row) in rxc.iter() {
                        for (x, pixel) in row.iter_mut().enumerate() {
                            *pixel = self.filter_pixel(frame, x, y);
                        }
                    }
                });
            }
            drop(rx);

            // Send scanlines.
            for (y, row) in filtered.rows_mut().enumerate() {
                tx.send((y, row)).unwrap();
            }
        })
        .unwrap();

        filtered
    }

    /// Filter a single pixel.
    ///
    /// * `frame` - The frame to filter.
    /// * `x`     - X-coordinate.
    /// * `y`     - Y-coordinate.
    fn filter_pixel(&self, frame: &FrameInfo, x: usize, y: usize) -> Vector3f {
        let radius = self.kernel_radius as Int;
        let p_beauty = frame.beauty.get(x, y);
        let p_normal = frame.normal.get(x, y);
        let p_position = frame.position.get(x, y);
        let p_normal_degenerate = p_normal.length_squared() == 0.0;

        let mut weight_sum = 0.0;
        let mut color = Vector3f::zero();

        for j in -radius..=radius {
            for i in -radius..=radius {
                let qx = x as Int + i;
                let qy = y as Int + j;

                // Neighbors outside the buffer contribute nothing.
                if !frame.beauty.contains(qx, qy) {
                    continue;
                }
                let (qx, qy) = (qx as usize, qy as usize);

                let q_beauty = frame.beauty.get(qx, qy);
                let q_normal = frame.normal.get(qx, qy);
                let q_position = frame.position.get(qx, qy);

                // Sum the edge-stopping terms in log space and
                // exponentiate once.
                let mut exponent = -((i * i + j * j) as Float) / (2.0 * sqr(self.sigma_coord));
                exponent -=
                    (p_beauty - q_beauty).length_squared() / (2.0 * sqr(self.sigma_color));

                // The angle term only applies when both normals carry a
                // surface.
                if !p_normal_degenerate && q_normal.length_squared() > 0.0 {
                    exponent -= sqr(safe_acos(p_normal.dot(&q_normal)))
                        / (2.0 * sqr(self.sigma_normal));
                }

                // Co-planarity term; coincident positions contribute
                // nothing.
                let diff = q_position - p_position;
                let len = diff.length();
                if len > 0.0 {
                    exponent -= sqr(p_normal.dot(&(diff / len))) * (2.0 * sqr(self.sigma_plane));
                }

                let weight = exponent.exp();
                weight_sum += weight;
                color += q_beauty * weight;
            }
        }

        // A zero weight sum must not divide.
        if weight_sum == 0.0 {
            Vector3f::zero()
        } else {
            color / weight_sum
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use float_cmp::*;
    use proptest::prelude::*;

    #[test]
    fn zero_radius_is_identity() {
        let frame = screen_aligned_frame(5, 4, |x, y| {
            Vector3f::new(x as Float, y as Float, (x * y) as Float)
        });
        let filter = SpatialFilter::new(0, 32.0, 0.6, 0.1, 0.1, 1);
        assert_eq!(filter.filter(&frame), frame.beauty);
    }

    #[test]
    fn wide_signal_sigmas_degenerate_to_spatial_gaussian() {
        let width = 6;
        let height = 5;
        let sigma_coord = 1.5;
        let radius = 2;
        let frame = screen_aligned_frame(width, height, |x, y| {
            Vector3f::new((x + y) as Float, (x * 3) as Float * 0.25, y as Float)
        });

        let filter = SpatialFilter::new(radius, sigma_coord, INFINITY, INFINITY, 0.0, 1);
        let filtered = filter.filter(&frame);

        // Compare against a directly computed isotropic Gaussian blur.
        for y in 0..height {
            for x in 0..width {
                let mut weight_sum = 0.0;
                let mut color = Vector3f::zero();
                for j in -(radius as Int)..=(radius as Int) {
                    for i in -(radius as Int)..=(radius as Int) {
                        let qx = x as Int + i;
                        let qy = y as Int + j;
                        if !frame.beauty.contains(qx, qy) {
                            continue;
                        }
                        let weight = (-((i * i + j * j) as Float)
                            / (2.0 * sigma_coord * sigma_coord))
                            .exp();
                        weight_sum += weight;
                        color += frame.beauty.get(qx as usize, qy as usize) * weight;
                    }
                }
                let expected = color / weight_sum;
                let got = filtered.get(x, y);
                for c in 0..3 {
                    assert!(
                        approx_eq!(Float, got[c], expected[c], epsilon = 1e-4),
                        "pixel ({x}, {y}) channel {c}: {} != {}",
                        got[c],
                        expected[c]
                    );
                }
            }
        }
    }

    #[test]
    fn degenerate_normals_do_not_poison_the_output() {
        let frame = build_frame(
            4,
            4,
            |x, _| Vector3f::new(x as Float, 1.0, 0.5),
            |_, _| Vector3f::zero(),
            |x, y| Vector3f::new(x as Float, y as Float, 1.0),
            screen_aligned_matrices(),
        );
        let filter = SpatialFilter::new(2, 32.0, 0.6, 0.1, 0.1, 1);
        let filtered = filter.filter(&frame);
        for pixel in filtered.data() {
            assert!(!pixel.has_nans());
        }
    }

    proptest! {
        // The filtered color is a convex combination of the neighborhood
        // colors, so it must stay inside their per-channel bounds.
        #[test]
        fn output_stays_in_the_neighborhood_convex_hull(
            seed in proptest::collection::vec(0.0..100.0f32, 5 * 4 * 3),
        ) {
            let width = 5;
            let height = 4;
            let radius = 1;
            let frame = screen_aligned_frame(width, height, |x, y| {
                let offset = 3 * (y * width + x);
                Vector3f::new(seed[offset], seed[offset + 1], seed[offset + 2])
            });

            let filter = SpatialFilter::new(radius, 32.0, 0.6, 0.1, 0.1, 1);
            let filtered = filter.filter(&frame);

            for y in 0..height {
                for x in 0..width {
                    let mut lo = frame.beauty.get(x, y);
                    let mut hi = lo;
                    for j in -(radius as Int)..=(radius as Int) {
                        for i in -(radius as Int)..=(radius as Int) {
                            let qx = x as Int + i;
                            let qy = y as Int + j;
                            if frame.beauty.contains(qx, qy) {
                                let q = frame.beauty.get(qx as usize, qy as usize);
                                lo = lo.min(&q);
                                hi = hi.max(&q);
                            }
                        }
                    }
                    let got = filtered.get(x, y);
                    for c in 0..3 {
                        prop_assert!(got[c] >= lo[c] - 1e-3 && got[c] <= hi[c] + 1e-3);
                    }
                }
            }
        }
    }
}
