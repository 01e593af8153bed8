//! Temporal Reprojection

use raydn_core::buffer::Buffer2D;
use raydn_core::frame::FrameInfo;
use raydn_core::geometry::*;
use raydn_core::raydn::*;

/// Maps each current-frame pixel to its previous-frame screen location
/// using the previous frame's camera transforms and decides whether the
/// history stored there is still usable.
///
/// History at a pixel is rejected when the pixel carries no surface, the
/// surface was behind the previous camera, the reprojected coordinates
/// fall off screen, the previous surface disagrees in orientation or
/// world position (disocclusion), or there is no previous frame at all.
/// Rejection is a first-class outcome reported through the validity
/// mask, not an error.
///
/// History is fetched with nearest-neighbor sampling: the reprojected
/// coordinates are rounded to the nearest pixel. Bilinear sampling would
/// average history across disocclusion boundaries exactly where it is
/// least trustworthy.
pub struct TemporalReprojector {
    /// Maximum world-space distance between the current surface position
    /// and the reprojected previous position before history is treated
    /// as disoccluded.
    position_threshold: Float,

    /// Minimum cosine of the angle between the current and reprojected
    /// previous unit normals; lower values mean a different (or
    /// back-facing) surface.
    normal_threshold: Float,

    /// Number of worker threads for the pass.
    n_threads: usize,
}

impl TemporalReprojector {
    /// Create a new `TemporalReprojector` instance.
    ///
    /// * `position_threshold` - Disocclusion distance threshold. Must be
    ///                          non-negative.
    /// * `normal_threshold`   - Minimum normal cosine. Must be in [-1, 1].
    /// * `n_threads`          - Number of worker threads for the pass.
    pub fn new(position_threshold: Float, normal_threshold: Float, n_threads: usize) -> Self {
        assert!(
            position_threshold >= 0.0,
            "position_threshold must be non-negative"
        );
        assert!(
            (-1.0..=1.0).contains(&normal_threshold),
            "normal_threshold must be a cosine in [-1, 1]"
        );
        assert!(n_threads > 0, "n_threads must be positive");
        Self {
            position_threshold,
            normal_threshold,
            n_threads,
        }
    }

    /// Reproject the previous frame's accumulated color into the current
    /// frame's screen space. Returns the history color candidates (zero
    /// where invalid) and the validity mask.
    ///
    /// * `frame`          - The current frame.
    /// * `prev_frame`     - The previous frame, retained by the pipeline.
    /// * `prev_acc_color` - The previous accumulated color buffer.
    pub fn reproject(
        &self,
        frame: &FrameInfo,
        prev_frame: &FrameInfo,
        prev_acc_color: &Buffer2D<Vector3f>,
    ) -> (Buffer2D<Vector3f>, Buffer2D<bool>) {
        assert!(
            frame.dimensions() == prev_frame.dimensions()
                && frame.dimensions() == prev_acc_color.dimensions(),
            "reprojection dimensions disagree: frame {}, previous {}, history {}",
            frame.dimensions(),
            prev_frame.dimensions(),
            prev_acc_color.dimensions()
        );

        let width = frame.width();
        let height = frame.height();
        let mut color = Buffer2D::new(width, height, Vector3f::zero());
        let mut valid = Buffer2D::new(width, height, false);

        let n_threads = min(self.n_threads, height);
        debug!("Reprojection pass: {width}x{height}, {n_threads} threads");

        crossbeam::scope(|scope| {
            let (tx, rx) = crossbeam_channel::bounded(n_threads);

            // Spawn worker threads.
            for _ in 0..n_threads {
                let rxc: crossbeam_channel::Receiver<(usize, &mut [Vector3f], &mut [bool])> = rx.clone();
                scope.spawn(move |_| {
                    for (y, color_row, valid_row) in rxc.iter() {
                        for (x, (pixel, flag)) in
                            color_row.iter_mut().zip(valid_row.iter_mut()).enumerate()
                        {
                            let (c, v) = self.reproject_pixel(frame, prev_frame, prev_acc_color, x, y);
                            *pixel = c;
                            *flag = v;
                        }
                    }
                });
            }
            drop(rx);

            // Send scanline pairs.
            for ((y, color_row), valid_row) in
                color.rows_mut().enumerate().zip(valid.rows_mut())
            {
                tx.send((y, color_row, valid_row)).unwrap();
            }
        })
        .unwrap();

        (color, valid)
    }

    /// Reproject a single pixel. Returns the history color candidate and
    /// whether it is valid.
    ///
    /// * `frame`          - The current frame.
    /// * `prev_frame`     - The previous frame.
    /// * `prev_acc_color` - The previous accumulated color buffer.
    /// * `x`              - X-coordinate.
    /// * `y`              - Y-coordinate.
    fn reproject_pixel(
        &self,
        frame: &FrameInfo,
        prev_frame: &FrameInfo,
        prev_acc_color: &Buffer2D<Vector3f>,
        x: usize,
        y: usize,
    ) -> (Vector3f, bool) {
        let invalid = (Vector3f::zero(), false);

        // A zero normal marks a pixel with no surface to reproject.
        let normal = frame.normal.get(x, y);
        if normal.length_squared() == 0.0 {
            return invalid;
        }
        let position = frame.position.get(x, y);

        // The camera looks down -z in camera space; non-negative z was
        // behind the previous camera.
        let (camera_pos, _) = prev_frame.world_to_camera().transform_point(&position);
        if camera_pos.z >= 0.0 {
            return invalid;
        }

        // Project into the previous frame's pixel coordinates.
        let (screen, w) = prev_frame.world_to_screen().transform_point(&position);
        if w <= 0.0 || !screen.x.is_finite() || !screen.y.is_finite() {
            return invalid;
        }

        // Nearest-neighbor sample position.
        let qx = screen.x.round();
        let qy = screen.y.round();
        if !frame.beauty.contains(qx as Int, qy as Int) {
            return invalid;
        }
        let (qx, qy) = (qx as usize, qy as usize);

        // The previous surface must agree with the current one, both in
        // orientation and in world position; otherwise the pixel was
        // disoccluded and the history belongs to something else.
        let prev_normal = prev_frame.normal.get(qx, qy);
        if prev_normal.length_squared() == 0.0 {
            return invalid;
        }
        if normal.normalize().dot(&prev_normal.normalize()) < self.normal_threshold {
            return invalid;
        }
        if (prev_frame.position.get(qx, qy) - position).length() > self.position_threshold {
            return invalid;
        }

        (prev_acc_color.get(qx, qy), true)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;

    fn reprojector() -> TemporalReprojector {
        TemporalReprojector::new(0.1, 0.8, 1)
    }

    /// A history buffer whose colors encode their own pixel coordinates.
    fn coordinate_history(width: usize, height: usize) -> Buffer2D<Vector3f> {
        let mut history = Buffer2D::new(width, height, Vector3f::zero());
        for y in 0..height {
            for x in 0..width {
                history.set(x, y, Vector3f::new(x as Float, y as Float, 0.0));
            }
        }
        history
    }

    #[test]
    fn identity_reprojection_fetches_matching_history() {
        let frame = screen_aligned_frame(4, 3, |_, _| Vector3f::zero());
        let history = coordinate_history(4, 3);

        let (color, valid) = reprojector().reproject(&frame, &frame.clone(), &history);
        for y in 0..3 {
            for x in 0..4 {
                assert!(valid.get(x, y), "pixel ({x}, {y}) should be valid");
                assert_eq!(color.get(x, y), history.get(x, y));
            }
        }
    }

    #[test]
    fn off_screen_reprojection_is_invalid() {
        let frame = screen_aligned_frame(4, 3, |_, _| Vector3f::zero());

        // The previous camera saw everything shifted off the right edge.
        #[rustfmt::skip]
        let shifted = matrix4x4(
            1.0, 0.0, 0.0, 4.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );
        let prev_frame = build_frame(
            4,
            3,
            |_, _| Vector3f::zero(),
            |_, _| Vector3f::new(0.0, 0.0, 1.0),
            |x, y| Vector3f::new(x as Float, y as Float, 1.0),
            vec![look_down_negative_z(), shifted],
        );

        let (_, valid) = reprojector().reproject(&frame, &prev_frame, &coordinate_history(4, 3));
        assert!(valid.data().iter().all(|v| !v));
    }

    #[test]
    fn disoccluded_pixels_are_invalid() {
        let frame = screen_aligned_frame(4, 3, |_, _| Vector3f::zero());

        // The previous frame saw surfaces far away from the current ones.
        let prev_frame = build_frame(
            4,
            3,
            |_, _| Vector3f::zero(),
            |_, _| Vector3f::new(0.0, 0.0, 1.0),
            |x, y| Vector3f::new(x as Float, y as Float, 6.0),
            screen_aligned_matrices(),
        );

        let (_, valid) = reprojector().reproject(&frame, &prev_frame, &coordinate_history(4, 3));
        assert!(valid.data().iter().all(|v| !v));
    }

    #[test]
    fn disagreeing_normals_are_invalid() {
        let frame = screen_aligned_frame(4, 3, |_, _| Vector3f::zero());

        let prev_frame = build_frame(
            4,
            3,
            |_, _| Vector3f::zero(),
            |_, _| Vector3f::new(1.0, 0.0, 0.0),
            |x, y| Vector3f::new(x as Float, y as Float, 1.0),
            screen_aligned_matrices(),
        );

        let (_, valid) = reprojector().reproject(&frame, &prev_frame, &coordinate_history(4, 3));
        assert!(valid.data().iter().all(|v| !v));
    }

    #[test]
    fn surfaces_behind_the_previous_camera_are_invalid() {
        let frame = screen_aligned_frame(4, 3, |_, _| Vector3f::zero());

        // A previous view matrix that leaves z positive puts every
        // surface behind the camera.
        let prev_frame = build_frame(
            4,
            3,
            |_, _| Vector3f::zero(),
            |_, _| Vector3f::new(0.0, 0.0, 1.0),
            |x, y| Vector3f::new(x as Float, y as Float, 1.0),
            vec![IDENTITY_MATRIX, IDENTITY_MATRIX],
        );

        let (_, valid) = reprojector().reproject(&frame, &prev_frame, &coordinate_history(4, 3));
        assert!(valid.data().iter().all(|v| !v));
    }

    #[test]
    fn pixels_without_a_surface_are_invalid() {
        let frame = build_frame(
            4,
            3,
            |_, _| Vector3f::zero(),
            |_, _| Vector3f::zero(),
            |x, y| Vector3f::new(x as Float, y as Float, 1.0),
            screen_aligned_matrices(),
        );

        let (_, valid) =
            reprojector().reproject(&frame, &frame.clone(), &coordinate_history(4, 3));
        assert!(valid.data().iter().all(|v| !v));
    }
}
