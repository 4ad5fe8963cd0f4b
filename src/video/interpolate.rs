//! Frame-rate up-conversion by motion-compensated blending.
//!
//! For every consecutive pair of frames a block-matching flow field is
//! estimated on luma; intermediate frames sample both neighbours along the
//! motion vector and blend them by their temporal distance. With a static
//! flow this degenerates to a plain alpha blend.

use crate::error::{NarratorError, Result};
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};

/// One decoded video frame.
pub type Frame = RgbImage;

/// Output of [`MotionInterpolator::interpolate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolated {
    pub frames: Vec<Frame>,
    /// Output frame rate = source frame rate × this.
    pub fps_multiplier: u32,
}

/// Per-block motion vectors from one frame to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    block_size: u32,
    cols: u32,
    rows: u32,
    vectors: Vec<(i32, i32)>,
}

impl FlowField {
    /// Motion vector of the block containing pixel `(x, y)`.
    pub fn vector_at(&self, x: u32, y: u32) -> (i32, i32) {
        let col = (x / self.block_size).min(self.cols.saturating_sub(1));
        let row = (y / self.block_size).min(self.rows.saturating_sub(1));
        self.vectors
            .get((row * self.cols + col) as usize)
            .copied()
            .unwrap_or((0, 0))
    }

    pub fn is_static(&self) -> bool {
        self.vectors.iter().all(|&v| v == (0, 0))
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

fn luma(frame: &Frame) -> Vec<u8> {
    frame
        .pixels()
        .map(|Rgb([r, g, b])| ((77 * *r as u32 + 150 * *g as u32 + 29 * *b as u32) >> 8) as u8)
        .collect()
}

/// Estimate block motion from `from` to `to`.
///
/// Fails with `Interpolation` when the frames differ in size or are empty.
pub fn estimate_flow(from: &Frame, to: &Frame, block_size: u32, radius: u32) -> Result<FlowField> {
    if from.dimensions() != to.dimensions() {
        return Err(NarratorError::Interpolation {
            message: format!(
                "frame size changed from {:?} to {:?}",
                from.dimensions(),
                to.dimensions()
            ),
        });
    }
    let (width, height) = from.dimensions();
    if width == 0 || height == 0 || block_size == 0 {
        return Err(NarratorError::Interpolation {
            message: "cannot estimate flow on an empty frame".to_string(),
        });
    }

    let a = luma(from);
    let b = luma(to);
    let cols = width.div_ceil(block_size);
    let rows = height.div_ceil(block_size);
    let radius = radius as i32;
    let (w, h) = (width as i32, height as i32);

    let mut vectors = Vec::with_capacity((cols * rows) as usize);
    for row in 0..rows {
        for col in 0..cols {
            let x0 = (col * block_size) as i32;
            let y0 = (row * block_size) as i32;
            let x1 = (x0 + block_size as i32).min(w);
            let y1 = (y0 + block_size as i32).min(h);

            let sad = |dx: i32, dy: i32| -> u64 {
                let mut sum = 0u64;
                for y in (y0..y1).step_by(2) {
                    for x in (x0..x1).step_by(2) {
                        let pa = a[(y * w + x) as usize] as i32;
                        let pb = b[((y + dy) * w + (x + dx)) as usize] as i32;
                        sum += pa.abs_diff(pb) as u64;
                    }
                }
                sum
            };

            let mut best = (0, 0);
            let mut best_cost = sad(0, 0);
            let mut best_magnitude = 0;
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if x0 + dx < 0 || y0 + dy < 0 || x1 + dx > w || y1 + dy > h {
                        continue;
                    }
                    let cost = sad(dx, dy);
                    let magnitude = dx.abs() + dy.abs();
                    if cost < best_cost || (cost == best_cost && magnitude < best_magnitude) {
                        best = (dx, dy);
                        best_cost = cost;
                        best_magnitude = magnitude;
                    }
                }
            }
            vectors.push(best);
        }
    }

    Ok(FlowField {
        block_size,
        cols,
        rows,
        vectors,
    })
}

/// Synthesize the frame at fraction `t` between `from` and `to`.
pub fn synthesize_between(from: &Frame, to: &Frame, flow: &FlowField, t: f32) -> Frame {
    let (width, height) = from.dimensions();
    let max_x = width as f32 - 1.0;
    let max_y = height as f32 - 1.0;
    RgbImage::from_fn(width, height, |x, y| {
        let (vx, vy) = flow.vector_at(x, y);
        let (vx, vy) = (vx as f32, vy as f32);
        let ax = (x as f32 - t * vx).round().clamp(0.0, max_x) as u32;
        let ay = (y as f32 - t * vy).round().clamp(0.0, max_y) as u32;
        let bx = (x as f32 + (1.0 - t) * vx).round().clamp(0.0, max_x) as u32;
        let by = (y as f32 + (1.0 - t) * vy).round().clamp(0.0, max_y) as u32;
        let pa = from.get_pixel(ax, ay);
        let pb = to.get_pixel(bx, by);
        Rgb(std::array::from_fn(|c| {
            ((1.0 - t) * pa[c] as f32 + t * pb[c] as f32).round() as u8
        }))
    })
}

/// Motion interpolator with fixed block-matching parameters.
#[derive(Debug)]
pub struct MotionInterpolator {
    block_size: u32,
    search_radius: u32,
    flows_computed: AtomicUsize,
}

impl Default for MotionInterpolator {
    fn default() -> Self {
        Self::new(16, 4)
    }
}

impl MotionInterpolator {
    pub fn new(block_size: u32, search_radius: u32) -> Self {
        Self {
            block_size: block_size.max(1),
            search_radius,
            flows_computed: AtomicUsize::new(0),
        }
    }

    /// Number of flow fields estimated so far.
    pub fn flows_computed(&self) -> usize {
        self.flows_computed.load(Ordering::Relaxed)
    }

    /// Frames emitted for one consecutive pair: the intermediates followed by
    /// `next` itself.
    ///
    /// A pair whose flow cannot be estimated yields only `next`.
    pub fn interpolate_pair(&self, prev: &Frame, next: &Frame, factor: u32) -> Vec<Frame> {
        if factor <= 1 {
            return vec![next.clone()];
        }
        self.flows_computed.fetch_add(1, Ordering::Relaxed);
        let flow = match estimate_flow(prev, next, self.block_size, self.search_radius) {
            Ok(flow) => flow,
            Err(e) => {
                tracing::warn!(error = %e, "skipping interpolation for frame pair");
                return vec![next.clone()];
            }
        };
        let mut out = Vec::with_capacity(factor as usize);
        for j in 1..factor {
            let t = j as f32 / factor as f32;
            out.push(synthesize_between(prev, next, &flow, t));
        }
        out.push(next.clone());
        out
    }

    /// Raise the frame rate of `frames` by `factor`.
    ///
    /// Produces `factor × (N − 1) + 1` frames for `N ≥ 1` inputs when every
    /// pair succeeds. `factor ≤ 1` and single-frame input return the input.
    pub fn interpolate(&self, frames: Vec<Frame>, factor: u32) -> Interpolated {
        let fps_multiplier = factor.max(1);
        if factor <= 1 || frames.len() < 2 {
            return Interpolated {
                frames,
                fps_multiplier,
            };
        }

        let mut out = Vec::with_capacity(factor as usize * (frames.len() - 1) + 1);
        out.push(frames[0].clone());
        for pair in frames.windows(2) {
            out.extend(self.interpolate_pair(&pair[0], &pair[1], factor));
        }
        Interpolated {
            frames: out,
            fps_multiplier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, value: u8) -> Frame {
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
    }

    /// Black frame with a white 16×16 square whose top-left corner is at `x`.
    fn square_at(x: u32) -> Frame {
        let mut frame = solid(64, 64, 0);
        for yy in 16..32 {
            for xx in x..x + 16 {
                frame.put_pixel(xx, yy, Rgb([255, 255, 255]));
            }
        }
        frame
    }

    #[test]
    fn test_factor_one_is_identity_without_flow() {
        let interpolator = MotionInterpolator::default();
        let frames = vec![solid(8, 8, 0), solid(8, 8, 100), solid(8, 8, 200)];

        let result = interpolator.interpolate(frames.clone(), 1);

        assert_eq!(result.frames, frames);
        assert_eq!(result.fps_multiplier, 1);
        assert_eq!(interpolator.flows_computed(), 0);
    }

    #[test]
    fn test_single_frame_is_returned_unchanged() {
        let interpolator = MotionInterpolator::default();
        for factor in [1, 2, 5] {
            let frames = vec![solid(8, 8, 42)];
            let result = interpolator.interpolate(frames.clone(), factor);
            assert_eq!(result.frames, frames);
        }
        assert_eq!(interpolator.flows_computed(), 0);
    }

    #[test]
    fn test_output_length_and_boundaries() {
        let interpolator = MotionInterpolator::default();
        let frames = vec![solid(16, 16, 0), solid(16, 16, 90), solid(16, 16, 180)];

        let result = interpolator.interpolate(frames.clone(), 3);

        assert_eq!(result.frames.len(), 3 * 2 + 1);
        assert_eq!(result.fps_multiplier, 3);
        // Originals sit at every third position, never duplicated.
        assert_eq!(result.frames[0], frames[0]);
        assert_eq!(result.frames[3], frames[1]);
        assert_eq!(result.frames[6], frames[2]);
        assert_eq!(result.frames[1].get_pixel(0, 0)[0], 30);
        assert_eq!(result.frames[2].get_pixel(0, 0)[0], 60);
    }

    #[test]
    fn test_static_scene_blends_linearly() {
        let interpolator = MotionInterpolator::default();
        let result = interpolator.interpolate(vec![solid(32, 32, 0), solid(32, 32, 255)], 2);

        assert_eq!(result.frames.len(), 3);
        assert_eq!(result.frames[1].get_pixel(10, 10), &Rgb([128, 128, 128]));
    }

    #[test]
    fn test_flow_tracks_moving_square() {
        let flow = estimate_flow(&square_at(16), &square_at(20), 16, 4).unwrap();

        assert_eq!(flow.vector_at(20, 20), (4, 0));
        assert!(!flow.is_static());
    }

    #[test]
    fn test_midpoint_frame_moves_square_halfway() {
        let interpolator = MotionInterpolator::default();
        let result = interpolator.interpolate(vec![square_at(16), square_at(20)], 2);
        let mid = &result.frames[1];

        // The square sits at x = 18..34 halfway through the motion.
        assert_eq!(mid.get_pixel(17, 24), &Rgb([0, 0, 0]));
        assert_eq!(mid.get_pixel(18, 24), &Rgb([255, 255, 255]));
        assert_eq!(mid.get_pixel(25, 24), &Rgb([255, 255, 255]));
        assert_eq!(mid.get_pixel(33, 24), &Rgb([255, 255, 255]));
        assert_eq!(mid.get_pixel(35, 24), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_size_mismatch_falls_back_to_later_frame() {
        let interpolator = MotionInterpolator::default();
        let frames = vec![solid(8, 8, 0), solid(16, 16, 50), solid(16, 16, 150)];

        let result = interpolator.interpolate(frames.clone(), 2);

        // First pair fails: only the later frame. Second pair: one intermediate.
        assert_eq!(result.frames.len(), 1 + 1 + 2);
        assert_eq!(result.frames[1], frames[1]);
        assert_eq!(result.frames[2].get_pixel(0, 0)[0], 100);
        assert_eq!(result.frames[3], frames[2]);
    }

    #[test]
    fn test_estimate_flow_rejects_mismatched_frames() {
        let result = estimate_flow(&solid(8, 8, 0), &solid(4, 4, 0), 16, 4);
        assert!(matches!(result, Err(NarratorError::Interpolation { .. })));
    }

    #[test]
    fn test_flow_covers_partial_edge_blocks() {
        let flow = estimate_flow(&solid(40, 20, 0), &solid(40, 20, 0), 16, 2).unwrap();
        assert_eq!(flow.len(), 3 * 2);
        assert!(flow.is_static());
        assert_eq!(flow.vector_at(39, 19), (0, 0));
    }
}
