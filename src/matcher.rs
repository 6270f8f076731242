// src/matcher.rs
//
// Template matching over grayscale frames.
//
// Response surface is the zero-mean normalized cross-correlation
// (same quantity as OpenCV's TM_CCOEFF_NORMED). The numerator comes from
// one FFT cross-correlation per frame/template pair; window statistics
// come from integral images. No OpenCV dependency.
//
// Suppression is greedy and coarse: once a match is kept,
// every remaining candidate whose box shares any positive area with it
// is dropped. There is no IoU threshold.

use crate::error::PerceptionError;
use crate::types::{ColorMode, Detection, Frame};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::borrow::Cow;
use tracing::{debug, warn};

/// Window variance below this is treated as a flat patch (response 0).
const FLAT_EPSILON: f64 = 1e-6;

/// All non-overlapping matches of `template` in `frame` scoring at least
/// `threshold`, highest confidence first.
pub fn detect(frame: &Frame, template: &Frame, threshold: f32) -> Vec<Detection> {
    if frame.is_empty() || template.is_empty() {
        return Vec::new();
    }
    if template.width > frame.width || template.height > frame.height {
        return Vec::new();
    }

    let frame = as_gray(frame);
    let template = as_gray(template);

    let surface = match response_surface(&frame, &template) {
        Ok(s) => s,
        Err(e) => {
            warn!(
                "{} (frame {}x{}, template {}x{})",
                e, frame.width, frame.height, template.width, template.height
            );
            return Vec::new();
        }
    };

    let rw = frame.width - template.width + 1;
    let mut candidates = Vec::new();
    for (idx, &score) in surface.iter().enumerate() {
        if score >= threshold {
            candidates.push(Detection {
                x: idx % rw,
                y: idx / rw,
                width: template.width,
                height: template.height,
                confidence: score.clamp(0.0, 1.0),
            });
        }
    }

    let n_candidates = candidates.len();
    let matches = suppress_overlapping(candidates);
    if n_candidates > 0 {
        debug!(
            "{} candidates above {:.2} → {} matches",
            n_candidates,
            threshold,
            matches.len()
        );
    }
    matches
}

/// Whether `template` appears anywhere in `frame` at `threshold`.
pub fn is_visible(frame: &Frame, template: &Frame, threshold: f32) -> bool {
    !detect(frame, template, threshold).is_empty()
}

/// Greedy any-overlap suppression. Output is sorted by descending confidence;
/// ties keep their input order.
pub fn suppress_overlapping(mut candidates: Vec<Detection>) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep = Vec::new();
    while !candidates.is_empty() {
        let current = candidates.remove(0);
        candidates.retain(|det| !current.overlaps(det));
        keep.push(current);
    }
    keep
}

fn as_gray(frame: &Frame) -> Cow<'_, Frame> {
    match frame.mode {
        ColorMode::Gray => Cow::Borrowed(frame),
        ColorMode::Rgb => Cow::Owned(frame.to_gray()),
    }
}

/// Correlation score for every valid top-left position, row-major,
/// `(W - tw + 1) x (H - th + 1)`.
pub fn response_surface(frame: &Frame, template: &Frame) -> Result<Vec<f32>, PerceptionError> {
    for (what, f) in [("frame", frame), ("template", template)] {
        if f.mode != ColorMode::Gray || f.data.len() != f.width * f.height {
            return Err(PerceptionError::DetectionBackend(format!(
                "{what} buffer is not a {}x{} grayscale image ({} bytes)",
                f.width,
                f.height,
                f.data.len()
            )));
        }
    }

    let (fw, fh) = (frame.width, frame.height);
    let (tw, th) = (template.width, template.height);
    if tw == 0 || th == 0 || tw > fw || th > fh {
        return Err(PerceptionError::DetectionBackend(format!(
            "template {tw}x{th} does not fit frame {fw}x{fh}"
        )));
    }

    let n = (tw * th) as f64;
    let t_mean = template.data.iter().map(|&p| p as f64).sum::<f64>() / n;
    let t_zero: Vec<f64> = template.data.iter().map(|&p| p as f64 - t_mean).collect();
    let t_energy: f64 = t_zero.iter().map(|v| v * v).sum();

    let (sum, sum_sq) = integral_images(frame);
    let stride = fw + 1;
    let window = |table: &[f64], x: usize, y: usize| -> f64 {
        table[(y + th) * stride + x + tw] - table[y * stride + x + tw] - table[(y + th) * stride + x]
            + table[y * stride + x]
    };

    let rw = fw - tw + 1;
    let rh = fh - th + 1;
    let mut out = vec![0.0f32; rw * rh];
    if t_energy <= FLAT_EPSILON {
        return Ok(out);
    }

    // Template is zero-mean, so the window mean drops out of the numerator
    let numerator = cross_correlate(frame, &t_zero, tw, th);

    for y in 0..rh {
        for x in 0..rw {
            let s = window(sum.as_slice(), x, y);
            let sq = window(sum_sq.as_slice(), x, y);
            let variance = sq - s * s / n;
            if variance <= FLAT_EPSILON {
                continue;
            }

            let score = numerator[y * rw + x] / (t_energy * variance).sqrt();
            if !score.is_finite() {
                return Err(PerceptionError::DetectionBackend(format!(
                    "non-finite correlation at ({x}, {y})"
                )));
            }
            out[y * rw + x] = score.clamp(-1.0, 1.0) as f32;
        }
    }

    Ok(out)
}

/// `sum(frame[y + j][x + i] * kernel[j][i])` for every valid top-left
/// `(x, y)`, row-major `(W - kw + 1) x (H - kh + 1)`.
///
/// Both inputs are zero-padded to a common FFT-friendly size. Valid
/// offsets never reach past the frame, so the circular wrap is harmless.
fn cross_correlate(frame: &Frame, kernel: &[f64], kw: usize, kh: usize) -> Vec<f64> {
    let (fw, fh) = (frame.width, frame.height);
    let (pw, ph) = (fft_len(fw), fft_len(fh));

    let mut planner = FftPlanner::<f64>::new();
    let row_fwd = planner.plan_fft_forward(pw);
    let col_fwd = planner.plan_fft_forward(ph);
    let row_inv = planner.plan_fft_inverse(pw);
    let col_inv = planner.plan_fft_inverse(ph);

    let zero = Complex::new(0.0, 0.0);
    let mut image = vec![zero; pw * ph];
    for y in 0..fh {
        for x in 0..fw {
            image[y * pw + x].re = frame.data[y * fw + x] as f64;
        }
    }
    let mut spectrum = vec![zero; pw * ph];
    for j in 0..kh {
        for i in 0..kw {
            spectrum[j * pw + i].re = kernel[j * kw + i];
        }
    }

    fft_2d(&mut image, pw, ph, row_fwd.as_ref(), col_fwd.as_ref());
    fft_2d(&mut spectrum, pw, ph, row_fwd.as_ref(), col_fwd.as_ref());
    for (a, b) in image.iter_mut().zip(&spectrum) {
        *a *= b.conj();
    }
    fft_2d(&mut image, pw, ph, row_inv.as_ref(), col_inv.as_ref());

    let scale = 1.0 / (pw * ph) as f64;
    let rw = fw - kw + 1;
    let rh = fh - kh + 1;
    let mut out = Vec::with_capacity(rw * rh);
    for y in 0..rh {
        out.extend(image[y * pw..y * pw + rw].iter().map(|c| c.re * scale));
    }
    out
}

/// In-place 2-D transform of a row-major `w x h` buffer.
fn fft_2d(
    data: &mut Vec<Complex<f64>>,
    w: usize,
    h: usize,
    rows: &dyn Fft<f64>,
    cols: &dyn Fft<f64>,
) {
    rows.process(data.as_mut_slice());
    let mut columns = transpose(data, w, h);
    cols.process(columns.as_mut_slice());
    *data = transpose(&columns, h, w);
}

fn transpose(src: &[Complex<f64>], w: usize, h: usize) -> Vec<Complex<f64>> {
    let mut out = vec![Complex::new(0.0, 0.0); w * h];
    for y in 0..h {
        for x in 0..w {
            out[x * h + y] = src[y * w + x];
        }
    }
    out
}

/// Smallest `2^a * 3^b * 5^c` that is at least `n`.
fn fft_len(n: usize) -> usize {
    let mut len = n.max(1);
    loop {
        let mut m = len;
        for p in [2, 3, 5] {
            while m % p == 0 {
                m /= p;
            }
        }
        if m == 1 {
            return len;
        }
        len += 1;
    }
}

/// Summed-area tables of pixel values and squared pixel values,
/// each `(W + 1) x (H + 1)` with a zero first row and column.
fn integral_images(frame: &Frame) -> (Vec<f64>, Vec<f64>) {
    let (w, h) = (frame.width, frame.height);
    let stride = w + 1;
    let mut sum = vec![0.0f64; stride * (h + 1)];
    let mut sum_sq = vec![0.0f64; stride * (h + 1)];

    for y in 0..h {
        let mut row_sum = 0.0;
        let mut row_sq = 0.0;
        for x in 0..w {
            let p = frame.data[y * w + x] as f64;
            row_sum += p;
            row_sq += p * p;
            sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_sum;
            sum_sq[(y + 1) * stride + x + 1] = sum_sq[y * stride + x + 1] + row_sq;
        }
    }

    (sum, sum_sq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{blank, paste, pattern};

    fn det(x: usize, y: usize, confidence: f32) -> Detection {
        Detection {
            x,
            y,
            width: 10,
            height: 10,
            confidence,
        }
    }

    #[test]
    fn test_exact_match_scores_one() {
        let template = pattern(8, 8, 7);
        let mut frame = blank(40, 30, 20);
        paste(&mut frame, &template, 12, 9);

        let matches = detect(&frame, &template, 0.75);

        assert_eq!(matches.len(), 1);
        assert_eq!((matches[0].x, matches[0].y), (12, 9));
        assert_eq!((matches[0].width, matches[0].height), (8, 8));
        assert!(matches[0].confidence > 0.999);
        assert!(matches[0].confidence <= 1.0);
    }

    #[test]
    fn test_brightness_shift_still_matches() {
        let template = pattern(8, 8, 7);
        let mut shifted = template.clone();
        for p in shifted.data.iter_mut() {
            *p = p.saturating_add(10).min(250);
        }
        let mut frame = blank(30, 30, 0);
        paste(&mut frame, &shifted, 3, 4);

        let matches = detect(&frame, &template, 0.9);
        assert_eq!(matches.len(), 1);
        assert_eq!((matches[0].x, matches[0].y), (3, 4));
    }

    #[test]
    fn test_two_separate_copies_both_found() {
        let template = pattern(6, 6, 3);
        let mut frame = blank(50, 20, 90);
        paste(&mut frame, &template, 2, 2);
        paste(&mut frame, &template, 30, 10);

        let matches = detect(&frame, &template, 0.8);
        let mut positions: Vec<(usize, usize)> = matches.iter().map(|m| (m.x, m.y)).collect();
        positions.sort();

        assert_eq!(positions, vec![(2, 2), (30, 10)]);
    }

    #[test]
    fn test_template_larger_than_frame_is_empty() {
        let frame = pattern(10, 10, 1);
        let template = pattern(12, 4, 2);
        assert!(detect(&frame, &template, 0.5).is_empty());
    }

    #[test]
    fn test_empty_inputs_are_empty() {
        let frame = pattern(10, 10, 1);
        let empty = blank(0, 0, 0);
        assert!(detect(&empty, &frame, 0.5).is_empty());
        assert!(detect(&frame, &empty, 0.5).is_empty());
    }

    #[test]
    fn test_flat_frame_has_no_matches() {
        let frame = blank(20, 20, 128);
        let template = pattern(5, 5, 9);
        assert!(detect(&frame, &template, 0.1).is_empty());
    }

    #[test]
    fn test_corrupt_buffer_yields_no_matches() {
        let mut frame = pattern(20, 20, 1);
        frame.data.truncate(100);
        let template = pattern(5, 5, 2);

        assert!(response_surface(&frame, &template).is_err());
        assert!(detect(&frame, &template, 0.5).is_empty());
    }

    #[test]
    fn test_color_frame_is_converted() {
        let template = pattern(6, 6, 4);
        let mut gray = blank(20, 20, 50);
        paste(&mut gray, &template, 5, 5);
        let rgb_data: Vec<u8> = gray.data.iter().flat_map(|&p| [p, p, p]).collect();
        let rgb = Frame::rgb(rgb_data, 20, 20).unwrap();

        let matches = detect(&rgb, &template, 0.95);
        assert_eq!(matches.len(), 1);
        assert_eq!((matches[0].x, matches[0].y), (5, 5));
    }

    #[test]
    fn test_fft_correlation_matches_direct_sum() {
        let frame = pattern(23, 17, 5);
        let kernel: Vec<f64> = pattern(5, 4, 6)
            .data
            .iter()
            .map(|&p| p as f64 - 128.0)
            .collect();

        let fast = cross_correlate(&frame, &kernel, 5, 4);

        let (rw, rh) = (23 - 5 + 1, 17 - 4 + 1);
        assert_eq!(fast.len(), rw * rh);
        for y in 0..rh {
            for x in 0..rw {
                let mut direct = 0.0;
                for j in 0..4 {
                    for i in 0..5 {
                        direct += frame.data[(y + j) * 23 + x + i] as f64 * kernel[j * 5 + i];
                    }
                }
                assert!(
                    (fast[y * rw + x] - direct).abs() < 1e-6 * direct.abs().max(1.0),
                    "({x}, {y}): {} vs {direct}",
                    fast[y * rw + x]
                );
            }
        }
    }

    #[test]
    fn test_fft_len_is_five_smooth() {
        assert_eq!(fft_len(1), 1);
        assert_eq!(fft_len(7), 8);
        assert_eq!(fft_len(587), 600);
        assert_eq!(fft_len(1045), 1080);
        assert_eq!(fft_len(1080), 1080);
    }

    #[test]
    #[ignore = "timing check, run with --release --ignored"]
    fn test_full_region_frame_is_fast() {
        let frame = pattern(1045, 587, 1);
        let template = pattern(60, 60, 2);

        let started = std::time::Instant::now();
        let _ = detect(&frame, &template, 0.75);
        let elapsed = started.elapsed();

        assert!(elapsed.as_millis() < 300, "took {:?}", elapsed);
    }

    #[test]
    fn test_any_overlap_suppresses_lower_confidence() {
        let strong = det(0, 0, 0.9);
        // 1x1 pixel of shared area
        let weak = det(9, 9, 0.6);

        let kept = suppress_overlapping(vec![weak, strong]);

        assert_eq!(kept, vec![strong]);
    }

    #[test]
    fn test_disjoint_candidates_sorted_by_confidence() {
        let a = det(0, 0, 0.7);
        let b = det(20, 0, 0.95);
        let c = det(40, 0, 0.8);

        let kept = suppress_overlapping(vec![a, b, c]);

        assert_eq!(kept, vec![b, c, a]);
    }

    #[test]
    fn test_suppression_is_not_transitive() {
        // b overlaps a and c, but a and c are disjoint: a suppresses b, c survives
        let a = det(0, 0, 0.9);
        let b = det(8, 0, 0.85);
        let c = det(16, 0, 0.8);

        let kept = suppress_overlapping(vec![c, b, a]);

        assert_eq!(kept, vec![a, c]);
    }
}
