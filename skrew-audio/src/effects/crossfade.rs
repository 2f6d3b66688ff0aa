//! Linear crossfades applied wherever a transformed segment is written back

/// Longest fade, in samples
pub const MAX_CROSSFADE: usize = 1024;

/// Fade length for a segment: at most [`MAX_CROSSFADE`], at most a quarter of it
pub fn fade_length(segment_len: usize) -> usize {
    MAX_CROSSFADE.min(segment_len / 4)
}

/// `i`-th point of an inclusive 0..1 ramp of `n` points
#[inline]
fn ramp(i: usize, n: usize) -> f32 {
    if n <= 1 {
        0.0
    } else {
        i as f32 / (n - 1) as f32
    }
}

/// Fade in the head and fade out the tail of `segment`
///
/// The first and last samples end up at exactly zero.
pub fn fade_edges(segment: &mut [f32]) {
    let len = segment.len();
    let n = fade_length(len);
    for i in 0..n {
        let gain = ramp(i, n);
        segment[i] *= gain;
        segment[len - 1 - i] *= gain;
    }
}

/// Concatenate `pieces`, fading out each tail and fading in the following head
///
/// Each boundary uses the shorter of the two pieces' fade lengths. The outer
/// edges are left alone.
pub fn crossfade_join(pieces: &[Vec<f32>]) -> Vec<f32> {
    let total = pieces.iter().map(Vec::len).sum();
    let mut joined = Vec::with_capacity(total);

    for (idx, piece) in pieces.iter().enumerate() {
        let start = joined.len();
        joined.extend_from_slice(piece);

        if idx == 0 {
            continue;
        }
        let prev_len = pieces[idx - 1].len();
        let n = fade_length(prev_len).min(fade_length(piece.len()));
        for i in 0..n {
            let gain = ramp(i, n);
            joined[start + i] *= gain;
            joined[start - 1 - i] *= gain;
        }
    }

    joined
}

/// Copy `segment` into `out[start..end]`, truncated to the window
///
/// The audio just outside the written region is faded down to zero at the
/// boundary, meeting the segment's own faded edges. Returns the number of
/// samples written; the rest of the window is left to that fade.
pub fn write_window(out: &mut [f32], start: usize, end: usize, segment: &[f32]) -> usize {
    let end = end.min(out.len());
    if start >= end {
        return 0;
    }
    let count = segment.len().min(end - start);
    out[start..start + count].copy_from_slice(&segment[..count]);

    let written_end = start + count;
    let n = fade_length(count);
    for i in 0..n.min(start) {
        out[start - 1 - i] *= ramp(i, n);
    }
    for i in 0..n.min(out.len() - written_end) {
        out[written_end + i] *= ramp(i, n);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_length_bounds() {
        assert_eq!(fade_length(100), 25);
        assert_eq!(fade_length(4096), 1024);
        assert_eq!(fade_length(100_000), MAX_CROSSFADE);
        assert_eq!(fade_length(3), 0);
    }

    #[test]
    fn test_fade_edges_zeroes_boundaries() {
        let mut segment = vec![1.0f32; 400];
        fade_edges(&mut segment);
        assert_eq!(segment[0], 0.0);
        assert_eq!(segment[399], 0.0);
        assert_eq!(segment[200], 1.0);
        // Ramp is monotonic over the 100-sample fade
        for i in 1..100 {
            assert!(segment[i] >= segment[i - 1]);
        }
        assert!((segment[99] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_short_segment_untouched() {
        let mut segment = vec![0.5f32; 3];
        fade_edges(&mut segment);
        assert_eq!(segment, vec![0.5; 3]);
    }

    #[test]
    fn test_crossfade_join() {
        let pieces = vec![vec![1.0f32; 40], vec![1.0f32; 80]];
        let joined = crossfade_join(&pieces);
        assert_eq!(joined.len(), 120);
        // Boundary fade is min(10, 20) = 10 samples each side
        assert_eq!(joined[39], 0.0);
        assert_eq!(joined[40], 0.0);
        assert_eq!(joined[0], 1.0);
        assert_eq!(joined[119], 1.0);
        assert_eq!(joined[29], 1.0);
    }

    #[test]
    fn test_write_window_truncates() {
        let mut out = vec![0.0f32; 10];
        assert_eq!(write_window(&mut out, 2, 5, &[1.0; 8]), 3);
        assert_eq!(out, vec![0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(write_window(&mut out, 8, 20, &[2.0]), 1);
        assert_eq!(out[8], 2.0);
        assert_eq!(write_window(&mut out, 5, 5, &[3.0]), 0);
    }

    #[test]
    fn test_write_window_meets_untouched_audio() {
        let mut out = vec![0.8f32; 1000];
        let mut segment = vec![-0.6f32; 400];
        fade_edges(&mut segment);
        assert_eq!(write_window(&mut out, 300, 700, &segment), 400);

        // Both sides of each boundary sit at zero
        assert_eq!(out[299], 0.0);
        assert_eq!(out[300], 0.0);
        assert_eq!(out[699], 0.0);
        assert_eq!(out[700], 0.0);
        // No step anywhere is larger than one fade increment
        let step = 0.8 / 99.0 + 1e-6;
        assert!(out.windows(2).all(|p| (p[1] - p[0]).abs() <= step));
        // Audio beyond the fade keeps its level
        assert_eq!(out[100], 0.8);
        assert_eq!(out[900], 0.8);
    }
}
