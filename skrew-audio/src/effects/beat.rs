//! Beat-window rearrangements: loop, reverse, stutter, chop, mash
//!
//! Every function reads windows from `input` and writes into a copy of it,
//! so windows never observe each other's output. Written segments always
//! pass through [`fade_edges`] before landing, and [`write_window`] fades
//! the neighbouring audio to meet them.

use super::crossfade::{crossfade_join, fade_edges, write_window};
use super::windows::Window;
use rand::seq::SliceRandom;
use rand::Rng;
use skrew_analysis::BeatGrid;

/// Chunk order used by chop, taken modulo the chunk count
const CHOP_PATTERN: [usize; 8] = [1, 2, 2, 1, 3, 3, 2, 1];

/// Lock each window in place with faded edges
pub fn lock(input: &[f32], windows: &[Window]) -> Vec<f32> {
    let mut out = input.to_vec();
    for w in windows {
        let mut segment = input[w.start..w.end].to_vec();
        fade_edges(&mut segment);
        write_window(&mut out, w.start, w.end, &segment);
    }
    out
}

pub fn reverse(input: &[f32], windows: &[Window]) -> Vec<f32> {
    let mut out = input.to_vec();
    for w in windows {
        let mut segment: Vec<f32> = input[w.start..w.end].iter().rev().copied().collect();
        fade_edges(&mut segment);
        write_window(&mut out, w.start, w.end, &segment);
    }
    out
}

/// Repeat the window's first beat `count` times with decaying repetitions
///
/// Each repetition is shaped by a squared linear fade-out. Any part of the
/// window beyond `count` beats keeps the original audio.
pub fn stutter(input: &[f32], grid: &BeatGrid, windows: &[Window], count: usize) -> Vec<f32> {
    let mut out = input.to_vec();
    for w in windows {
        let Some((start, end)) = grid.span(w.beat, 1) else {
            continue;
        };
        let beat = &input[start..end];
        let n = beat.len();
        if n == 0 {
            continue;
        }

        // Repetitions past the window end would be truncated anyway
        let reps = count.min(w.len().div_ceil(n));
        let mut tiled = Vec::with_capacity(n.saturating_mul(reps));
        for _ in 0..reps {
            tiled.extend(beat.iter().enumerate().map(|(i, &s)| {
                let env = if n > 1 {
                    1.0 - i as f32 / (n - 1) as f32
                } else {
                    1.0
                };
                s * env * env
            }));
        }
        tiled.truncate(w.len());
        fade_edges(&mut tiled);
        write_window(&mut out, w.start, w.end, &tiled);
    }
    out
}

/// Rearrange `chunk_beats`-sized chunks of each window under [`CHOP_PATTERN`]
pub fn chop(input: &[f32], grid: &BeatGrid, windows: &[Window], chunk_beats: usize) -> Vec<f32> {
    let mut out = input.to_vec();
    for w in windows {
        let length = grid
            .frames()
            .iter()
            .filter(|&&f| f >= w.start && f < w.end)
            .count();
        let chunk_beats = chunk_beats.clamp(1, length.max(1));
        let chunk_count = (length / chunk_beats).max(1);

        let chunks: Vec<&[f32]> = (0..chunk_count)
            .filter_map(|c| grid.span(w.beat + c * chunk_beats, chunk_beats))
            .map(|(start, end)| &input[start..end])
            .collect();
        if chunks.is_empty() {
            continue;
        }

        let ordered: Vec<Vec<f32>> = CHOP_PATTERN
            .iter()
            .map(|&idx| chunks[idx % chunks.len()].to_vec())
            .collect();
        let mut joined = crossfade_join(&ordered);
        joined.truncate(w.len());
        fade_edges(&mut joined);
        write_window(&mut out, w.start, w.end, &joined);
    }
    out
}

/// Shuffle `parts` equal sub-parts of each window
///
/// Samples left over when the window does not divide evenly keep the
/// original audio.
pub fn mash<R: Rng + ?Sized>(
    input: &[f32],
    windows: &[Window],
    parts: usize,
    rng: &mut R,
) -> Vec<f32> {
    let mut out = input.to_vec();
    let parts = parts.max(1);
    for w in windows {
        let part_len = w.len() / parts;
        if part_len == 0 {
            continue;
        }

        let mut pieces: Vec<Vec<f32>> = input[w.start..w.start + part_len * parts]
            .chunks_exact(part_len)
            .map(<[f32]>::to_vec)
            .collect();
        pieces.shuffle(rng);

        let mut joined = crossfade_join(&pieces);
        fade_edges(&mut joined);
        write_window(&mut out, w.start, w.end, &joined);
    }
    out
}
