//! Periodic beat-window activation shared by the beat-synchronized effects

use skrew_analysis::BeatGrid;
use skrew_input::BeatWindow;

/// One activated window: `length` beats starting at `beat`, as samples `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub beat: usize,
    pub start: usize,
    pub end: usize,
}

impl Window {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Windows visited at `stride`, keeping every `repeat`-th one
///
/// Window `i` (a beat index) is active when `(i / stride) % repeat == 0`.
/// Only windows whose closing beat lies on the grid are returned, so every
/// window is bounded by two detected beats.
pub fn active_windows(grid: &BeatGrid, window: &BeatWindow) -> Vec<Window> {
    let stride = window.stride.max(1);
    let repeat = window.repeat.max(1);
    let length = window.length.max(1);
    let last = grid.len().saturating_sub(length);

    (0..last)
        .step_by(stride)
        .filter(|i| (i / stride) % repeat == 0)
        .filter_map(|beat| {
            let (start, end) = grid.span(beat, length)?;
            Some(Window { beat, start, end })
        })
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(beats: usize, period: usize) -> BeatGrid {
        BeatGrid::new((0..beats).map(|b| b * period).collect(), 120.0, 1.0)
    }

    #[test]
    fn test_every_window_with_unit_repeat() {
        let windows = active_windows(
            &grid(10, 100),
            &BeatWindow {
                stride: 2,
                length: 2,
                repeat: 1,
            },
        );
        let beats: Vec<usize> = windows.iter().map(|w| w.beat).collect();
        assert_eq!(beats, vec![0, 2, 4, 6]);
        assert_eq!(windows[1], Window { beat: 2, start: 200, end: 400 });
    }

    #[test]
    fn test_periodic_activation() {
        let windows = active_windows(
            &grid(20, 100),
            &BeatWindow {
                stride: 2,
                length: 2,
                repeat: 3,
            },
        );
        // i in 0,2,4,...,16; i/2 in 0..=8; active where (i/2) % 3 == 0
        let beats: Vec<usize> = windows.iter().map(|w| w.beat).collect();
        assert_eq!(beats, vec![0, 6, 12]);
    }

    #[test]
    fn test_window_longer_than_grid() {
        let windows = active_windows(
            &grid(4, 100),
            &BeatWindow {
                stride: 1,
                length: 8,
                repeat: 1,
            },
        );
        assert!(windows.is_empty());
    }

    #[test]
    fn test_windows_stay_on_grid() {
        let g = grid(17, 441);
        for w in active_windows(
            &g,
            &BeatWindow {
                stride: 1,
                length: 4,
                repeat: 1,
            },
        ) {
            assert_eq!(w.len(), 4 * 441);
            assert!(w.end <= *g.frames().last().unwrap_or(&0));
        }
    }
}
