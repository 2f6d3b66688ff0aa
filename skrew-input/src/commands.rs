//! Operation vocabulary for the instruction language

use std::fmt;

/// One-letter commands outside the instruction language (`q;`, `s;`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Quit,
    Save,
    TogglePlayback,
    Undo,
    Redo,
    Load,
    Help,
}

impl Control {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'q' => Some(Control::Quit),
            's' => Some(Control::Save),
            'p' => Some(Control::TogglePlayback),
            'u' => Some(Control::Undo),
            'r' => Some(Control::Redo),
            'l' => Some(Control::Load),
            'h' => Some(Control::Help),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Control::Quit => "quit",
            Control::Save => "save",
            Control::TogglePlayback => "play/pause",
            Control::Undo => "undo",
            Control::Redo => "redo",
            Control::Load => "load",
            Control::Help => "help",
        }
    }
}

/// Operation kind, one per instruction token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Pitch,
    TimeStretch,
    ResampleTime,
    BpmMatch,
    Loop,
    Reverse,
    Chop,
    Stutter,
    Echo,
    Mash,
    Mute,
    TriggerGate,
    SpectralGate,
    PercussiveExtract,
    CopySegment,
    Revert,
    Special(Control),
    /// Token outside the vocabulary, kept so it can be reported
    Unknown(String),
}

/// Accepted parameter counts, inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: usize,
}

impl Arity {
    const fn exactly(n: usize) -> Self {
        Self { min: n, max: n }
    }

    pub fn accepts(&self, count: usize) -> bool {
        (self.min..=self.max).contains(&count)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

impl OperationKind {
    pub fn from_token(token: &str) -> Self {
        match token {
            "p" => OperationKind::Pitch,
            "t" => OperationKind::TimeStretch,
            "rt" | "a" => OperationKind::ResampleTime,
            "bpm" => OperationKind::BpmMatch,
            "loop" => OperationKind::Loop,
            "rev" => OperationKind::Reverse,
            "chop" => OperationKind::Chop,
            "stut" => OperationKind::Stutter,
            "echo" => OperationKind::Echo,
            "mash" => OperationKind::Mash,
            "mute" => OperationKind::Mute,
            "trig" => OperationKind::TriggerGate,
            "n" => OperationKind::SpectralGate,
            "perc" => OperationKind::PercussiveExtract,
            "copy" => OperationKind::CopySegment,
            "revert" => OperationKind::Revert,
            "help" => OperationKind::Special(Control::Help),
            other => OperationKind::Unknown(other.to_string()),
        }
    }

    /// Canonical token
    pub fn token(&self) -> &str {
        match self {
            OperationKind::Pitch => "p",
            OperationKind::TimeStretch => "t",
            OperationKind::ResampleTime => "rt",
            OperationKind::BpmMatch => "bpm",
            OperationKind::Loop => "loop",
            OperationKind::Reverse => "rev",
            OperationKind::Chop => "chop",
            OperationKind::Stutter => "stut",
            OperationKind::Echo => "echo",
            OperationKind::Mash => "mash",
            OperationKind::Mute => "mute",
            OperationKind::TriggerGate => "trig",
            OperationKind::SpectralGate => "n",
            OperationKind::PercussiveExtract => "perc",
            OperationKind::CopySegment => "copy",
            OperationKind::Revert => "revert",
            OperationKind::Special(Control::Help) => "help",
            OperationKind::Special(control) => control.display_name(),
            OperationKind::Unknown(token) => token,
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            OperationKind::Pitch
            | OperationKind::TimeStretch
            | OperationKind::ResampleTime
            | OperationKind::BpmMatch
            | OperationKind::Mute
            | OperationKind::TriggerGate
            | OperationKind::SpectralGate
            | OperationKind::Revert => Arity::exactly(1),
            OperationKind::Loop | OperationKind::Reverse | OperationKind::Echo => {
                Arity::exactly(3)
            }
            // Leading <beats> is optional
            OperationKind::Chop | OperationKind::Stutter | OperationKind::Mash => {
                Arity { min: 3, max: 4 }
            }
            OperationKind::CopySegment => Arity::exactly(2),
            OperationKind::PercussiveExtract
            | OperationKind::Special(_)
            | OperationKind::Unknown(_) => Arity::exactly(0),
        }
    }
}

/// A raw clause value: a number, or the text that failed to parse as one
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Number(f64),
    Invalid(String),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Number(v) => write!(f, "{}", v),
            Arg::Invalid(text) => f.write_str(text),
        }
    }
}

/// One parsed clause: a kind plus its values, not yet validated
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub args: Vec<Arg>,
}

impl Operation {
    pub fn new(kind: OperationKind, args: Vec<Arg>) -> Self {
        Self { kind, args }
    }

    /// Shorthand for an operation with numeric values
    pub fn with_values(kind: OperationKind, values: &[f64]) -> Self {
        Self::new(kind, values.iter().map(|&v| Arg::Number(v)).collect())
    }

    pub fn token(&self) -> &str {
        self.kind.token()
    }

    /// Token and values without separators, e.g. `loop2_8_4`
    pub fn compact(&self) -> String {
        let values: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
        format!("{}{}", self.token(), values.join("_"))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())?;
        for arg in &self.args {
            write!(f, ":{}", arg)?;
        }
        Ok(())
    }
}

/// Beat-window walk shared by the beat-synchronized effects
///
/// Windows start every `stride` beats and span `length` beats; window `i`
/// (a beat index) is active when `(i / stride) % repeat == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatWindow {
    pub stride: usize,
    pub length: usize,
    pub repeat: usize,
}

/// A validated audio transformation with typed parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Pitch { semitones: f64 },
    TimeStretch { rate: f64 },
    ResampleTime { rate: f64 },
    BpmMatch { target_bpm: f64 },
    Loop(BeatWindow),
    Reverse(BeatWindow),
    Chop { chunk_beats: usize, window: BeatWindow },
    Stutter { count: usize, window: BeatWindow },
    Echo { delay_secs: f64, count: usize, decay: f64 },
    Mash { parts: usize, window: BeatWindow },
    Mute { threshold_db: f64 },
    TriggerGate { sensitivity: f64 },
    SpectralGate { threshold_db: f64 },
    PercussiveExtract,
    CopySegment { start: usize, count: usize },
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Pitch { .. } => "pitch",
            Effect::TimeStretch { .. } => "time_stretch",
            Effect::ResampleTime { .. } => "resample_time",
            Effect::BpmMatch { .. } => "bpm_match",
            Effect::Loop(_) => "loop",
            Effect::Reverse(_) => "reverse",
            Effect::Chop { .. } => "chop",
            Effect::Stutter { .. } => "stutter",
            Effect::Echo { .. } => "echo",
            Effect::Mash { .. } => "mash",
            Effect::Mute { .. } => "mute",
            Effect::TriggerGate { .. } => "trigger_gate",
            Effect::SpectralGate { .. } => "spectral_gate",
            Effect::PercussiveExtract => "percussive_extract",
            Effect::CopySegment { .. } => "copy_segment",
        }
    }

    /// Effects that walk a beat grid
    pub fn beat_window(&self) -> Option<&BeatWindow> {
        match self {
            Effect::Loop(window)
            | Effect::Reverse(window)
            | Effect::Chop { window, .. }
            | Effect::Stutter { window, .. }
            | Effect::Mash { window, .. } => Some(window),
            _ => None,
        }
    }
}

/// What a validated operation asks for
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Effect(Effect),
    /// Positive: undo that many steps; negative: redo
    Revert(i64),
    Control(Control),
}
