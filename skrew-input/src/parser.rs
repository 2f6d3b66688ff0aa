//! Instruction parsing and validation
//!
//! An instruction is a sequence of clauses separated by `;`. Each clause is
//! `<token>` or `<token>:<v1>:...:<vn>`. Parsing is total: unknown tokens and
//! malformed values survive as data and are rejected by [`Operation::resolve`].

use crate::commands::{Action, Arg, Arity, BeatWindow, Control, Effect, Operation, OperationKind};
use thiserror::Error;

/// Largest pitch shift accepted, in semitones
const MAX_SEMITONES: f64 = 48.0;
/// Upper bound for beat counts: strides, lengths, repeats, parts, repetitions
pub const MAX_BEATS: usize = 4096;
/// Upper bound for echo copies
pub const MAX_ECHOES: usize = 1000;

/// Clause rejected during validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unknown operation '{0}'")]
    Unknown(String),

    #[error("'{token}' takes {expected} parameter(s), got {found}")]
    Arity {
        token: String,
        expected: Arity,
        found: usize,
    },

    #[error("'{token}': '{value}' is not a number")]
    Malformed { token: String, value: String },

    #[error("'{token}': {name} must be {constraint}, got {value}")]
    OutOfRange {
        token: String,
        name: &'static str,
        constraint: &'static str,
        value: f64,
    },
}

/// Classified line of user input
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Empty,
    /// One-letter command such as `u;`
    Control(Control),
    /// Terminated instruction
    Instruction(Vec<Operation>),
    /// Text without the terminating `;`
    Incomplete(String),
}

/// Classify one line of user input
pub fn classify(input: &str) -> Input {
    let input = input.trim();
    if input.is_empty() {
        return Input::Empty;
    }
    if !input.ends_with(';') {
        return Input::Incomplete(input.to_string());
    }

    let mut chars = input.chars();
    if let (Some(c), Some(';'), None) = (chars.next(), chars.next(), chars.next()) {
        if let Some(control) = Control::from_char(c) {
            return Input::Control(control);
        }
    }

    Input::Instruction(parse(input))
}

/// Parse clauses into operations, in order
pub fn parse(input: &str) -> Vec<Operation> {
    input
        .split(';')
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .map(parse_clause)
        .collect()
}

fn parse_clause(clause: &str) -> Operation {
    let mut parts = clause.split(':');
    let token = parts.next().unwrap_or_default().trim();
    let args = parts
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_value)
        .collect();
    Operation::new(OperationKind::from_token(token), args)
}

fn parse_value(text: &str) -> Arg {
    match text.replace(',', ".").parse::<f64>() {
        Ok(v) if v.is_finite() => Arg::Number(v),
        _ => Arg::Invalid(text.to_string()),
    }
}

/// Validated numeric values of one clause
struct Values<'a> {
    token: &'a str,
    values: Vec<f64>,
}

impl Values<'_> {
    fn number(&self, index: usize) -> f64 {
        self.values.get(index).copied().unwrap_or_default()
    }

    /// Value truncated toward zero, at least `min`
    fn count(&self, index: usize, name: &'static str, min: usize) -> Result<usize, ParseError> {
        let value = self.number(index);
        let truncated = value.trunc();
        if truncated < min as f64 {
            return Err(ParseError::OutOfRange {
                token: self.token.to_string(),
                name,
                constraint: if min == 0 { "non-negative" } else { "at least 1" },
                value,
            });
        }
        Ok(truncated as usize)
    }

    /// [`Values::count`] with an upper bound
    fn bounded(
        &self,
        index: usize,
        name: &'static str,
        min: usize,
        max: usize,
        constraint: &'static str,
    ) -> Result<usize, ParseError> {
        let count = self.count(index, name, min)?;
        if count > max {
            return Err(ParseError::OutOfRange {
                token: self.token.to_string(),
                name,
                constraint,
                value: self.number(index),
            });
        }
        Ok(count)
    }

    /// Beat count in `1..=MAX_BEATS`
    fn beats(&self, index: usize, name: &'static str) -> Result<usize, ParseError> {
        self.bounded(index, name, 1, MAX_BEATS, "between 1 and 4096")
    }

    fn window(
        &self,
        stride: usize,
        length: usize,
        repeat: usize,
    ) -> Result<BeatWindow, ParseError> {
        Ok(BeatWindow {
            stride: self.beats(stride, "stride")?,
            length: self.beats(length, "length")?,
            repeat: self.beats(repeat, "repeat")?,
        })
    }

    /// Index shift when the optional leading <beats> value is present
    fn leading(&self) -> usize {
        usize::from(self.values.len() == 4)
    }
}

impl Operation {
    /// Validate arity and ranges, producing the typed request
    pub fn resolve(&self) -> Result<Action, ParseError> {
        let token = self.token();
        if let OperationKind::Unknown(token) = &self.kind {
            return Err(ParseError::Unknown(token.clone()));
        }

        let arity = self.kind.arity();
        if !arity.accepts(self.args.len()) {
            return Err(ParseError::Arity {
                token: token.to_string(),
                expected: arity,
                found: self.args.len(),
            });
        }

        let values = self
            .args
            .iter()
            .map(|arg| match arg {
                Arg::Number(v) => Ok(*v),
                Arg::Invalid(text) => Err(ParseError::Malformed {
                    token: token.to_string(),
                    value: text.clone(),
                }),
            })
            .collect::<Result<Vec<f64>, ParseError>>()?;
        let v = Values { token, values };

        let effect = match &self.kind {
            OperationKind::Pitch => {
                let semitones = v.number(0);
                if semitones.abs() > MAX_SEMITONES {
                    return Err(ParseError::OutOfRange {
                        token: token.to_string(),
                        name: "semitones",
                        constraint: "within +/-48",
                        value: semitones,
                    });
                }
                Effect::Pitch { semitones }
            }
            OperationKind::TimeStretch => Effect::TimeStretch { rate: v.number(0) },
            OperationKind::ResampleTime => Effect::ResampleTime { rate: v.number(0) },
            OperationKind::BpmMatch => Effect::BpmMatch {
                target_bpm: v.number(0),
            },
            OperationKind::Loop => Effect::Loop(v.window(0, 1, 2)?),
            OperationKind::Reverse => Effect::Reverse(v.window(0, 1, 2)?),
            OperationKind::Chop => {
                // [beats:]size:step:repeat
                let i = v.leading();
                let chunk_beats = if i == 1 {
                    v.beats(0, "beats")?
                } else {
                    1
                };
                Effect::Chop {
                    chunk_beats,
                    window: v.window(i + 1, i, i + 2)?,
                }
            }
            OperationKind::Stutter => {
                // [beats:]count:length:repeat
                let i = v.leading();
                let stride = if i == 1 { v.beats(0, "beats")? } else { 1 };
                Effect::Stutter {
                    count: v.beats(i, "count")?,
                    window: BeatWindow {
                        stride,
                        length: v.beats(i + 1, "length")?,
                        repeat: v.beats(i + 2, "repeat")?,
                    },
                }
            }
            OperationKind::Mash => {
                // [beats:]parts:beats_per_mash:repeat
                let i = v.leading();
                let length = v.beats(i + 1, "beats_per_mash")?;
                let stride = if i == 1 {
                    v.beats(0, "beats")?
                } else {
                    length
                };
                Effect::Mash {
                    parts: v.beats(i, "parts")?,
                    window: BeatWindow {
                        stride,
                        length,
                        repeat: v.beats(i + 2, "repeat")?,
                    },
                }
            }
            OperationKind::Echo => {
                let delay_secs = v.number(0);
                if delay_secs < 0.0 {
                    return Err(ParseError::OutOfRange {
                        token: token.to_string(),
                        name: "delay",
                        constraint: "non-negative",
                        value: delay_secs,
                    });
                }
                Effect::Echo {
                    delay_secs,
                    count: v.bounded(1, "count", 0, MAX_ECHOES, "between 0 and 1000")?,
                    decay: v.number(2),
                }
            }
            OperationKind::Mute => Effect::Mute {
                threshold_db: v.number(0),
            },
            OperationKind::TriggerGate => Effect::TriggerGate {
                sensitivity: v.number(0),
            },
            OperationKind::SpectralGate => Effect::SpectralGate {
                threshold_db: v.number(0),
            },
            OperationKind::PercussiveExtract => Effect::PercussiveExtract,
            OperationKind::CopySegment => Effect::CopySegment {
                start: v.count(0, "start", 0)?,
                count: v.count(1, "count", 0)?,
            },
            OperationKind::Revert => return Ok(Action::Revert(v.number(0).trunc() as i64)),
            OperationKind::Special(control) => return Ok(Action::Control(*control)),
            OperationKind::Unknown(token) => return Err(ParseError::Unknown(token.clone())),
        };

        Ok(Action::Effect(effect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect(input: &str) -> Effect {
        match parse(input)[0].resolve() {
            Ok(Action::Effect(effect)) => effect,
            other => panic!("expected effect from {:?}, got {:?}", input, other),
        }
    }

    fn error(input: &str) -> ParseError {
        match parse(input)[0].resolve() {
            Err(e) => e,
            other => panic!("expected error from {:?}, got {:?}", input, other),
        }
    }

    #[test]
    fn test_parse_clauses_in_order() {
        let ops = parse("p:2; t:1,5 ;loop:2:8:4;");
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0], Operation::with_values(OperationKind::Pitch, &[2.0]));
        assert_eq!(
            ops[1],
            Operation::with_values(OperationKind::TimeStretch, &[1.5])
        );
        assert_eq!(ops[2].to_string(), "loop:2:8:4");
    }

    #[test]
    fn test_empty_clauses_are_skipped() {
        assert!(parse(";; ;").is_empty());
        assert!(parse("").is_empty());
        assert_eq!(parse("perc;;;").len(), 1);
    }

    #[test]
    fn test_unknown_token_is_preserved() {
        let ops = parse("wobble:3;p:1;");
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].kind, OperationKind::Unknown("wobble".into()));
        assert_eq!(error("wobble:3;"), ParseError::Unknown("wobble".into()));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let input = "chop:4:2:1;bpm:-5;  echo:0.5:3:0,7;x;";
        assert_eq!(parse(input), parse(input));
    }

    #[test]
    fn test_alias_tokens() {
        assert_eq!(effect("a:0.5;"), Effect::ResampleTime { rate: 0.5 });
        assert_eq!(effect("rt:2;"), Effect::ResampleTime { rate: 2.0 });
    }

    #[test]
    fn test_arity_is_enforced() {
        assert!(matches!(
            error("loop:2:8;"),
            ParseError::Arity { found: 2, .. }
        ));
        assert!(matches!(error("p;x"), ParseError::Arity { found: 0, .. }));
        assert!(matches!(error("perc:1;"), ParseError::Arity { .. }));
        assert!(matches!(
            error("chop:1:2:3:4:5;"),
            ParseError::Arity { found: 5, .. }
        ));
    }

    #[test]
    fn test_malformed_values() {
        assert_eq!(
            error("p:two;"),
            ParseError::Malformed {
                token: "p".into(),
                value: "two".into()
            }
        );
        assert!(matches!(error("t:nan;"), ParseError::Malformed { .. }));
        assert!(matches!(error("t:inf;"), ParseError::Malformed { .. }));
    }

    #[test]
    fn test_window_parameters() {
        assert_eq!(
            effect("loop:2:8:4;"),
            Effect::Loop(BeatWindow {
                stride: 2,
                length: 8,
                repeat: 4
            })
        );
        assert!(matches!(
            error("rev:0:2:2;"),
            ParseError::OutOfRange { name: "stride", .. }
        ));
        assert!(matches!(
            error("loop:1:4:0;"),
            ParseError::OutOfRange { name: "repeat", .. }
        ));
    }

    #[test]
    fn test_huge_counts_rejected() {
        for (input, name) in [
            ("loop:1:1e30:1;", "length"),
            ("rev:1e30:1:1;", "stride"),
            ("loop:1:1:4097;", "repeat"),
            ("stut:1e17:1:1;", "count"),
            ("mash:1e9:2:1;", "parts"),
            ("chop:1e30:4:2:1;", "beats"),
            ("echo:0:1e15:0.5;", "count"),
        ] {
            match error(input) {
                ParseError::OutOfRange { name: found, .. } => assert_eq!(found, name, "{input}"),
                other => panic!("{input}: {other:?}"),
            }
        }
        assert!(matches!(
            effect("loop:4096:4096:4096;"),
            Effect::Loop(BeatWindow { length: MAX_BEATS, .. })
        ));
        assert!(matches!(
            effect("echo:0:1000:0.5;"),
            Effect::Echo { count: MAX_ECHOES, .. }
        ));
    }

    #[test]
    fn test_optional_leading_beats() {
        assert_eq!(
            effect("chop:4:2:1;"),
            Effect::Chop {
                chunk_beats: 1,
                window: BeatWindow {
                    stride: 2,
                    length: 4,
                    repeat: 1
                }
            }
        );
        assert_eq!(
            effect("chop:2:4:2:1;"),
            Effect::Chop {
                chunk_beats: 2,
                window: BeatWindow {
                    stride: 2,
                    length: 4,
                    repeat: 1
                }
            }
        );
        assert_eq!(
            effect("stut:3:2:1;"),
            Effect::Stutter {
                count: 3,
                window: BeatWindow {
                    stride: 1,
                    length: 2,
                    repeat: 1
                }
            }
        );
        assert_eq!(
            effect("mash:4:2:1;"),
            Effect::Mash {
                parts: 4,
                window: BeatWindow {
                    stride: 2,
                    length: 2,
                    repeat: 1
                }
            }
        );
        assert_eq!(
            effect("mash:1:4:2:3;"),
            Effect::Mash {
                parts: 4,
                window: BeatWindow {
                    stride: 1,
                    length: 2,
                    repeat: 3
                }
            }
        );
    }

    #[test]
    fn test_fractional_counts_truncate() {
        assert_eq!(
            effect("echo:0.25:2.9:0.5;"),
            Effect::Echo {
                delay_secs: 0.25,
                count: 2,
                decay: 0.5
            }
        );
        assert_eq!(
            effect("copy:100.7:10;"),
            Effect::CopySegment {
                start: 100,
                count: 10
            }
        );
    }

    #[test]
    fn test_negative_bpm_is_not_a_parse_error() {
        assert_eq!(effect("bpm:-5;"), Effect::BpmMatch { target_bpm: -5.0 });
    }

    #[test]
    fn test_revert_and_help() {
        assert_eq!(parse("revert:2;")[0].resolve(), Ok(Action::Revert(2)));
        assert_eq!(parse("revert:-3;")[0].resolve(), Ok(Action::Revert(-3)));
        assert_eq!(
            parse("help;")[0].resolve(),
            Ok(Action::Control(Control::Help))
        );
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("  "), Input::Empty);
        assert_eq!(classify("u;"), Input::Control(Control::Undo));
        assert_eq!(classify(" p; "), Input::Control(Control::TogglePlayback));
        assert_eq!(classify("p:2"), Input::Incomplete("p:2".into()));
        assert!(matches!(classify("p:2;"), Input::Instruction(ops) if ops.len() == 1));
        // Not a control letter: parsed as an instruction
        assert!(matches!(classify("x;"), Input::Instruction(_)));
    }

    #[test]
    fn test_compact_label() {
        assert_eq!(parse("loop:2:8:4;")[0].compact(), "loop2_8_4");
        assert_eq!(parse("perc;")[0].compact(), "perc");
        assert_eq!(parse("t:1.5;")[0].compact(), "t1.5");
    }
}
