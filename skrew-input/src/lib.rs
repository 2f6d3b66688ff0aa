//! Instruction language and keyboard input for Skrew

mod commands;
mod help;
mod keys;
mod parser;

pub use commands::{Action, Arg, Arity, BeatWindow, Control, Effect, Operation, OperationKind};
pub use help::{help_text, CONTROLS, INSTRUCTIONS};
pub use keys::{InputHandler, KeyAction};
pub use parser::{classify, parse, Input, ParseError, MAX_BEATS, MAX_ECHOES};
