//! Key-by-key line editing for the interactive prompt

use crate::commands::Control;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// What a key press asks the session to do
#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    /// A finished line to classify and run
    Submit(String),
    Control(Control),
    /// Jump playback back to the start
    Restart,
    /// Line buffer changed, redraw the prompt
    Edited,
}

/// Collects typed characters into an instruction line
pub struct InputHandler {
    line: String,
}

impl InputHandler {
    pub fn new() -> Self {
        Self {
            line: String::new(),
        }
    }

    /// Current line buffer (for display)
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Handle a key event and return an action if applicable
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<KeyAction> {
        if key.kind == KeyEventKind::Release {
            return None;
        }

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(KeyAction::Control(Control::Quit))
            }
            KeyCode::Enter => {
                let line = std::mem::take(&mut self.line);
                if line.trim().is_empty() {
                    Some(KeyAction::Edited)
                } else {
                    Some(KeyAction::Submit(line))
                }
            }
            KeyCode::Esc => {
                self.line.clear();
                Some(KeyAction::Edited)
            }
            KeyCode::Backspace => {
                self.line.pop();
                Some(KeyAction::Edited)
            }
            KeyCode::Char(' ') if self.line.is_empty() => {
                Some(KeyAction::Control(Control::TogglePlayback))
            }
            KeyCode::Left => Some(KeyAction::Control(Control::Undo)),
            KeyCode::Right => Some(KeyAction::Control(Control::Redo)),
            KeyCode::Up => Some(KeyAction::Restart),
            KeyCode::Char(c) => {
                self.line.push(c);
                Some(KeyAction::Edited)
            }
            _ => None,
        }
    }
}

impl Default for InputHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_str(handler: &mut InputHandler, text: &str) {
        for c in text.chars() {
            handler.handle_key(key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn test_enter_submits_line() {
        let mut handler = InputHandler::new();
        type_str(&mut handler, "p:2;");
        assert_eq!(handler.line(), "p:2;");
        assert_eq!(
            handler.handle_key(key(KeyCode::Enter)),
            Some(KeyAction::Submit("p:2;".into()))
        );
        assert_eq!(handler.line(), "");
    }

    #[test]
    fn test_space_toggles_only_on_empty_line() {
        let mut handler = InputHandler::new();
        assert_eq!(
            handler.handle_key(key(KeyCode::Char(' '))),
            Some(KeyAction::Control(Control::TogglePlayback))
        );
        type_str(&mut handler, "p:2");
        handler.handle_key(key(KeyCode::Char(' ')));
        assert_eq!(handler.line(), "p:2 ");
    }

    #[test]
    fn test_arrows() {
        let mut handler = InputHandler::new();
        assert_eq!(
            handler.handle_key(key(KeyCode::Left)),
            Some(KeyAction::Control(Control::Undo))
        );
        assert_eq!(
            handler.handle_key(key(KeyCode::Right)),
            Some(KeyAction::Control(Control::Redo))
        );
        assert_eq!(handler.handle_key(key(KeyCode::Up)), Some(KeyAction::Restart));
    }

    #[test]
    fn test_editing_keys() {
        let mut handler = InputHandler::new();
        type_str(&mut handler, "loop");
        handler.handle_key(key(KeyCode::Backspace));
        assert_eq!(handler.line(), "loo");
        handler.handle_key(key(KeyCode::Esc));
        assert_eq!(handler.line(), "");
        assert_eq!(handler.handle_key(key(KeyCode::Enter)), Some(KeyAction::Edited));
    }

    #[test]
    fn test_ctrl_c_quits() {
        let mut handler = InputHandler::new();
        let event = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(
            handler.handle_key(event),
            Some(KeyAction::Control(Control::Quit))
        );
    }
}
