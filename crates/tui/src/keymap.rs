use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use sqlnav_core::keys::Key;

pub(crate) fn map_key_event(key: KeyEvent) -> Option<Key> {
    match (key.modifiers, key.code) {
        (modifiers, KeyCode::Char(ch)) if modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Key::Ctrl(ch.to_ascii_lowercase()))
        }
        (_, KeyCode::Char(ch)) => Some(Key::Char(ch)),
        (_, KeyCode::Enter) => Some(Key::Enter),
        (_, KeyCode::Esc) => Some(Key::Esc),
        (_, KeyCode::BackTab) | (KeyModifiers::SHIFT, KeyCode::Tab) => Some(Key::BackTab),
        (_, KeyCode::Tab) => Some(Key::Tab),
        (_, KeyCode::Backspace) => Some(Key::Backspace),
        (_, KeyCode::Delete) => Some(Key::Delete),
        (_, KeyCode::Up) => Some(Key::Up),
        (_, KeyCode::Down) => Some(Key::Down),
        (_, KeyCode::Left) => Some(Key::Left),
        (_, KeyCode::Right) => Some(Key::Right),
        (_, KeyCode::Home) => Some(Key::Home),
        (_, KeyCode::End) => Some(Key::End),
        (_, KeyCode::PageUp) => Some(Key::PageUp),
        (_, KeyCode::PageDown) => Some(Key::PageDown),
        _ => None,
    }
}
