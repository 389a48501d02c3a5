use serde::{Deserialize, Serialize};
use std::fmt;

/// Modifier keys held during a key press or pointer click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        shift: false,
        ctrl: false,
        alt: false,
        meta: false,
    };

    pub const ALT: Self = Self {
        shift: false,
        ctrl: false,
        alt: true,
        meta: false,
    };

    pub const SHIFT: Self = Self {
        shift: true,
        ctrl: false,
        alt: false,
        meta: false,
    };

    pub const CTRL: Self = Self {
        shift: false,
        ctrl: true,
        alt: false,
        meta: false,
    };

    /// True when every modifier set in `other` is also held here.
    pub fn contains(self, other: Modifiers) -> bool {
        (!other.shift || self.shift)
            && (!other.ctrl || self.ctrl)
            && (!other.alt || self.alt)
            && (!other.meta || self.meta)
    }

    pub fn is_empty(self) -> bool {
        self == Self::NONE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Enter,
    Escape,
    Delete,
    Backspace,
    Tab,
    Char(char),
}

impl Key {
    pub fn is_arrow(self) -> bool {
        matches!(self, Key::Up | Key::Down | Key::Left | Key::Right)
    }
}

/// A key together with the modifiers that must be held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyCombo {
    pub key: Key,
    #[serde(default)]
    pub modifiers: Modifiers,
}

impl KeyCombo {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers::NONE,
        }
    }

    pub fn with(key: Key, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.ctrl {
            write!(f, "Ctrl+")?;
        }
        if self.modifiers.alt {
            write!(f, "Alt+")?;
        }
        if self.modifiers.shift {
            write!(f, "Shift+")?;
        }
        if self.modifiers.meta {
            write!(f, "Meta+")?;
        }
        match self.key {
            Key::Char(c) => write!(f, "{}", c.to_ascii_uppercase()),
            other => write!(f, "{:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifiers_contains() {
        let held = Modifiers {
            shift: true,
            alt: true,
            ..Modifiers::NONE
        };
        assert!(held.contains(Modifiers::ALT));
        assert!(held.contains(Modifiers::NONE));
        assert!(!held.contains(Modifiers::CTRL));
        assert!(!Modifiers::NONE.contains(Modifiers::SHIFT));
    }

    #[test]
    fn combo_display() {
        let combo = KeyCombo::with(Key::Char('c'), Modifiers::CTRL);
        assert_eq!(combo.to_string(), "Ctrl+C");
        assert_eq!(KeyCombo::with(Key::Up, Modifiers::ALT).to_string(), "Alt+Up");
    }
}
