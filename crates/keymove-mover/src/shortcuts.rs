//! Shared keyboard shortcut registry with scoped registrations.

use keymove_core::{Key, KeyCombo, ShortcutError, SurfaceId};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Name prefix of the per-surface commit shortcut registered during a move.
pub const COMMIT_SHORTCUT: &str = "keymove.commit_move";

pub fn commit_shortcut_name(surface: SurfaceId) -> String {
    format!("{COMMIT_SHORTCUT}:{}", surface.0)
}

pub fn is_commit_shortcut(name: &str) -> bool {
    name.starts_with(COMMIT_SHORTCUT)
}

/// Keys that keep their normal meaning while a move is open.
pub fn is_move_key(combo: &KeyCombo) -> bool {
    combo.key.is_arrow()
        || matches!(combo.key, Key::Enter | Key::Escape)
        || matches!(combo.key, Key::Char(c) if c.eq_ignore_ascii_case(&'m'))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcut {
    pub name: String,
    pub combos: Vec<KeyCombo>,
}

impl Shortcut {
    pub fn new(name: impl Into<String>, combos: Vec<KeyCombo>) -> Self {
        Self {
            name: name.into(),
            combos,
        }
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    /// Registration order; later entries shadow earlier ones.
    shortcuts: Vec<Shortcut>,
}

/// Single-threaded registry shared between the keymap and move sessions.
#[derive(Debug, Clone, Default)]
pub struct ShortcutRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

impl ShortcutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, shortcut: Shortcut) -> Result<(), ShortcutError> {
        let mut inner = self.inner.borrow_mut();
        if inner.shortcuts.iter().any(|s| s.name == shortcut.name) {
            return Err(ShortcutError::Duplicate(shortcut.name));
        }
        tracing::debug!("Registered shortcut {}", shortcut.name);
        inner.shortcuts.push(shortcut);
        Ok(())
    }

    /// Register a shortcut that is removed again when the guard drops.
    pub fn register_scoped(&self, shortcut: Shortcut) -> Result<ShortcutGuard, ShortcutError> {
        let name = shortcut.name.clone();
        self.register(shortcut)?;
        Ok(ShortcutGuard {
            registry: Rc::downgrade(&self.inner),
            name,
        })
    }

    pub fn unregister(&self, name: &str) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.shortcuts.len();
        inner.shortcuts.retain(|s| s.name != name);
        before != inner.shortcuts.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.borrow().shortcuts.iter().any(|s| s.name == name)
    }

    /// Names bound to `combo`, most recently registered first.
    pub fn resolve_all(&self, combo: &KeyCombo) -> Vec<String> {
        self.inner
            .borrow()
            .shortcuts
            .iter()
            .rev()
            .filter(|s| s.combos.contains(combo))
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn resolve(&self, combo: &KeyCombo) -> Option<String> {
        self.resolve_all(combo).into_iter().next()
    }

    /// Every combo bound by any registered shortcut, excluding move keys and
    /// commit shortcuts themselves.
    pub fn shadowable_combos(&self) -> Vec<KeyCombo> {
        let inner = self.inner.borrow();
        let mut combos: Vec<KeyCombo> = Vec::new();
        for shortcut in inner.shortcuts.iter().filter(|s| !is_commit_shortcut(&s.name)) {
            for combo in &shortcut.combos {
                if !is_move_key(combo) && !combos.contains(combo) {
                    combos.push(*combo);
                }
            }
        }
        combos
    }
}

/// Unregisters its shortcut on drop, including during unwinding.
#[derive(Debug)]
pub struct ShortcutGuard {
    registry: Weak<RefCell<RegistryInner>>,
    name: String,
}

impl ShortcutGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ShortcutGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade()
            && let Ok(mut inner) = inner.try_borrow_mut()
        {
            inner.shortcuts.retain(|s| s.name != self.name);
            tracing::debug!("Unregistered scoped shortcut {}", self.name);
        }
    }
}
