//! Test support helpers (crate-internal).
//!
//! Tests that touch `MODELGATE_*` variables take [`env_lock`] for their whole
//! body and restore the previous values through [`EnvGuard`].

#![allow(unsafe_code)]

use std::sync::{Mutex, MutexGuard, PoisonError};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Serialize env-mutating tests. A panicking test does not poison later ones.
pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Set or remove variables; every touched variable is restored on drop.
#[derive(Default)]
pub(crate) struct EnvGuard {
    saved: Vec<(&'static str, Option<String>)>,
}

impl EnvGuard {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(mut self, key: &'static str, value: &str) -> Self {
        self.saved.push((key, std::env::var(key).ok()));
        unsafe {
            std::env::set_var(key, value);
        }
        self
    }

    pub(crate) fn remove(mut self, key: &'static str) -> Self {
        self.saved.push((key, std::env::var(key).ok()));
        unsafe {
            std::env::remove_var(key);
        }
        self
    }

    pub(crate) fn remove_all(self, keys: &[&'static str]) -> Self {
        keys.iter().fold(self, |guard, key| guard.remove(*key))
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, previous) in self.saved.drain(..).rev() {
            match previous {
                Some(value) => unsafe {
                    std::env::set_var(key, value);
                },
                None => unsafe {
                    std::env::remove_var(key);
                },
            }
        }
    }
}
