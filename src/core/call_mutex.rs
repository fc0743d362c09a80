//
// Copyright 2024 RoomRTC Contributors
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Locks guarding a call's shared state.
//!
//! A call's attributes are shared between its state machine task, spawned
//! operations, and timers. A panic in any one of them would poison a plain
//! mutex and take every other handle down with it; this wrapper turns
//! poisoning into an ordinary error instead, so the owning call can fail
//! on its own terms while the rest of the engine keeps running.

use std::sync::{Mutex, MutexGuard};

use crate::common::Result;
use crate::error::EngineError;

/// A mutex around one call attribute, named in errors by a static label
/// (`"state"`, `"candidates"`, ...).
pub struct CallMutex<T> {
    label: &'static str,
    mutex: Mutex<T>,
}

impl<T> CallMutex<T> {
    pub fn new(value: T, label: &'static str) -> CallMutex<T> {
        CallMutex {
            label,
            mutex: Mutex::new(value),
        }
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, T>> {
        match self.mutex.lock() {
            Ok(guard) => Ok(guard),
            Err(_) => Err(EngineError::MutexPoisoned(self.label).into()),
        }
    }

    /// Run `f` on the locked value. For short accesses that should not
    /// hold the guard beyond one expression.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        Ok(f(&mut *self.lock()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_returns_the_closure_result() {
        let counter = CallMutex::new(1u32, "counter");
        let doubled = counter
            .with(|value| {
                *value += 1;
                *value * 2
            })
            .unwrap();
        assert_eq!(doubled, 4);
        assert_eq!(*counter.lock().unwrap(), 2);
    }
}
