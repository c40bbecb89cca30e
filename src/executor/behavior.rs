// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Scoped override of the transport's ambient behavior.
//!
//! Some transport behaviors, such as how loudly per-host errors are
//! reported, are read from a process-wide "current behavior" rather than
//! passed per call. [`BehaviorOverride`] swaps that value for the lifetime
//! of a guard and puts the previous one back when the guard drops, which
//! covers normal return, early return, `?` and unwinding panics alike.
//!
//! # Not reentrant
//!
//! There is a single process-wide slot. Nested overrides on one task
//! restore correctly in LIFO order, but two overrides whose lifetimes
//! overlap without nesting (for example from concurrent tasks) leave the
//! slot in an undefined state. Run at most one overridden call at a time.

use once_cell::sync::Lazy;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// How the transport treats per-host errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportBehavior {
    /// Report per-host transport errors as they happen.
    #[default]
    Standard,
    /// Keep per-host transport errors quiet; they still end up in the report.
    SkipErrors,
}

impl TransportBehavior {
    /// `-vv` and above ask for per-host diagnostics.
    pub fn from_verbosity(verbosity: u8) -> Self {
        if verbosity > 1 {
            TransportBehavior::Standard
        } else {
            TransportBehavior::SkipErrors
        }
    }

    pub fn reports_host_errors(self) -> bool {
        matches!(self, TransportBehavior::Standard)
    }
}

static ACTIVE: Lazy<Mutex<Option<TransportBehavior>>> = Lazy::new(|| Mutex::new(None));

fn slot() -> MutexGuard<'static, Option<TransportBehavior>> {
    ACTIVE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The behavior in effect right now.
///
/// This is the only place ambient behavior is read.
pub fn current() -> TransportBehavior {
    slot().unwrap_or_default()
}

/// Whether an override is installed.
pub fn is_overridden() -> bool {
    slot().is_some()
}

/// Guard that keeps an override installed until dropped.
#[must_use = "the override is removed as soon as the guard is dropped"]
#[derive(Debug)]
pub struct BehaviorOverride {
    previous: Option<TransportBehavior>,
}

impl BehaviorOverride {
    pub fn install(behavior: TransportBehavior) -> Self {
        let previous = slot().replace(behavior);
        if previous.is_some() {
            tracing::debug!(
                "Nested behavior override: {:?} replaces {:?}",
                behavior,
                previous
            );
        }
        Self { previous }
    }
}

impl Drop for BehaviorOverride {
    fn drop(&mut self) {
        *slot() = self.previous.take();
    }
}

/// Run `f` with `behavior` in effect.
pub fn with_behavior<R>(behavior: TransportBehavior, f: impl FnOnce() -> R) -> R {
    let _guard = BehaviorOverride::install(behavior);
    f()
}

/// Await `future` with `behavior` in effect.
pub async fn with_behavior_async<F>(behavior: TransportBehavior, future: F) -> F::Output
where
    F: Future,
{
    let _guard = BehaviorOverride::install(behavior);
    future.await
}
