// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Coalesces concurrent refreshes of an expiring value.
//!
//! A [SingleFlightRefresher] wraps an [ExpiringCache] and a [RefreshSource].
//! Callers ask for the value with [get_value][SingleFlightRefresher::get_value].
//! A fresh cached value is returned right away. Otherwise the caller joins the
//! refresh that is already running, or starts one if none is. However many
//! callers arrive, at most one call to [RefreshSource::refresh] is in flight.
//!
//! A refresh outlives any single caller. If one caller is cancelled the others
//! still receive the result. If every caller is dropped the refresh is dropped
//! too, and the next caller starts a new one.
//!
//! Errors are never cached. A failed refresh is returned to every caller that
//! joined it, and the next call starts a new attempt.

use crate::Result;
use crate::cache::{CachedEntry, ExpiringCache};
use crate::clock::Clock;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use std::sync::{Arc, Mutex, PoisonError};
use time::Duration;

/// Produces a new value and its time-to-live.
///
/// A time-to-live of zero or less means the value is expired as soon as it is
/// stored.
#[async_trait::async_trait]
pub trait RefreshSource<T>: std::fmt::Debug + Send + Sync {
    async fn refresh(&self) -> Result<(T, Duration)>;
}

type RefreshFuture<T> = BoxFuture<'static, Result<T>>;

/// See the [module documentation](self).
pub struct SingleFlightRefresher<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    source: Arc<dyn RefreshSource<T>>,
    clock: Arc<dyn Clock>,
    state: Mutex<State<T>>,
}

struct State<T> {
    cache: ExpiringCache<T>,
    // Only the callers hold strong references to the running refresh.
    in_flight: Option<WeakShared<RefreshFuture<T>>>,
}

impl<T> Clone for SingleFlightRefresher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for SingleFlightRefresher<T>
where
    T: Clone + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("SingleFlightRefresher")
            .field("source", &self.inner.source)
            .field("clock", &self.inner.clock)
            .field("cache", &state.cache)
            .field("refreshing", &state.in_flight.is_some())
            .finish()
    }
}

impl<T> SingleFlightRefresher<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a refresher with an empty cache.
    pub fn new<S>(source: S, safety_margin: Duration, clock: Arc<dyn Clock>) -> Self
    where
        S: RefreshSource<T> + 'static,
    {
        Self::from_arc(Arc::new(source), safety_margin, clock)
    }

    pub(crate) fn from_arc(
        source: Arc<dyn RefreshSource<T>>,
        safety_margin: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                clock,
                state: Mutex::new(State {
                    cache: ExpiringCache::new(safety_margin),
                    in_flight: None,
                }),
            }),
        }
    }

    /// Returns the cached value, refreshing it first if needed.
    ///
    /// With `force_refresh` the cache is bypassed. A forced call still joins a
    /// refresh that is already running instead of starting a second one.
    pub async fn get_value(&self, force_refresh: bool) -> Result<T> {
        let refresh = {
            let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !force_refresh {
                if let Some(value) = state.cache.get(self.inner.clock.now()) {
                    return Ok(value);
                }
            }
            match state.in_flight.as_ref().and_then(WeakShared::upgrade) {
                Some(running) => running,
                None => {
                    let running = self.start_refresh();
                    // The handle is published before the refresh is first
                    // polled, so later callers always find it.
                    state.in_flight = running.downgrade();
                    running
                }
            }
        };
        refresh.await
    }

    /// The current cache entry, fresh or not.
    pub fn cached(&self) -> Option<CachedEntry<T>> {
        let state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.cache.entry().cloned()
    }

    fn start_refresh(&self) -> Shared<RefreshFuture<T>> {
        let inner = self.inner.clone();
        let refresh: RefreshFuture<T> = async move {
            tracing::debug!("refreshing cached value");
            let result = inner.source.refresh().await;
            let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.in_flight = None;
            match result {
                Ok((value, ttl)) => {
                    let entry = state.cache.store(value.clone(), inner.clock.now(), ttl);
                    tracing::debug!(expires_at = %entry.expires_at(), "refreshed cached value");
                    Ok(value)
                }
                Err(e) => {
                    tracing::warn!("refresh failed: {e}");
                    Err(e)
                }
            }
        }
        .boxed();
        refresh.shared()
    }
}
