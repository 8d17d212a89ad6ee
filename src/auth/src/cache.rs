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

//! A single-slot cache for values with an expiration time.

use time::{Duration, OffsetDateTime, PrimitiveDateTime};

/// A value and the time at which it stops being usable.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedEntry<T> {
    value: T,
    expires_at: OffsetDateTime,
}

impl<T> CachedEntry<T> {
    pub fn new(value: T, expires_at: OffsetDateTime) -> Self {
        Self { value, expires_at }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn expires_at(&self) -> OffsetDateTime {
        self.expires_at
    }

    /// Returns `true` while `expires_at - safety_margin` is still after `now`.
    pub fn is_fresh(&self, now: OffsetDateTime, safety_margin: Duration) -> bool {
        self.expires_at
            .checked_sub(safety_margin)
            .is_some_and(|deadline| deadline > now)
    }
}

/// Holds at most one [CachedEntry].
///
/// A stored entry is replaced as a whole, it is never updated in place. The
/// safety margin shortens the usable lifetime of every entry, so a value is
/// only served while `expires_at - safety_margin > now`.
#[derive(Clone, Debug)]
pub struct ExpiringCache<T> {
    entry: Option<CachedEntry<T>>,
    safety_margin: Duration,
}

impl<T: Clone> ExpiringCache<T> {
    pub fn new(safety_margin: Duration) -> Self {
        Self {
            entry: None,
            safety_margin,
        }
    }

    pub fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    /// Returns the cached value if it is still fresh at `now`.
    pub fn get(&self, now: OffsetDateTime) -> Option<T> {
        self.entry
            .as_ref()
            .filter(|e| e.is_fresh(now, self.safety_margin))
            .map(|e| e.value.clone())
    }

    /// Replaces the entry with `value`, expiring at `now + ttl`.
    ///
    /// A `ttl` of zero or less stores an entry that is already expired.
    pub fn store(&mut self, value: T, now: OffsetDateTime, ttl: Duration) -> &CachedEntry<T> {
        // Saturate instead of panicking on absurd lifetimes.
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc());
        self.entry.insert(CachedEntry::new(value, expires_at))
    }

    pub fn entry(&self) -> Option<&CachedEntry<T>> {
        self.entry.as_ref()
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn epoch() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::days(10_000)
    }

    #[test]
    fn empty() {
        let cache = ExpiringCache::<String>::new(Duration::minutes(5));
        assert_eq!(cache.get(epoch()), None);
        assert!(cache.entry().is_none());
        assert_eq!(cache.safety_margin(), Duration::minutes(5));
    }

    #[test_case(0, true; "at store time")]
    #[test_case(3299, true; "one second before the margin")]
    #[test_case(3300, false; "at the margin")]
    #[test_case(3600, false; "at expiration")]
    #[test_case(7200, false; "long after expiration")]
    fn margin_boundary(elapsed: i64, fresh: bool) {
        let now = epoch();
        let mut cache = ExpiringCache::new(Duration::minutes(5));
        let entry = cache.store("value".to_string(), now, Duration::hours(1));
        assert_eq!(entry.expires_at(), now + Duration::hours(1));

        let got = cache.get(now + Duration::seconds(elapsed));
        assert_eq!(got.is_some(), fresh, "{got:?}");
    }

    #[test]
    fn zero_margin_serves_until_expiration() {
        let now = epoch();
        let mut cache = ExpiringCache::new(Duration::ZERO);
        cache.store(42, now, Duration::seconds(86400));
        assert_eq!(cache.get(now + Duration::seconds(86399)), Some(42));
        assert_eq!(cache.get(now + Duration::seconds(86400)), None);
    }

    #[test_case(0)]
    #[test_case(-1)]
    #[test_case(-3600)]
    fn non_positive_ttl_is_expired(ttl: i64) {
        let now = epoch();
        let mut cache = ExpiringCache::new(Duration::ZERO);
        cache.store(42, now, Duration::seconds(ttl));
        assert_eq!(cache.get(now), None);
        assert!(cache.entry().is_some());
    }

    #[test]
    fn store_replaces_entry() {
        let now = epoch();
        let mut cache = ExpiringCache::new(Duration::ZERO);
        cache.store("a", now, Duration::seconds(10));
        cache.store("b", now, Duration::seconds(20));
        let entry = cache.entry().cloned();
        assert_eq!(
            entry,
            Some(CachedEntry::new("b", now + Duration::seconds(20)))
        );
        cache.clear();
        assert_eq!(cache.get(now), None);
    }

    #[test]
    fn huge_ttl_saturates() {
        let now = epoch();
        let mut cache = ExpiringCache::new(Duration::minutes(5));
        let entry = cache.store(1, now, Duration::MAX);
        assert_eq!(entry.expires_at(), PrimitiveDateTime::MAX.assume_utc());
        assert_eq!(cache.get(now), Some(1));
    }
}
