//! Per-domain rate limiting and deferred retries
//!
//! This module handles:
//! - Minimum delay between fetches to the same domain
//! - A min-heap of items parked until their domain may be fetched again
//!
//! All state sits behind one mutex so the limiter can be shared between the
//! fetch worker and the coordinator.

use crate::state::DomainState;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// An item waiting in the retry heap
struct Deferred<T> {
    due: Instant,
    seq: u64,
    item: T,
}

// BinaryHeap is a max-heap; reverse so the earliest due time pops first,
// and the lower sequence number wins ties
impl<T> Ord for Deferred<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for Deferred<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Deferred<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<T> Eq for Deferred<T> {}

struct Inner<T> {
    domains: HashMap<String, DomainState>,
    retries: BinaryHeap<Deferred<T>>,
    next_seq: u64,
}

/// Rate limiter with a retry heap
///
/// The limiter coordinates:
/// - Per-domain politeness (minimum time between requests)
/// - Items deferred until a given instant, popped in due order
pub struct RateLimiter<T> {
    min_delay: Duration,
    inner: Mutex<Inner<T>>,
}

impl<T> RateLimiter<T> {
    /// Creates a new rate limiter
    ///
    /// # Arguments
    ///
    /// * `min_delay` - Minimum time between two fetches to the same domain
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            inner: Mutex::new(Inner {
                domains: HashMap::new(),
                retries: BinaryHeap::new(),
                next_seq: 0,
            }),
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True if the domain may be fetched now
    pub fn can_fetch_now(&self, domain: &str) -> bool {
        self.can_fetch_at(domain, Instant::now())
    }

    /// True if the domain has never been fetched or `now` is at least
    /// `min_delay` past its last fetch
    pub fn can_fetch_at(&self, domain: &str, now: Instant) -> bool {
        self.lock()
            .domains
            .get(domain)
            .map_or(true, |state| state.can_request(self.min_delay, now))
    }

    /// Records a fetch to the domain
    pub fn mark_fetched(&self, domain: &str) {
        self.mark_fetched_at(domain, Instant::now());
    }

    pub fn mark_fetched_at(&self, domain: &str, now: Instant) {
        self.lock()
            .domains
            .entry(domain.to_string())
            .or_default()
            .record_request(now);
    }

    /// Earliest instant the domain may be fetched again
    pub fn next_allowed(&self, domain: &str) -> Instant {
        self.lock()
            .domains
            .get(domain)
            .and_then(|state| state.next_allowed(self.min_delay))
            .unwrap_or_else(Instant::now)
    }

    /// Parks an item until `when`
    ///
    /// The domain's deferral counter is bumped so summaries can show how
    /// often the politeness delay held work back.
    pub fn schedule_retry(&self, domain: &str, item: T, when: Instant) {
        let mut inner = self.lock();
        inner
            .domains
            .entry(domain.to_string())
            .or_default()
            .record_deferral();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.retries.push(Deferred {
            due: when,
            seq,
            item,
        });
    }

    /// Removes and returns the earliest retry if it is due
    pub fn pop_due(&self) -> Option<T> {
        self.pop_due_at(Instant::now())
    }

    pub fn pop_due_at(&self, now: Instant) -> Option<T> {
        let mut inner = self.lock();
        match inner.retries.peek() {
            Some(next) if next.due <= now => inner.retries.pop().map(|d| d.item),
            _ => None,
        }
    }

    /// Time until the earliest retry is due
    ///
    /// # Returns
    ///
    /// * `Some(Duration::ZERO)` - A retry is already due
    /// * `Some(duration)` - Time left until the earliest retry
    /// * `None` - No retries are parked
    pub fn time_until_next(&self) -> Option<Duration> {
        self.time_until_next_at(Instant::now())
    }

    pub fn time_until_next_at(&self, now: Instant) -> Option<Duration> {
        self.lock()
            .retries
            .peek()
            .map(|next| next.due.saturating_duration_since(now))
    }

    /// Number of parked retries
    pub fn pending_retries(&self) -> usize {
        self.lock().retries.len()
    }

    /// Number of times work for the domain was deferred
    pub fn deferrals(&self, domain: &str) -> u32 {
        self.lock()
            .domains
            .get(domain)
            .map_or(0, |state| state.deferred_count)
    }
}
