use std::time::{Duration, Instant};

/// Tracks the state of a domain during crawling
///
/// This structure maintains the per-domain information needed for rate
/// limiting: how many requests were made and when the last one started.
#[derive(Debug, Clone, Default)]
pub struct DomainState {
    /// Number of requests made to this domain in the current crawl
    pub request_count: u32,

    /// Timestamp of the last request to this domain
    pub last_request_time: Option<Instant>,

    /// Number of times a fetch had to be deferred because it came too early
    pub deferred_count: u32,
}

impl DomainState {
    /// Creates a new DomainState with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if a request can be made to this domain
    ///
    /// # Arguments
    ///
    /// * `min_delay` - Minimum time between two requests to the same domain
    /// * `now` - The current time instant
    ///
    /// # Returns
    ///
    /// * `true` - If no request was made yet, or `now >= last + min_delay`
    /// * `false` - If the request should be delayed
    pub fn can_request(&self, min_delay: Duration, now: Instant) -> bool {
        match self.last_request_time {
            Some(last) => now >= last + min_delay,
            None => true,
        }
    }

    /// Records that a request was made to this domain
    ///
    /// Updates the request count and last request time.
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Records that a request to this domain had to be deferred
    pub fn record_deferral(&mut self) {
        self.deferred_count += 1;
    }

    /// Earliest instant at which the next request is allowed
    ///
    /// Returns None if the domain has never been requested.
    pub fn next_allowed(&self, min_delay: Duration) -> Option<Instant> {
        self.last_request_time.map(|last| last + min_delay)
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, min_delay: Duration, now: Instant) -> Option<Duration> {
        let next = self.next_allowed(min_delay)?;
        if now < next {
            Some(next - now)
        } else {
            None
        }
    }
}
