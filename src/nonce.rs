//! Registry of issued server nonces.
//!
//! Every challenge sent to a client carries a fresh nonce. The registry keeps,
//! for each live nonce, the highest `nc` counter accepted so far, so a captured
//! request cannot be replayed. Nonces idle for longer than the inactivity limit
//! are dropped by [`NonceRegistry::expire`]; scheduling that sweep is up to the
//! caller.
//!
//! The table sits behind a single mutex. Every operation is a short in-memory
//! map access, and the check-and-update in [`NonceRegistry::record_success`]
//! happens under the same lock as the read it depends on.

use crate::utils::random_token;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default idle time after which a nonce is forgotten
pub const DEFAULT_INACTIVITY_LIMIT: Duration = Duration::from_secs(12 * 60 * 60);

/// Default cap on the number of live nonces
pub const DEFAULT_MAX_LIVE_NONCES: usize = 65_536;

/// When the table is full of active nonces, this fraction of the cap is evicted at
/// once, so the following issues don't have to scan the table again
const EVICTION_BATCH_DIVISOR: usize = 16;

/// Nonce registry tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonceConfig {
    /// Nonces not used for longer than this are removed by a sweep
    pub inactivity_limit: Duration,
    /// When this many nonces are live, `issue()` sweeps inline before inserting,
    /// and evicts a batch of the longest-idle nonces if the sweep freed nothing
    pub max_live_nonces: usize,
}

impl Default for NonceConfig {
    fn default() -> Self {
        NonceConfig {
            inactivity_limit: DEFAULT_INACTIVITY_LIMIT,
            max_live_nonces: DEFAULT_MAX_LIVE_NONCES,
        }
    }
}

impl NonceConfig {
    pub fn set_inactivity_limit(mut self, limit: Duration) -> Self {
        self.inactivity_limit = limit;
        self
    }

    pub fn set_max_live_nonces(mut self, max: usize) -> Self {
        self.max_live_nonces = max.max(1);
        self
    }
}

/// State kept for one issued nonce
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonceRecord {
    pub issued_at: Instant,
    /// Time of issue, or of the last accepted request
    pub last_used_at: Instant,
    /// Highest accepted `nc`; 0 until the first successful use
    pub last_counter: u64,
}

impl NonceRecord {
    fn new(now: Instant) -> Self {
        NonceRecord {
            issued_at: now,
            last_used_at: now,
            last_counter: 0,
        }
    }

    fn is_idle(&self, now: Instant, limit: Duration) -> bool {
        now.saturating_duration_since(self.last_used_at) > limit
    }
}

#[derive(Debug, Default)]
pub struct NonceRegistry {
    nonces: Mutex<HashMap<String, NonceRecord>>,
    config: NonceConfig,
}

impl NonceRegistry {
    pub fn new(config: NonceConfig) -> Self {
        NonceRegistry {
            nonces: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &NonceConfig {
        &self.config
    }

    /// Issue a new nonce, unique among the live ones
    pub fn issue(&self) -> String {
        self.issue_at(Instant::now())
    }

    pub fn issue_at(&self, now: Instant) -> String {
        let mut nonces = self.nonces.lock();

        if nonces.len() >= self.config.max_live_nonces {
            self.make_room(&mut nonces, now);
        }

        let token = loop {
            let candidate = random_token();
            if !nonces.contains_key(&candidate) {
                break candidate;
            }
        };

        nonces.insert(token.clone(), NonceRecord::new(now));
        tracing::debug!(live = nonces.len(), "issued nonce");
        token
    }

    /// Register a specific token, replacing any previous record for it
    #[cfg(test)]
    pub(crate) fn register(&self, token: &str, now: Instant) {
        self.nonces
            .lock()
            .insert(token.to_owned(), NonceRecord::new(now));
    }

    fn make_room(&self, nonces: &mut HashMap<String, NonceRecord>, now: Instant) {
        let limit = self.config.inactivity_limit;
        let before = nonces.len();
        nonces.retain(|_, record| !record.is_idle(now, limit));

        if nonces.len() < self.config.max_live_nonces {
            tracing::debug!(removed = before - nonces.len(), "inline nonce sweep");
            return;
        }

        // still full, drop a batch of whatever has been idle the longest
        let batch = (self.config.max_live_nonces / EVICTION_BATCH_DIVISOR).max(1);
        let mut by_age: Vec<(Instant, &String)> = nonces
            .iter()
            .map(|(token, record)| (record.last_used_at, token))
            .collect();

        let batch = batch.min(by_age.len());
        if batch < by_age.len() {
            by_age.select_nth_unstable_by_key(batch, |(used, _)| *used);
        }

        let victims: Vec<String> = by_age[..batch]
            .iter()
            .map(|(_, token)| (*token).clone())
            .collect();

        for token in &victims {
            nonces.remove(token);
        }

        tracing::warn!(
            max = self.config.max_live_nonces,
            evicted = victims.len(),
            "nonce table full, evicted the longest idle nonces"
        );
    }

    /// Get a snapshot of the record for a token
    pub fn get(&self, token: &str) -> Option<NonceRecord> {
        self.nonces.lock().get(token).copied()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.nonces.lock().contains_key(token)
    }

    /// Commit a successfully validated use of a nonce.
    ///
    /// Only call this after the response digest was verified. The counter must be
    /// strictly greater than the last accepted one; otherwise (or if the nonce is
    /// gone) nothing changes and `false` is returned.
    pub fn record_success(&self, token: &str, counter: u64, now: Instant) -> bool {
        let mut nonces = self.nonces.lock();
        match nonces.get_mut(token) {
            Some(record) if counter > record.last_counter => {
                record.last_counter = counter;
                record.last_used_at = now;
                true
            }
            _ => false,
        }
    }

    /// Remove every nonce idle for longer than `limit`. Returns the number removed.
    pub fn expire(&self, now: Instant, limit: Duration) -> usize {
        let mut nonces = self.nonces.lock();
        let before = nonces.len();
        nonces.retain(|_, record| !record.is_idle(now, limit));

        let removed = before - nonces.len();
        if removed > 0 {
            tracing::info!(removed, live = nonces.len(), "expired idle nonces");
        }
        removed
    }

    /// Sweep with the configured inactivity limit
    pub fn expire_stale(&self) -> usize {
        self.expire_stale_at(Instant::now())
    }

    pub fn expire_stale_at(&self, now: Instant) -> usize {
        self.expire(now, self.config.inactivity_limit)
    }

    /// Number of live nonces
    pub fn len(&self) -> usize {
        self.nonces.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    #[test]
    fn test_issue() {
        let registry = NonceRegistry::default();
        let now = Instant::now();
        let a = registry.issue_at(now);
        let b = registry.issue_at(now);

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        let record = registry.get(&a).unwrap();
        assert_eq!(record.last_counter, 0);
        assert_eq!(record.issued_at, now);
        assert_eq!(record.last_used_at, now);
        assert!(registry.get("not-issued").is_none());
    }

    #[test]
    fn test_counter_must_increase() {
        let registry = NonceRegistry::default();
        let now = Instant::now();
        let token = registry.issue_at(now);

        // 0 is the unused sentinel and never accepted
        assert!(!registry.record_success(&token, 0, now));

        assert!(registry.record_success(&token, 1, now));
        assert!(!registry.record_success(&token, 1, now));
        assert!(registry.record_success(&token, 5, now + HOUR));
        assert!(!registry.record_success(&token, 3, now + HOUR));

        let record = registry.get(&token).unwrap();
        assert_eq!(record.last_counter, 5);
        assert_eq!(record.last_used_at, now + HOUR);
        assert_eq!(record.issued_at, now);

        assert!(!registry.record_success("not-issued", 1, now));
    }

    #[test]
    fn test_expire_by_inactivity() {
        let registry = NonceRegistry::default();
        let now = Instant::now();
        let idle = registry.issue_at(now);
        let active = registry.issue_at(now);

        // keep one in use; expiry counts from last use, not from issue
        assert!(registry.record_success(&active, 1, now + 10 * HOUR));

        assert_eq!(registry.expire(now + 12 * HOUR, DEFAULT_INACTIVITY_LIMIT), 0);
        assert_eq!(registry.expire(now + 13 * HOUR, DEFAULT_INACTIVITY_LIMIT), 1);

        assert!(!registry.contains(&idle));
        assert!(registry.contains(&active));

        assert_eq!(registry.expire(now + 23 * HOUR, DEFAULT_INACTIVITY_LIMIT), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cap_triggers_inline_sweep() {
        let config = NonceConfig::default()
            .set_inactivity_limit(HOUR)
            .set_max_live_nonces(2);
        let registry = NonceRegistry::new(config);
        let now = Instant::now();

        let old = registry.issue_at(now);
        let fresh = registry.issue_at(now + HOUR);
        // `old` has been idle past the limit and is swept to make room
        let newest = registry.issue_at(now + 2 * HOUR);

        assert_eq!(registry.len(), 2);
        assert!(!registry.contains(&old));
        assert!(registry.contains(&fresh));
        assert!(registry.contains(&newest));
    }

    #[test]
    fn test_cap_evicts_longest_idle() {
        let registry = NonceRegistry::new(NonceConfig::default().set_max_live_nonces(2));
        let now = Instant::now();

        let a = registry.issue_at(now);
        let b = registry.issue_at(now + Duration::from_secs(1));
        assert!(registry.record_success(&a, 1, now + Duration::from_secs(2)));

        let c = registry.issue_at(now + Duration::from_secs(3));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&a));
        assert!(!registry.contains(&b));
        assert!(registry.contains(&c));
    }

    #[test]
    fn test_cap_evicts_in_batches() {
        // batch of 32 / 16 = 2
        let registry = NonceRegistry::new(NonceConfig::default().set_max_live_nonces(32));
        let now = Instant::now();

        let tokens: Vec<String> = (0..32u64)
            .map(|i| registry.issue_at(now + Duration::from_secs(i)))
            .collect();

        let extra = registry.issue_at(now + Duration::from_secs(100));
        assert_eq!(registry.len(), 31);
        assert!(!registry.contains(&tokens[0]));
        assert!(!registry.contains(&tokens[1]));
        assert!(tokens[2..].iter().all(|t| registry.contains(t)));
        assert!(registry.contains(&extra));

        // there is room again, nothing else is evicted
        registry.issue_at(now + Duration::from_secs(101));
        assert_eq!(registry.len(), 32);
        assert!(tokens[2..].iter().all(|t| registry.contains(t)));
    }

    #[test]
    fn test_expire_stale_uses_configured_limit() {
        let config = NonceConfig::default().set_inactivity_limit(Duration::from_secs(60));
        let registry = NonceRegistry::new(config);
        let now = Instant::now();
        let token = registry.issue_at(now);

        assert_eq!(registry.expire_stale_at(now + Duration::from_secs(60)), 0);
        assert!(registry.contains(&token));

        assert_eq!(registry.expire_stale_at(now + Duration::from_secs(61)), 1);
        assert!(!registry.contains(&token));
    }

    #[test]
    fn test_concurrent_counters_never_go_backwards() {
        let registry = Arc::new(NonceRegistry::default());
        let token = registry.issue();

        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let registry = Arc::clone(&registry);
                let token = token.clone();
                thread::spawn(move || {
                    let mut accepted = 0u32;
                    for i in 0..200u64 {
                        if registry.record_success(&token, i * 8 + t + 1, Instant::now()) {
                            accepted += 1;
                        }
                    }
                    accepted
                })
            })
            .collect();

        let accepted: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert!(accepted >= 1);
        assert_eq!(registry.get(&token).unwrap().last_counter, 1600);
    }

    #[test]
    fn test_concurrent_issue_is_unique() {
        let registry = Arc::new(NonceRegistry::default());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || (0..250).map(|_| registry.issue()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        all.dedup();

        assert_eq!(all.len(), 1000);
        assert_eq!(registry.len(), 1000);
    }
}
