//! In-memory ephemeral token store.
//!
//! Maps opaque, cryptographically random tokens to typed payloads that
//! expire after a time-to-live. Used to carry a session transfer across the
//! browser redirects between hosts.
//!
//! # Architecture
//!
//! - **Entries**: `DashMap<token, Entry>` with sharded locks; unrelated
//!   tokens never contend
//! - **Expiry queue**: min-heap of `(expires_at, token)` records, walked from
//!   the earliest expiry by the cleanup sweep
//! - **Inbox**: new expiry records land in a short-held `Vec` that the sweep
//!   drains into the heap, so writers never wait for a running sweep
//! - **Atomic consumption**: `retrieve_and_delete` removes through
//!   `DashMap::remove_if`, so exactly one caller wins a token
//!
//! # Cleanup
//!
//! Every operation runs an opportunistic sweep. Because the queue is ordered
//! by expiry (not by insertion), the sweep may stop at the first record that
//! is still live even when callers use different TTLs. Records left behind by
//! [`TokenStore::push`] are harmless: an entry is only removed when its
//! *current* expiry has passed. The sweep itself is serialized with a
//! `try_lock`; a caller that finds it running skips it instead of waiting.
//!
//! # Example
//!
//! ```
//! use session_bridge_auth::stores::TokenStore;
//! use std::time::Duration;
//!
//! let store = TokenStore::new();
//! let token = store.save(String::from("https://b.example/"), Duration::from_secs(60))?;
//!
//! assert_eq!(store.peek::<String>(&token).as_deref(), Some("https://b.example/"));
//! assert_eq!(store.retrieve_and_delete::<String>(&token).as_deref(), Some("https://b.example/"));
//! assert!(store.retrieve_and_delete::<String>(&token).is_none());
//! # Ok::<(), session_bridge_auth::TransferError>(())
//! ```

use crate::constants::TOKEN_LENGTH;
use crate::error::{Result, TransferError};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use rand::RngCore;
use rand::rngs::OsRng;
use std::any::Any;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::{Mutex, TryLockError};
use std::time::{Duration, Instant};

const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Largest multiple of the alphabet size that fits in a byte; bytes at or
/// above it are rejected to keep the symbol distribution uniform.
const REJECTION_BOUND: u8 = 248;

/// Opaque transfer token.
///
/// 32 alphanumeric characters from the operating system's secure random
/// source. The value never shows up in `Debug` output and has no `Display`
/// implementation; use [`TransferToken::as_str`] where the raw value is
/// really needed (URLs, session attributes).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransferToken(String);

impl TransferToken {
    /// Parse a token received from a request.
    ///
    /// Returns `None` unless the input is exactly 32 ASCII alphanumeric
    /// characters; malformed input is treated like an unknown token.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        (raw.len() == TOKEN_LENGTH && raw.bytes().all(|b| b.is_ascii_alphanumeric()))
            .then(|| Self(raw.to_string()))
    }

    /// The raw token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn generate() -> Result<Self> {
        let mut token = String::with_capacity(TOKEN_LENGTH);
        let mut buf = [0_u8; TOKEN_LENGTH * 2];

        while token.len() < TOKEN_LENGTH {
            OsRng
                .try_fill_bytes(&mut buf)
                .map_err(|e| TransferError::TokenGeneration(e.to_string()))?;

            for byte in buf {
                if token.len() == TOKEN_LENGTH {
                    break;
                }
                if byte < REJECTION_BOUND {
                    token.push(char::from(ALPHABET[usize::from(byte % 62)]));
                }
            }
        }

        Ok(Self(token))
    }
}

impl fmt::Debug for TransferToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransferToken(<redacted>)")
    }
}

type ExpiryRecord = Reverse<(Instant, TransferToken)>;

struct Entry {
    payload: Box<dyn Any + Send + Sync>,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// Ephemeral token store with single-use retrieval.
///
/// # Thread Safety
///
/// All operations take `&self` and are safe to call from any number of
/// request handlers at once. Share it through an `Arc`; the
/// [`TransferCoordinator`](crate::TransferCoordinator) owns exactly one.
pub struct TokenStore {
    entries: DashMap<TransferToken, Entry>,
    expiry_queue: Mutex<BinaryHeap<ExpiryRecord>>,
    inbox: Mutex<Vec<ExpiryRecord>>,
}

impl TokenStore {
    /// Create an empty token store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            expiry_queue: Mutex::new(BinaryHeap::new()),
            inbox: Mutex::new(Vec::new()),
        }
    }

    /// Store a payload and return the fresh token it can be retrieved with.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::TokenGeneration`] if the secure random
    /// source fails.
    pub fn save<T>(&self, payload: T, ttl: Duration) -> Result<TransferToken>
    where
        T: Any + Send + Sync,
    {
        let expires_at = Instant::now() + ttl;
        let payload: Box<dyn Any + Send + Sync> = Box::new(payload);

        let token = loop {
            let candidate = TransferToken::generate()?;
            match self.entries.entry(candidate.clone()) {
                MapEntry::Vacant(vacant) => {
                    vacant.insert(Entry {
                        payload,
                        expires_at,
                    });
                    break candidate;
                }
                MapEntry::Occupied(mut occupied) if occupied.get().is_expired(Instant::now()) => {
                    occupied.insert(Entry {
                        payload,
                        expires_at,
                    });
                    break candidate;
                }
                MapEntry::Occupied(_) => {
                    tracing::warn!("token collision with a live entry, generating another one");
                }
            }
        };

        self.schedule(expires_at, token.clone());
        self.sweep();
        Ok(token)
    }

    /// Read a payload without consuming it.
    ///
    /// Returns `None` if the token is unknown, expired, or stores something
    /// other than a `T`.
    #[must_use]
    pub fn peek<T>(&self, token: &TransferToken) -> Option<T>
    where
        T: Any + Clone,
    {
        self.sweep();
        let now = Instant::now();
        let entry = self.entries.get(token)?;
        if entry.is_expired(now) {
            return None;
        }
        entry.payload.downcast_ref::<T>().cloned()
    }

    /// Read and remove a payload in one atomic step.
    ///
    /// At most one caller ever receives `Some` for a given token. A payload
    /// of another type yields `None` and stays in place; an expired entry is
    /// removed and yields `None`.
    #[must_use]
    pub fn retrieve_and_delete<T>(&self, token: &TransferToken) -> Option<T>
    where
        T: Any,
    {
        self.sweep();
        let now = Instant::now();
        let (_, entry) = self
            .entries
            .remove_if(token, |_, entry| entry.is_expired(now) || entry.payload.is::<T>())?;

        if entry.is_expired(now) {
            return None;
        }
        entry.payload.downcast::<T>().ok().map(|payload| *payload)
    }

    /// Replace a live entry's payload and restart its time-to-live.
    ///
    /// The token stays the same. Returns `false`, changing nothing, if the
    /// token is unknown or expired.
    pub fn push<T>(&self, token: &TransferToken, payload: T, ttl: Duration) -> bool
    where
        T: Any + Send + Sync,
    {
        self.sweep();
        let now = Instant::now();
        let expires_at = now + ttl;

        let replaced = match self.entries.get_mut(token) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.payload = Box::new(payload);
                entry.expires_at = expires_at;
                true
            }
            _ => false,
        };

        if replaced {
            self.schedule(expires_at, token.clone());
        }
        replaced
    }

    /// Number of entries held, including expired ones not yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn schedule(&self, expires_at: Instant, token: TransferToken) {
        let mut inbox = match self.inbox.lock() {
            Ok(inbox) => inbox,
            Err(poisoned) => poisoned.into_inner(),
        };
        inbox.push(Reverse((expires_at, token)));
    }

    fn sweep(&self) {
        let mut queue = match self.expiry_queue.try_lock() {
            Ok(queue) => queue,
            Err(TryLockError::WouldBlock) => return,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let scheduled = {
            let mut inbox = match self.inbox.lock() {
                Ok(inbox) => inbox,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *inbox)
        };
        queue.extend(scheduled);

        let now = Instant::now();
        let mut removed = 0_usize;
        loop {
            match queue.peek() {
                Some(Reverse((expires_at, _))) if *expires_at <= now => {}
                _ => break,
            }
            let Some(Reverse((_, token))) = queue.pop() else {
                break;
            };
            if self
                .entries
                .remove_if(&token, |_, entry| entry.is_expired(now))
                .is_some()
            {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(
                removed,
                remaining = self.entries.len(),
                "swept expired transfer tokens"
            );
        }
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const LONG: Duration = Duration::from_secs(60);

    #[test]
    fn test_save_and_retrieve_once() {
        let store = TokenStore::new();
        let token = store.save(35_u32, LONG).unwrap();

        assert_eq!(token.as_str().len(), 32);
        assert_eq!(store.peek::<u32>(&token), Some(35));
        assert_eq!(store.peek::<u32>(&token), Some(35), "peek must not consume");
        assert_eq!(store.retrieve_and_delete::<u32>(&token), Some(35));
        assert_eq!(store.retrieve_and_delete::<u32>(&token), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_tokens_are_unique_and_alphanumeric() {
        let store = TokenStore::new();
        let first = store.save((), LONG).unwrap();
        let second = store.save((), LONG).unwrap();

        assert_ne!(first, second);
        for token in [&first, &second] {
            assert!(token.as_str().bytes().all(|b| b.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_unknown_token_is_absent() {
        let store = TokenStore::new();
        store.save(1_u8, LONG).unwrap();

        let unknown = TransferToken::parse("abcdefghijklmnopqrstuvwxyz012345").unwrap();
        assert_eq!(store.peek::<u8>(&unknown), None);
        assert_eq!(store.retrieve_and_delete::<u8>(&unknown), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_type_mismatch_is_absent_and_keeps_entry() {
        let store = TokenStore::new();
        let token = store.save(35_i32, LONG).unwrap();

        assert_eq!(store.peek::<String>(&token), None);
        assert_eq!(store.retrieve_and_delete::<String>(&token), None);
        assert_eq!(store.retrieve_and_delete::<i32>(&token), Some(35));
    }

    #[test]
    fn test_expired_entry_is_absent() {
        let store = TokenStore::new();
        let token = store.save("x".to_string(), Duration::from_millis(200)).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(store.peek::<String>(&token).as_deref(), Some("x"));

        let token = store.save("y".to_string(), Duration::from_millis(200)).unwrap();
        thread::sleep(Duration::from_millis(300));
        assert_eq!(store.peek::<String>(&token), None);
        assert_eq!(store.retrieve_and_delete::<String>(&token), None);
    }

    #[test]
    fn test_push_replaces_payload_and_renews_ttl() {
        let store = TokenStore::new();
        let token = store.save(1_u32, Duration::from_millis(150)).unwrap();

        assert!(store.push(&token, 2_u32, LONG));
        thread::sleep(Duration::from_millis(250));

        assert_eq!(store.peek::<u32>(&token), Some(2));
        assert_eq!(store.len(), 1, "stale queue record must not evict the renewed entry");
    }

    #[test]
    fn test_push_can_shorten_ttl() {
        let store = TokenStore::new();
        let token = store.save(1_u32, LONG).unwrap();

        assert!(store.push(&token, 2_u32, Duration::from_millis(100)));
        thread::sleep(Duration::from_millis(200));

        assert_eq!(store.peek::<u32>(&token), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_push_unknown_token_is_noop() {
        let store = TokenStore::new();
        let unknown = TransferToken::parse("ABCDEFGHIJKLMNOPQRSTUVWXYZ012345").unwrap();

        assert!(!store.push(&unknown, 1_u32, LONG));
        assert!(store.is_empty());
    }

    #[test]
    fn test_cleanup_removes_all_expired_entries() {
        let store = TokenStore::new();
        for _ in 0..10 {
            store.save((), Duration::from_millis(200)).unwrap();
        }
        assert_eq!(store.len(), 10);

        thread::sleep(Duration::from_millis(300));
        let bogus = TransferToken::parse("00000000000000000000000000000000").unwrap();
        let _ = store.peek::<()>(&bogus);

        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_cleanup_is_partial_while_entries_live() {
        let store = TokenStore::new();
        for _ in 0..10 {
            store.save((), Duration::from_millis(200)).unwrap();
        }
        thread::sleep(Duration::from_millis(100));
        for _ in 0..10 {
            store.save((), Duration::from_millis(200)).unwrap();
        }
        assert_eq!(store.len(), 20);

        thread::sleep(Duration::from_millis(150));
        let bogus = TransferToken::parse("bogusbogusbogusbogusbogusbogus00").unwrap();
        let _ = store.retrieve_and_delete::<()>(&bogus);
        assert_eq!(store.len(), 10);

        thread::sleep(Duration::from_millis(100));
        let _ = store.retrieve_and_delete::<()>(&bogus);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_cleanup_handles_mixed_ttls() {
        let store = TokenStore::new();
        store.save((), LONG).unwrap();
        store.save((), Duration::from_millis(50)).unwrap();
        thread::sleep(Duration::from_millis(100));

        let _ = store.save((), LONG).unwrap();
        assert_eq!(store.len(), 2, "short-lived entry behind a long-lived one is still swept");
    }

    #[test]
    fn test_writes_do_not_wait_for_running_sweep() {
        let store = Arc::new(TokenStore::new());
        let sweeping = store.expiry_queue.lock().unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let token = store.save(1_u32, Duration::from_millis(50)).unwrap();
                let pushed = store.push(&token, 2_u32, Duration::from_millis(50));
                tx.send(pushed).unwrap();
            })
        };

        let pushed = rx
            .recv_timeout(Duration::from_millis(500))
            .expect("save and push complete while a sweep holds the queue");
        assert!(pushed);
        drop(sweeping);
        writer.join().unwrap();

        thread::sleep(Duration::from_millis(100));
        let _ = store.save((), LONG).unwrap();
        assert_eq!(store.len(), 1, "records written during the sweep are swept later");
    }

    #[test]
    fn test_concurrent_retrieve_has_single_winner() {
        for _ in 0..50 {
            let store = Arc::new(TokenStore::new());
            let token = store.save("payload".to_string(), LONG).unwrap();

            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let token = token.clone();
                    thread::spawn(move || store.retrieve_and_delete::<String>(&token))
                })
                .collect();

            let winners = handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(Option::is_some)
                .count();
            assert_eq!(winners, 1, "exactly one concurrent caller may redeem a token");
        }
    }

    #[test]
    fn test_parse_rejects_malformed_tokens() {
        assert!(TransferToken::parse("short").is_none());
        assert!(TransferToken::parse("abcdefghijklmnopqrstuvwxyz01234-").is_none());
        assert!(TransferToken::parse("abcdefghijklmnopqrstuvwxyz0123456").is_none());
        assert!(TransferToken::parse("abcdefghijklmnopqrstuvwxyz012345").is_some());
    }

    #[test]
    fn test_debug_never_reveals_token() {
        let store = TokenStore::new();
        let token = store.save((), LONG).unwrap();
        let rendered = format!("{token:?}");
        assert!(!rendered.contains(token.as_str()));
    }
}
