// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Requests waiting for their response.

use std::{
    collections::HashMap,
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{sync::oneshot, time::Instant};

use super::Protocol;

use crate::{
    frame::{tcp::TransactionId, Message},
    Error, Result,
};

pub(crate) type ResultSender = oneshot::Sender<Result<Message>>;

/// Identity of a pending request.
///
/// TCP requests are identified by their transaction id, RTU requests by the
/// order of submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingKey {
    Transaction(TransactionId),
    Sequence(u64),
}

#[derive(Debug)]
struct Entry {
    request: Message,
    sender: ResultSender,
    created: Instant,
}

#[derive(Debug, Default)]
struct Entries {
    by_key: HashMap<PendingKey, Entry>,
    next_sequence: u64,
    next_transaction_id: TransactionId,
}

impl Entries {
    fn allocate_key(&mut self, protocol: Protocol) -> Option<PendingKey> {
        match protocol {
            Protocol::Rtu => {
                let key = PendingKey::Sequence(self.next_sequence);
                self.next_sequence = self.next_sequence.wrapping_add(1);
                Some(key)
            }
            Protocol::Tcp => {
                // Skip transaction ids that are still in use after wrapping around.
                for _ in 0..=u16::MAX {
                    let key = PendingKey::Transaction(self.next_transaction_id);
                    self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
                    if !self.by_key.contains_key(&key) {
                        return Some(key);
                    }
                }
                None
            }
        }
    }
}

/// Concurrent table of pending requests.
///
/// Every entry is removed exactly once, either by a matching response, by
/// expiry, by cancellation or when the connection is lost. Removal and
/// resolution happen in a single step, so an entry can never be resolved
/// twice.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingTable {
    entries: Arc<Mutex<Entries>>,
}

impl PendingTable {
    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `request` and return its key.
    ///
    /// If no key is available the sender is resolved with an error
    /// immediately.
    pub(crate) fn insert(
        &self,
        protocol: Protocol,
        request: Message,
        sender: ResultSender,
    ) -> Option<PendingKey> {
        let mut entries = self.lock();
        let Some(key) = entries.allocate_key(protocol) else {
            drop(entries);
            let _ = sender.send(Err(Error::Transport(io::Error::new(
                io::ErrorKind::Other,
                "all transaction ids are in use",
            ))));
            return None;
        };
        entries.by_key.insert(
            key,
            Entry {
                request,
                sender,
                created: Instant::now(),
            },
        );
        Some(key)
    }

    /// A copy of the request if it is still pending.
    pub(crate) fn request(&self, key: PendingKey) -> Option<Message> {
        self.lock().by_key.get(&key).map(|entry| entry.request.clone())
    }

    pub(crate) fn take(&self, key: PendingKey) -> Option<(Message, ResultSender)> {
        self.lock()
            .by_key
            .remove(&key)
            .map(|Entry { request, sender, .. }| (request, sender))
    }

    /// Take the entry if its request satisfies `predicate`.
    pub(crate) fn take_if(
        &self,
        key: PendingKey,
        predicate: impl FnOnce(&Message) -> bool,
    ) -> Option<(Message, ResultSender)> {
        let mut entries = self.lock();
        if !entries.by_key.get(&key).is_some_and(|entry| predicate(&entry.request)) {
            return None;
        }
        entries
            .by_key
            .remove(&key)
            .map(|Entry { request, sender, .. }| (request, sender))
    }

    /// Remove the entry and resolve it with `result`.
    pub(crate) fn resolve(&self, key: PendingKey, result: Result<Message>) -> bool {
        let Some((_, sender)) = self.take(key) else {
            return false;
        };
        // The receiver may already be gone.
        let _ = sender.send(result);
        true
    }

    /// Resolve all entries older than `ttl` with a timeout.
    pub(crate) fn expire(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<_> = {
            let mut entries = self.lock();
            let keys: Vec<_> = entries
                .by_key
                .iter()
                .filter(|(_, entry)| now.saturating_duration_since(entry.created) >= ttl)
                .map(|(key, _)| *key)
                .collect();
            keys.into_iter()
                .filter_map(|key| entries.by_key.remove(&key).map(|entry| (key, entry)))
                .collect()
        };
        for (key, entry) in &expired {
            log::debug!(
                "Request {key:?} ({}) timed out",
                entry.request.function()
            );
        }
        let count = expired.len();
        for (_, entry) in expired {
            let _ = entry.sender.send(Err(Error::Timeout(ttl)));
        }
        count
    }

    /// Resolve all entries not accepted by `keep` with an error.
    pub(crate) fn fail_unless(
        &self,
        keep: impl Fn(&PendingKey) -> bool,
        error: impl Fn() -> Error,
    ) -> usize {
        let failed: Vec<_> = {
            let mut entries = self.lock();
            let keys: Vec<_> = entries
                .by_key
                .keys()
                .filter(|key| !keep(key))
                .copied()
                .collect();
            keys.into_iter()
                .filter_map(|key| entries.by_key.remove(&key))
                .collect()
        };
        let count = failed.len();
        for entry in failed {
            let _ = entry.sender.send(Err(error()));
        }
        count
    }

    pub(crate) fn fail_all(&self, error: impl Fn() -> Error) -> usize {
        self.fail_unless(|_| false, error)
    }

    pub(crate) fn contains(&self, key: PendingKey) -> bool {
        self.lock().by_key.contains_key(&key)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().by_key.len()
    }
}
