//! The table of in-flight physical transfers.

use crate::cancel::{AbortSource, CancellationToken, CancelledBy};
use crate::descriptor::Descriptor;
use crate::error::Error;
use crate::key::RequestKey;
use crate::retry::RetryPolicy;
use crate::waiter::{Handle, Target, Waiter};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::{CancellationToken as Signal, DropGuard};

/// Where an in-flight entry is in its lifecycle.
///
/// Terminal outcomes are not phases: an entry leaves the registry as soon as
/// it reaches one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Created; its first attempt has not started yet.
    Idle,
    /// A transport call is outstanding.
    Attempting,
    /// An attempt failed and the next one is pending, possibly after a backoff.
    Retrying,
}

/// A read-only snapshot of an in-flight entry.
#[derive(Clone, Debug)]
pub struct InFlight {
    /// The entry's key.
    pub key: RequestKey,
    /// The descriptor sent on every attempt, after middleware.
    pub descriptor: Arc<Descriptor>,
    /// Lifecycle phase.
    pub phase: Phase,
    /// Number of attempts started so far.
    pub attempts: u32,
    /// Retries left.
    pub retries_remaining: u32,
    /// Number of attached waiters.
    pub waiters: usize,
    /// Timeout applied to each attempt.
    pub timeout: Option<Duration>,
    /// What cancelled the current attempt, if anything did.
    pub cancelled_by: Option<CancelledBy>,
    /// The most recent classified failure.
    pub last_error: Option<Error>,
}

/// The unit of physical work for one key.
#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) key: RequestKey,
    pub(crate) descriptor: Arc<Descriptor>,
    pub(crate) abort: AbortSource,
    pub(crate) token: CancellationToken,
    pub(crate) phase: Phase,
    pub(crate) attempts: u32,
    pub(crate) retries_remaining: u32,
    pub(crate) timeout: Option<Duration>,
    pub(crate) policy: RetryPolicy,
    pub(crate) waiters: Vec<Waiter>,
    pub(crate) last_error: Option<Error>,
    /// Cancelled when the entry is dropped; ends external-abort watchers.
    pub(crate) done: Signal,
    _done: DropGuard,
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    entries: HashMap<RequestKey, Entry>,
    owners: HashMap<Handle, RequestKey>,
}

// ===== impl Entry =====

impl Entry {
    pub(crate) fn new(
        key: RequestKey,
        descriptor: Descriptor,
        retries: u32,
        timeout: Option<Duration>,
        policy: RetryPolicy,
    ) -> Self {
        let abort = AbortSource::new();
        let token = CancellationToken::new(&abort, timeout);
        let done = Signal::new();
        Entry {
            key,
            descriptor: Arc::new(descriptor),
            abort,
            token,
            phase: Phase::Idle,
            attempts: 0,
            retries_remaining: retries,
            timeout,
            policy,
            waiters: Vec::new(),
            last_error: None,
            done: done.clone(),
            _done: done.drop_guard(),
        }
    }

    /// Starts the next attempt, returning its token and number.
    pub(crate) fn begin_attempt(&mut self) -> (CancellationToken, u32) {
        self.token = CancellationToken::new(&self.abort, self.timeout);
        self.attempts += 1;
        self.phase = Phase::Attempting;
        (self.token.clone(), self.attempts)
    }

    pub(crate) fn snapshot(&self) -> InFlight {
        InFlight {
            key: self.key,
            descriptor: self.descriptor.clone(),
            phase: self.phase,
            attempts: self.attempts,
            retries_remaining: self.retries_remaining,
            waiters: self.waiters.len(),
            timeout: self.token.timeout(),
            cancelled_by: self.token.cancelled_by(),
            last_error: self.last_error.clone(),
        }
    }
}

// ===== impl Registry =====

impl Registry {
    /// Attaches `waiter` to the entry for `key`, creating the entry with
    /// `create` if absent. The flag is `true` when the entry was created.
    pub(crate) fn get_or_create<F>(
        &mut self,
        key: RequestKey,
        waiter: Waiter,
        create: F,
    ) -> (&mut Entry, bool)
    where
        F: FnOnce() -> Entry,
    {
        let mut created = false;
        let entry = self.entries.entry(key).or_insert_with(|| {
            created = true;
            create()
        });
        self.owners.insert(waiter.handle(), key);
        entry.waiters.push(waiter);
        (entry, created)
    }

    pub(crate) fn find(&self, target: &Target) -> Option<&Entry> {
        self.entries.get(self.resolve(target)?)
    }

    pub(crate) fn find_mut(&mut self, target: &Target) -> Option<&mut Entry> {
        let key = *self.resolve(target)?;
        self.entries.get_mut(&key)
    }

    pub(crate) fn get_mut(&mut self, key: &RequestKey) -> Option<&mut Entry> {
        self.entries.get_mut(key)
    }

    /// Removes a terminal entry, handing back its waiters for notification.
    pub(crate) fn remove(&mut self, key: &RequestKey) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        for waiter in &entry.waiters {
            self.owners.remove(&waiter.handle());
        }
        Some(entry)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn resolve<'a>(&'a self, target: &'a Target) -> Option<&'a RequestKey> {
        match target {
            Target::Key(key) => Some(key),
            Target::Handle(handle) => self.owners.get(handle),
        }
    }
}
