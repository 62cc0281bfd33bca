use std::{
    collections::HashMap,
    hash::Hash,
    io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

use crate::{error::Error, util::Sequence};

/// Shared, monotonic marker of the current playback context.  The engine
/// advances it whenever the displayed subject changes; background work holds
/// a copy of the value it started under and compares with `is_current`.
#[derive(Clone, Default)]
pub struct GenerationCounter {
    value: Arc<AtomicU64>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to a new generation and return it.
    pub fn advance(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

/// Result of a background fetch, tagged with everything the receiver needs
/// to decide whether it still cares.
#[derive(Debug)]
pub struct Fetched<K, T> {
    pub key: K,
    pub generation: u64,
    pub ticket: u64,
    pub result: Result<T, Error>,
}

/// Runs retrievals on worker threads and reports results back as messages.
///
/// At most one fetch per key is of interest at any time.  Starting a fetch
/// for a key that is already in flight supersedes the earlier one: its
/// result still arrives, but `complete` reports it as outdated.
pub struct FetchCoordinator<K, M> {
    sender: Sender<M>,
    timeout: Duration,
    tickets: Sequence<u64>,
    in_flight: HashMap<K, u64>,
}

impl<K, M> FetchCoordinator<K, M>
where
    K: Clone + Eq + Hash + Send + 'static,
    M: Send + 'static,
{
    pub fn new(sender: Sender<M>, timeout: Duration) -> Self {
        Self {
            sender,
            timeout,
            tickets: Sequence::new(1),
            in_flight: HashMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `op` bounded by the fetch timeout and deliver the result, wrapped
    /// by `wrap`, through the message channel.
    pub fn fetch<T, F, W>(&mut self, key: K, generation: u64, op: F, wrap: W) -> u64
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, Error> + Send + 'static,
        W: FnOnce(Fetched<K, T>) -> M + Send + 'static,
    {
        let timeout = self.timeout;
        self.spawn(key, generation, move || run_with_timeout(timeout, op), wrap)
    }

    /// Like `fetch`, but without the overall time bound.  For composite
    /// operations that bound each of their own steps.
    pub fn run<T, F, W>(&mut self, key: K, generation: u64, op: F, wrap: W) -> u64
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, Error> + Send + 'static,
        W: FnOnce(Fetched<K, T>) -> M + Send + 'static,
    {
        self.spawn(key, generation, op, wrap)
    }

    fn spawn<T, F, W>(&mut self, key: K, generation: u64, op: F, wrap: W) -> u64
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, Error> + Send + 'static,
        W: FnOnce(Fetched<K, T>) -> M + Send + 'static,
    {
        let ticket = self.tickets.advance();
        if self.in_flight.insert(key.clone(), ticket).is_some() {
            log::debug!("superseding in-flight fetch");
        }
        thread::spawn({
            let sender = self.sender.clone();
            move || {
                let result = op();
                let fetched = Fetched {
                    key,
                    generation,
                    ticket,
                    result,
                };
                // The receiving side might be gone already, that's fine.
                let _ = sender.send(wrap(fetched));
            }
        });
        ticket
    }

    /// Mark the fetch behind `ticket` as finished.  Returns `true` only if it
    /// was the most recent fetch for `key`.
    pub fn complete(&mut self, key: &K, ticket: u64) -> bool {
        match self.in_flight.get(key) {
            Some(&latest) if latest == ticket => {
                self.in_flight.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Drop interest in everything outstanding.
    pub fn cancel_all(&mut self) {
        self.in_flight.clear();
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

/// Run a blocking operation on its own thread and give up waiting after
/// `timeout`.  The operation itself is not interrupted, its late result is
/// simply dropped.
pub fn run_with_timeout<T, F>(timeout: Duration, op: F) -> Result<T, Error>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    let (send, recv) = bounded(1);
    thread::spawn(move || {
        let _ = send.send(op());
    });
    match recv.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(Error::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(Error::NetworkError(Box::new(io::Error::new(
            io::ErrorKind::Other,
            "fetch worker terminated without a result",
        )))),
    }
}
