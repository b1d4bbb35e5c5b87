//! Collapses concurrent executions of the same work into a single one.
//!
//! If a popular key is missing in a cache, all clients asking for it at the same time would
//! otherwise hit the underlying data source in parallel. A [Group] only lets the first caller
//! (the leader) perform the work. All other callers for the same key wait for the leader and
//! receive a clone of its result.
//!
//! Note that this is no memo: once the leader has published its result, the key is removed and
//! the next call performs the work again.
//!
//! # Examples
//! ```
//! # use ringcache::flight::Group;
//! # #[tokio::main]
//! # async fn main() {
//! let group = Group::new();
//!
//! let (first, second) = tokio::join!(
//!     group.work("Tom", async {
//!         tokio::task::yield_now().await;
//!         630
//!     }),
//!     group.work("Tom", async { 42 }),
//! );
//!
//! // The second call joined the flight of the first one...
//! assert_eq!(first, 630);
//! assert_eq!(second, 630);
//! # }
//! ```
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use tokio::sync::watch;

/// Keeps track of all loads which are currently in flight.
pub struct Group<T> {
    flights: Mutex<HashMap<String, watch::Receiver<Option<T>>>>,
}

enum Role<T> {
    Leader(watch::Sender<Option<T>>),
    Follower(watch::Receiver<Option<T>>),
}

/// Removes the flight of a leader once it completed or was cancelled.
///
/// If the leader is dropped before publishing a result, its sender is dropped as well so that
/// all followers wake up and retry.
struct Landing<'a, T> {
    group: &'a Group<T>,
    key: &'a str,
}

impl<T> Drop for Landing<'_, T> {
    fn drop(&mut self) {
        let _ = self.group.flights.lock().unwrap().remove(self.key);
    }
}

impl<T: Clone> Group<T> {
    /// Creates a new group without any flights.
    pub fn new() -> Self {
        Group {
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Executes the given work unless a flight for the given key is already in progress.
    ///
    /// If another caller is currently working on the same key, the given future is dropped
    /// without being polled and the result of the other caller is returned instead.
    pub async fn work<F>(&self, key: &str, work: F) -> T
    where
        F: Future<Output = T>,
    {
        loop {
            match self.join(key) {
                Role::Leader(sender) => {
                    let _landing = Landing { group: self, key };

                    let result = work.await;
                    let _ = sender.send_replace(Some(result.clone()));

                    return result;
                }
                Role::Follower(mut receiver) => {
                    if let Ok(result) = receiver.wait_for(Option::is_some).await {
                        if let Some(value) = &*result {
                            return value.clone();
                        }
                    }

                    // The leader has been cancelled before providing a result...
                    log::debug!("Flight for '{}' was abandoned. Retrying...", key);
                }
            }
        }
    }

    fn join(&self, key: &str) -> Role<T> {
        let mut flights = self.flights.lock().unwrap();
        if let Some(receiver) = flights.get(key) {
            return Role::Follower(receiver.clone());
        }

        let (sender, receiver) = watch::channel(None);
        let _ = flights.insert(key.to_owned(), receiver);

        Role::Leader(sender)
    }

    /// Returns the number of flights currently in progress.
    pub fn in_flight(&self) -> usize {
        self.flights.lock().unwrap().len()
    }
}

impl<T: Clone> Default for Group<T> {
    fn default() -> Self {
        Group::new()
    }
}
