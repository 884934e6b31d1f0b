use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};

use super::coordinator::RenderError;

/// Outcome every caller of one in-flight render observes.
pub type SharedRender = Shared<BoxFuture<'static, Result<Option<Bytes>, RenderError>>>;

/// Tracks decks that currently have a render running in this process.
///
/// Callers arriving while a render is active receive a clone of the same
/// shared future instead of racing the backends again.
#[derive(Default, Clone)]
pub struct InFlightRenders {
    decks: Arc<DashMap<String, SharedRender>>,
}

impl InFlightRenders {
    pub fn new() -> Self {
        Self {
            decks: Arc::new(DashMap::new()),
        }
    }

    /// Join the render already running for `deckcode`, or start one with
    /// `start`. The returned flag is `true` when this call started it.
    ///
    /// `start` receives the guard that releases the slot; it must keep the
    /// guard alive until the render has finished.
    pub fn join_or_start<F>(&self, deckcode: &str, start: F) -> (SharedRender, bool)
    where
        F: FnOnce(RenderGuard) -> SharedRender,
    {
        use dashmap::mapref::entry::Entry;

        match self.decks.entry(deckcode.to_string()) {
            Entry::Occupied(occupied) => (occupied.get().clone(), false),
            Entry::Vacant(vacant) => {
                let guard = RenderGuard {
                    deckcode: deckcode.to_string(),
                    decks: Arc::clone(&self.decks),
                };
                let shared = start(guard);
                vacant.insert(shared.clone());
                (shared, true)
            }
        }
    }

    #[cfg(test)]
    fn is_rendering(&self, deckcode: &str) -> bool {
        self.decks.contains_key(deckcode)
    }
}

pub struct RenderGuard {
    deckcode: String,
    decks: Arc<DashMap<String, SharedRender>>,
}

impl Drop for RenderGuard {
    fn drop(&mut self) {
        self.decks.remove(&self.deckcode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn ready(value: &'static [u8]) -> SharedRender {
        futures::future::ready(Ok(Some(Bytes::from_static(value))))
            .boxed()
            .shared()
    }

    #[tokio::test]
    async fn second_caller_joins_the_first() {
        let flights = InFlightRenders::new();
        let mut kept = None;

        let (first, started) = flights.join_or_start("deck", |guard| {
            kept = Some(guard);
            ready(b"one")
        });
        assert!(started);

        let (second, started) = flights.join_or_start("deck", |_guard| ready(b"two"));
        assert!(!started);
        assert_eq!(second.await.unwrap(), Some(Bytes::from_static(b"one")));
        assert_eq!(first.await.unwrap(), Some(Bytes::from_static(b"one")));
    }

    #[tokio::test]
    async fn dropping_the_guard_frees_the_slot() {
        let flights = InFlightRenders::new();
        let mut kept = None;

        let (_render, started) = flights.join_or_start("deck", |guard| {
            kept = Some(guard);
            ready(b"one")
        });
        assert!(started);
        assert!(flights.is_rendering("deck"));

        kept = None;
        assert!(!flights.is_rendering("deck"));

        let (render, started) = flights.join_or_start("deck", |guard| {
            kept = Some(guard);
            ready(b"two")
        });
        assert!(started);
        assert_eq!(render.await.unwrap(), Some(Bytes::from_static(b"two")));
    }
}
