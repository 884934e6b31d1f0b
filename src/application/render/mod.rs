//! Deck image rendering.
//!
//! The coordinator owns every write to a deck's image fields: it flips the
//! rendering flag, races the configured backends and stores the winner, and
//! always clears the flag again when no backend succeeds. The poller is the
//! read side for callers that must not start a render themselves.

mod backend;
mod coordinator;
mod flight;
mod poller;

pub use backend::{
    RaceError, RaceWinner, RenderBackend, RenderBackendError, RenderJob, race_backends,
};
pub use coordinator::{RenderCoordinator, RenderError};
pub use flight::InFlightRenders;
pub use poller::RenderPoller;
