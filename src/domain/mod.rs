//! Domain layer types and invariants.

pub mod deckcode;
pub mod entities;
pub mod error;
pub mod shortid;
