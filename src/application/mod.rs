//! Application services over the deck registry.

pub mod decks;
pub mod error;
pub mod render;
pub mod repos;
pub mod shortid;
pub mod views;
