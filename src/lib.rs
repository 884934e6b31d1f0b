//! Deck registry with short public identifiers and cached deck images.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
