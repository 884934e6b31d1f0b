//! Short public identifiers for decks.
//!
//! Identifiers are drawn uniformly from an alphabet without visually
//! confusable characters (`0/O`, `1/I/l`, `o`). Generation is pure; checking
//! candidates against persisted decks is left to the caller, which widens
//! the length whenever a whole batch collides.

use std::collections::HashSet;

use rand::Rng;

use super::error::DomainError;

pub const SHORTID_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnpqrstuvwxyz";

/// Bounds for candidate generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortidPolicy {
    pub batch_size: usize,
    pub initial_length: usize,
    pub max_length: usize,
}

impl Default for ShortidPolicy {
    fn default() -> Self {
        Self {
            batch_size: 15,
            initial_length: 3,
            max_length: 12,
        }
    }
}

impl ShortidPolicy {
    pub fn new(
        batch_size: usize,
        initial_length: usize,
        max_length: usize,
    ) -> Result<Self, DomainError> {
        if batch_size == 0 {
            return Err(DomainError::validation("shortid batch size must be positive"));
        }
        if initial_length == 0 {
            return Err(DomainError::validation("shortid length must be positive"));
        }
        if max_length < initial_length {
            return Err(DomainError::validation(format!(
                "shortid max length {max_length} is below initial length {initial_length}"
            )));
        }
        Ok(Self {
            batch_size,
            initial_length,
            max_length,
        })
    }
}

/// Draw `count` identifiers of `length` characters.
pub fn generate_candidates<R: Rng + ?Sized>(rng: &mut R, count: usize, length: usize) -> Vec<String> {
    (0..count)
        .map(|_| {
            (0..length)
                .map(|_| SHORTID_ALPHABET[rng.random_range(0..SHORTID_ALPHABET.len())] as char)
                .collect()
        })
        .collect()
}

/// First candidate, in generation order, that is not already taken.
pub fn first_available(candidates: &[String], taken: &HashSet<String>) -> Option<String> {
    candidates
        .iter()
        .find(|candidate| !taken.contains(candidate.as_str()))
        .cloned()
}

/// Whether `value` could have been produced by [`generate_candidates`].
pub fn is_shortid_shaped(value: &str, max_length: usize) -> bool {
    !value.is_empty()
        && value.len() <= max_length
        && value.bytes().all(|byte| SHORTID_ALPHABET.contains(&byte))
}
