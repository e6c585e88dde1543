// ============================
// crates/backend-lib/src/words.rs
// ============================
//! Dictionary collaborator: consonant draws and word lookups.

use rand::prelude::IndexedRandom;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use crate::error::AppError;

/// The 21 consonants draws are sampled from.
const CONSONANTS: [char; 21] = [
    'b', 'c', 'd', 'f', 'g', 'h', 'j', 'k', 'l', 'm', 'n', 'p', 'q', 'r', 's', 't', 'v', 'w',
    'x', 'y', 'z',
];

/// Vowels are always permitted and excluded from the consonant check.
pub const VOWELS: [char; 5] = ['a', 'e', 'i', 'o', 'u'];

/// Trait for word/consonant collaborators
pub trait Lexicon: Send + Sync {
    /// Draw `n` distinct consonants uniformly at random
    fn draw_consonants(&self, n: usize) -> BTreeSet<char>;

    /// Case-insensitive, trimmed dictionary membership check
    fn exists(&self, word: &str) -> bool;
}

/// Lexicon backed by a newline-delimited word list file.
pub struct FileLexicon {
    words: HashSet<String>,
}

impl FileLexicon {
    /// Load a word list, one word per line, lowercased on the way in.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_words(content.lines()))
    }

    /// Build a lexicon from an iterator of words. Used by tests and
    /// by embedded fallback lists.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self { words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Lexicon for FileLexicon {
    fn draw_consonants(&self, n: usize) -> BTreeSet<char> {
        let mut rng = rand::rng();
        CONSONANTS
            .choose_multiple(&mut rng, n.min(CONSONANTS.len()))
            .copied()
            .collect()
    }

    fn exists(&self, word: &str) -> bool {
        self.words.contains(&word.trim().to_lowercase())
    }
}
