//! Search prefixes and the alphabet they are drawn from
//!
//! A [`Prefix`] is a non-empty string over an [`Alphabet`]. Prefixes are created
//! either by seeding (all strings of a fixed length, or an explicit list) or by
//! appending one letter to a parent that was found to be truncated.

use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Errors raised while building alphabets or prefixes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrefixError {
    #[error("prefix cannot be empty")]
    Empty,

    #[error("prefix '{prefix}' contains '{ch}', which is not in the alphabet")]
    InvalidCharacter { prefix: String, ch: char },

    #[error("alphabet cannot be empty")]
    EmptyAlphabet,

    #[error("alphabet contains '{0}' more than once")]
    DuplicateLetter(char),

    #[error("alphabet letter '{0}' must be a lowercase letter")]
    InvalidLetter(char),

    #[error("seed depth must be >= 1")]
    InvalidDepth,
}

/// The ordered set of letters prefixes are built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    letters: Vec<char>,
}

impl Alphabet {
    /// The lowercase latin alphabet `a..=z`
    pub fn latin() -> Self {
        Self {
            letters: ('a'..='z').collect(),
        }
    }

    /// Builds an alphabet from a string of distinct lowercase letters
    ///
    /// Enumeration order follows the order of `letters`.
    pub fn new(letters: &str) -> Result<Self, PrefixError> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();

        for ch in letters.chars() {
            if !ch.is_lowercase() {
                return Err(PrefixError::InvalidLetter(ch));
            }
            if !seen.insert(ch) {
                return Err(PrefixError::DuplicateLetter(ch));
            }
            ordered.push(ch);
        }

        if ordered.is_empty() {
            return Err(PrefixError::EmptyAlphabet);
        }

        Ok(Self { letters: ordered })
    }

    pub fn letters(&self) -> &[char] {
        &self.letters
    }

    pub fn len(&self) -> usize {
        self.letters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.is_empty()
    }

    pub fn contains(&self, ch: char) -> bool {
        self.letters.contains(&ch)
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Self::latin()
    }
}

/// A search prefix; identity is the exact string value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Prefix(String);

impl Prefix {
    /// Parses and validates a prefix against an alphabet
    pub fn parse(value: &str, alphabet: &Alphabet) -> Result<Self, PrefixError> {
        if value.is_empty() {
            return Err(PrefixError::Empty);
        }

        if let Some(ch) = value.chars().find(|c| !alphabet.contains(*c)) {
            return Err(PrefixError::InvalidCharacter {
                prefix: value.to_string(),
                ch,
            });
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of letters in the prefix
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns this prefix extended by one letter
    pub fn child(&self, letter: char) -> Prefix {
        let mut value = String::with_capacity(self.0.len() + letter.len_utf8());
        value.push_str(&self.0);
        value.push(letter);
        Prefix(value)
    }

    /// Returns every one-letter extension of this prefix, in alphabet order
    pub fn children(&self, alphabet: &Alphabet) -> Vec<Prefix> {
        alphabet.letters().iter().map(|c| self.child(*c)).collect()
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Prefix {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How the initial frontier is produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedPlan {
    /// Use exactly these prefixes (duplicates are dropped, order kept)
    Explicit(Vec<String>),

    /// All strings of length `depth`, optionally capped to the first `breadth`
    Generated { depth: usize, breadth: Option<usize> },
}

/// Produces the seed prefixes for a plan
///
/// An explicit list overrides depth/breadth generation entirely.
pub fn seed(plan: &SeedPlan, alphabet: &Alphabet) -> Result<Vec<Prefix>, PrefixError> {
    match plan {
        SeedPlan::Explicit(values) => {
            let mut seen = HashSet::new();
            let mut prefixes = Vec::with_capacity(values.len());
            for value in values {
                let prefix = Prefix::parse(value, alphabet)?;
                if seen.insert(prefix.clone()) {
                    prefixes.push(prefix);
                }
            }
            Ok(prefixes)
        }
        SeedPlan::Generated { depth, breadth } => generate_prefixes(alphabet, *depth, *breadth),
    }
}

/// Generates all prefixes of `depth` letters in enumeration order
///
/// Enumeration is lexicographic over the alphabet order (`aa, ab, .., az, ba, ..`).
/// When `breadth` is given only the first `breadth` prefixes are produced, and
/// generation stops as soon as that many exist.
pub fn generate_prefixes(
    alphabet: &Alphabet,
    depth: usize,
    breadth: Option<usize>,
) -> Result<Vec<Prefix>, PrefixError> {
    if depth == 0 {
        return Err(PrefixError::InvalidDepth);
    }

    let letters = alphabet.letters();
    let limit = breadth.unwrap_or(usize::MAX);
    let mut prefixes = Vec::new();

    // Odometer over letter indices
    let mut indices = vec![0usize; depth];
    while prefixes.len() < limit {
        let value: String = indices.iter().map(|i| letters[*i]).collect();
        prefixes.push(Prefix(value));

        let mut position = depth;
        loop {
            if position == 0 {
                return Ok(prefixes);
            }
            position -= 1;
            indices[position] += 1;
            if indices[position] < letters.len() {
                break;
            }
            indices[position] = 0;
        }
    }

    Ok(prefixes)
}
