use crate::types::Tribe;
use thiserror::Error;

pub const MAX_WORD_LEN: usize = 32;
pub const MAX_NAME_LEN: usize = 32;

/// Punctuation allowed as the final character of a word.
pub const TRAILING_PUNCTUATION: [char; 5] = [',', '.', ';', '!', '?'];

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a word")]
    EmptyWord,

    #[error("Word must be 32 characters or less")]
    WordTooLong,

    #[error("Word must contain only letters, with optional punctuation at the end")]
    InvalidWord,

    #[error("Please enter your name")]
    EmptyName,

    #[error("Name must be 32 characters or less")]
    NameTooLong,

    #[error("Name must contain only letters (A-Z, a-z)")]
    InvalidName,

    #[error("Please select your tribe")]
    MissingTribe,
}

pub fn check_word(word: &str) -> Result<(), ValidationError> {
    if word.is_empty() {
        return Err(ValidationError::EmptyWord);
    }
    if word.chars().count() > MAX_WORD_LEN {
        return Err(ValidationError::WordTooLong);
    }

    let single = word.chars().count() == 1;
    let mut chars = word.chars();
    let last = chars.next_back().ok_or(ValidationError::EmptyWord)?;
    let head_ok = chars.all(|c| c.is_ascii_alphabetic());
    let last_ok = if single {
        last.is_ascii_alphabetic()
    } else {
        last.is_ascii_alphabetic() || TRAILING_PUNCTUATION.contains(&last)
    };

    if head_ok && last_ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidWord)
    }
}

pub fn validate_word(word: &str) -> bool {
    check_word(word).is_ok()
}

pub fn validate_registration(
    name: &str,
    tribe: Option<Tribe>,
) -> Result<Tribe, ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong);
    }
    if !name.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidName);
    }
    tribe.ok_or(ValidationError::MissingTribe)
}
