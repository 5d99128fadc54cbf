//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::dao::scoring::{Difficulty, LevelRef};

/// Validates a level identifier: a custom song hash, optionally behind the
/// `custom_level_` prefix the game adds, or the name of a built-in level.
///
/// Whether the authority knows the level is decided by the level cache, so
/// only empty or obviously malformed identifiers are refused here.
///
/// # Examples
///
/// ```ignore
/// validate_level_id("custom_level_AB12cd34") // Ok
/// validate_level_id("100Bills")              // Ok - built-in level
/// validate_level_id("custom_level_")         // Err - empty hash
/// validate_level_id("ab12 cd34")             // Err - whitespace
/// ```
pub fn validate_level_id(id: &str) -> Result<(), ValidationError> {
    let hash = LevelRef::new(id, Difficulty::Easy);
    let hash = hash.song_hash();

    if hash.is_empty() {
        let mut err = ValidationError::new("level_id_empty");
        err.message = Some("Level ID must contain a song hash or level name".into());
        return Err(err);
    }

    if hash.len() > MAX_LEVEL_ID_LEN
        || hash.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        let mut err = ValidationError::new("level_id_format");
        err.message = Some("Level ID must be a single token of at most 128 bytes".into());
        return Err(err);
    }

    Ok(())
}

const MAX_LEVEL_ID_LEN: usize = 128;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_level_id_valid() {
        assert!(validate_level_id("custom_level_ab12cd34").is_ok());
        assert!(validate_level_id("AB12CD34").is_ok());
    }

    #[test]
    fn test_validate_level_id_accepts_builtin_levels() {
        assert!(validate_level_id("100Bills").is_ok());
        assert!(validate_level_id("BeatSaber").is_ok());
        assert!(validate_level_id("Country_Rounds_Sneaky_Snitch").is_ok());
    }

    #[test]
    fn test_validate_level_id_invalid() {
        assert!(validate_level_id("").is_err());
        assert!(validate_level_id("custom_level_").is_err());
        assert!(validate_level_id(&"a".repeat(129)).is_err());
        assert!(validate_level_id("ab12 cd34").is_err()); // space
    }
}
