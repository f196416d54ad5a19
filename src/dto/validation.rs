//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::dto::side_channel::PING;

/// Longest accepted player name, counted in characters after trimming.
pub const MAX_NAME_CHARS: usize = 50;

/// Validates a display name: 1 to 50 characters once trimmed, and never the
/// keep-alive sentinel.
///
/// # Examples
///
/// ```ignore
/// validate_player_name("Ann")   // Ok
/// validate_player_name("   ")   // Err - empty
/// validate_player_name("ping")  // Err - reserved
/// ```
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    let chars = trimmed.chars().count();
    if chars == 0 || chars > MAX_NAME_CHARS {
        let mut err = ValidationError::new("player_name_length");
        err.message = Some(
            format!("Player name must be between 1 and {MAX_NAME_CHARS} characters (got {chars})")
                .into(),
        );
        return Err(err);
    }

    if trimmed.eq_ignore_ascii_case(PING) {
        let mut err = ValidationError::new("player_name_reserved");
        err.message = Some(format!("Player name `{trimmed}` is reserved").into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_player_name_valid() {
        assert!(validate_player_name("Ann").is_ok());
        assert!(validate_player_name("  Ben  ").is_ok());
        assert!(validate_player_name(&"é".repeat(50)).is_ok());
    }

    #[test]
    fn test_validate_player_name_invalid_length() {
        assert!(validate_player_name("").is_err());
        assert!(validate_player_name("   ").is_err());
        assert!(validate_player_name(&"a".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_player_name_reserved() {
        assert!(validate_player_name("ping").is_err());
        assert!(validate_player_name(" Ping ").is_err());
        assert!(validate_player_name("pinger").is_ok());
    }
}
