//! Validation utilities

use crate::types::*;

/// Longest accepted client operation token
pub const MAX_TOKEN_LEN: usize = 128;

/// Validate that an amount is positive
pub fn validate_positive_amount(amount: i64) -> LedgerResult<()> {
    if amount <= 0 {
        Err(LedgerError::InvalidAmount(amount))
    } else {
        Ok(())
    }
}

/// Validate that an account name is valid
pub fn validate_account_name(name: &str, max_len: usize) -> LedgerResult<()> {
    if name.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Account name cannot be empty".to_string(),
        ));
    }

    if name.chars().count() > max_len {
        return Err(LedgerError::Validation(format!(
            "Account name cannot exceed {} characters",
            max_len
        )));
    }

    Ok(())
}

/// Validate a caller-supplied operation token
pub fn validate_operation_token(token: &str) -> LedgerResult<()> {
    if token.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Client operation hash cannot be empty".to_string(),
        ));
    }

    if token.len() > MAX_TOKEN_LEN {
        return Err(LedgerError::Validation(format!(
            "Client operation hash cannot exceed {} bytes",
            MAX_TOKEN_LEN
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_validation() {
        assert!(validate_positive_amount(1).is_ok());
        assert!(matches!(
            validate_positive_amount(0),
            Err(LedgerError::InvalidAmount(0))
        ));
        assert!(matches!(
            validate_positive_amount(-5),
            Err(LedgerError::InvalidAmount(-5))
        ));
    }

    #[test]
    fn test_name_length_counts_characters() {
        assert!(validate_account_name("žluťoučký", 9).is_ok());
        assert!(validate_account_name("žluťoučký kůň", 9).is_err());
    }

    #[test]
    fn test_token_validation() {
        assert!(validate_operation_token("t1").is_ok());
        assert!(validate_operation_token("").is_err());
        assert!(validate_operation_token(&"x".repeat(MAX_TOKEN_LEN + 1)).is_err());
    }
}
