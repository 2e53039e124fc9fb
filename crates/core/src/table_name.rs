//! Table name validation.
//!
//! A table name matches `^[A-Za-z][A-Za-z0-9_]*$` and is at most
//! `MAX_TABLE_NAME_LEN` characters. Validation is hand-rolled rather than
//! pulling in a regex engine for a single anchored pattern, the way the
//! teacher crate validates branch/space names in `types::validate_space_name`.

use crate::error::{Error, Result};
use crate::limits::MAX_TABLE_NAME_LEN;

/// Validate a table name against spec.md's naming rule.
///
/// # Errors
///
/// Returns `Error::InvalidInput` if the name is empty, too long, does not
/// start with an ASCII letter, or contains a character other than
/// `[A-Za-z0-9_]`.
pub fn validate_table_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_input("table name must not be empty"));
    }
    if name.len() > MAX_TABLE_NAME_LEN {
        return Err(Error::invalid_input(format!(
            "table name exceeds {MAX_TABLE_NAME_LEN} characters: {name}"
        )));
    }
    let mut chars = name.chars();
    let first = chars.next().expect("checked non-empty above");
    if !first.is_ascii_alphabetic() {
        return Err(Error::invalid_input(format!(
            "table name must start with a letter: {name}"
        )));
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(Error::invalid_input(format!(
            "table name contains invalid character '{bad}': {name}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_names() {
        assert!(validate_table_name("users").is_ok());
        assert!(validate_table_name("User_1").is_ok());
        assert!(validate_table_name("a").is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        assert!(validate_table_name("").is_err());
    }

    #[test]
    fn rejects_leading_digit_or_underscore() {
        assert!(validate_table_name("1users").is_err());
        assert!(validate_table_name("_users").is_err());
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(validate_table_name("users-table").is_err());
        assert!(validate_table_name("users table").is_err());
        assert!(validate_table_name("users.table").is_err());
    }

    #[test]
    fn rejects_over_length_name() {
        let long = "a".repeat(MAX_TABLE_NAME_LEN + 1);
        assert!(validate_table_name(&long).is_err());
        let max = "a".repeat(MAX_TABLE_NAME_LEN);
        assert!(validate_table_name(&max).is_ok());
    }
}
