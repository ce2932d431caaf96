/*!
 * # Password Policy Module
 *
 * Password hashing with argon2 plus the checks applied to new passwords at
 * registration and on password change.
 */

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PasswordPolicyError {
    #[error("This password is too short. It must contain at least {min_length} characters.")]
    TooShort { min_length: usize },

    #[error("This password is too long. It may contain at most {max_length} characters.")]
    TooLong { max_length: usize },

    #[error("This password is entirely numeric.")]
    EntirelyNumeric,

    #[error("This password is too common.")]
    CommonPassword,

    #[error("The password is too similar to the username.")]
    SimilarToUsername,
}

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub prevent_numeric: bool,
    pub prevent_common_passwords: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
            prevent_numeric: true,
            prevent_common_passwords: true,
        }
    }
}

static COMMON_PASSWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "password", "password1", "password123", "12345678", "123456789", "1234567890",
        "qwerty123", "qwertyuiop", "iloveyou", "sunshine", "princess", "football",
        "baseball", "welcome1", "letmein1", "trustno1", "abc12345", "passw0rd",
        "superman", "starwars",
    ]
    .into_iter()
    .collect()
});

impl PasswordPolicy {
    /// Validate a password against the policy, returning the first violation.
    pub fn validate(&self, password: &str, username: Option<&str>) -> Result<(), PasswordPolicyError> {
        let length = password.chars().count();
        if length < self.min_length {
            return Err(PasswordPolicyError::TooShort {
                min_length: self.min_length,
            });
        }
        if length > self.max_length {
            return Err(PasswordPolicyError::TooLong {
                max_length: self.max_length,
            });
        }

        if self.prevent_numeric && password.chars().all(|c| c.is_ascii_digit()) {
            return Err(PasswordPolicyError::EntirelyNumeric);
        }

        if self.prevent_common_passwords
            && COMMON_PASSWORDS.contains(password.to_lowercase().as_str())
        {
            return Err(PasswordPolicyError::CommonPassword);
        }

        if let Some(username) = username {
            if is_similar_to_username(password, username) {
                return Err(PasswordPolicyError::SimilarToUsername);
            }
        }

        Ok(())
    }
}

fn is_similar_to_username(password: &str, username: &str) -> bool {
    let password = password.to_lowercase();
    let username = username.to_lowercase();
    username.len() >= 3 && (password.contains(&username) || username.contains(&password))
}

/// Hashes a password into a PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Checks a password against a stored PHC string. A malformed hash never verifies.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_policy_validation() {
        let policy = PasswordPolicy::default();

        assert!(policy.validate("harbour-lights-42", Some("marko")).is_ok());
        assert_eq!(
            policy.validate("short", None),
            Err(PasswordPolicyError::TooShort { min_length: 8 })
        );
        assert_eq!(
            policy.validate("8675309123", None),
            Err(PasswordPolicyError::EntirelyNumeric)
        );
        assert_eq!(
            policy.validate("Password123", None),
            Err(PasswordPolicyError::CommonPassword)
        );
        assert_eq!(
            policy.validate("marko-rules", Some("Marko")),
            Err(PasswordPolicyError::SimilarToUsername)
        );
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("harbour-lights-42").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("harbour-lights-42", &hash));
        assert!(!verify_password("harbour-lights-43", &hash));
        assert!(!verify_password("harbour-lights-42", "not-a-hash"));
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let first = hash_password("harbour-lights-42").unwrap();
        let second = hash_password("harbour-lights-42").unwrap();
        assert_ne!(first, second);
    }
}
