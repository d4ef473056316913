//! Where secrets come from
//!
//! A `CredentialProvider` hands out named secrets, either freshly generated or
//! typed in by the operator. Generated and accepted values always satisfy the
//! strength policy: at least 12 characters with an upper-case letter, a
//! lower-case letter, a digit and a symbol.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

use super::secure::SecureString;
use crate::error::{StewardError, StewardResult};

/// Minimum length of any password
pub const MIN_PASSWORD_LEN: usize = 12;

/// Length of generated passwords
pub const GENERATED_PASSWORD_LEN: usize = 24;

const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
// No quotes, backslashes or '$': the value ends up in YAML, pgpass and SQL
const SYMBOLS: &[u8] = b"!#%*+,-.:=?@^_~";

/// The secrets an installation needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    DatabasePassword,
    SigningKey,
    AdminPassword,
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DatabasePassword => "database password",
            Self::SigningKey => "signing key",
            Self::AdminPassword => "administrator password",
        })
    }
}

/// Source of secret values
pub trait CredentialProvider {
    /// Produce a value for `kind`
    fn obtain(&self, kind: SecretKind) -> StewardResult<SecureString>;
}

/// Check a password against the strength policy
pub fn check_strength(password: &str) -> StewardResult<()> {
    let mut missing = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LEN {
        missing.push(format!("at least {} characters", MIN_PASSWORD_LEN));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        missing.push("an upper-case letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        missing.push("a lower-case letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        missing.push("a digit".to_string());
    }
    if !password.chars().any(|c| !c.is_ascii_alphanumeric()) {
        missing.push("a symbol".to_string());
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(StewardError::Credential(format!(
            "password needs {}",
            missing.join(", ")
        )))
    }
}

/// Generate a password that satisfies the strength policy
pub fn generate_password(len: usize) -> SecureString {
    let len = len.max(MIN_PASSWORD_LEN);
    let mut rng = OsRng;
    let classes = [UPPER, LOWER, DIGITS, SYMBOLS];

    // One character from every class, the rest from the union, then shuffle
    let mut chars: Vec<u8> = classes
        .iter()
        .map(|class| class[rng.gen_range(0..class.len())])
        .collect();
    let all: Vec<u8> = classes.concat();
    while chars.len() < len {
        chars.push(all[rng.gen_range(0..all.len())]);
    }
    chars.shuffle(&mut rng);

    let password = SecureString::new(String::from_utf8_lossy(&chars).into_owned());
    zeroize::Zeroize::zeroize(&mut chars);
    password
}

/// Generate a random URL-safe signing key (48 random bytes)
pub fn generate_signing_key() -> SecureString {
    let mut bytes = [0u8; 48];
    OsRng.fill_bytes(&mut bytes);
    let key = SecureString::new(URL_SAFE_NO_PAD.encode(bytes));
    zeroize::Zeroize::zeroize(&mut bytes);
    key
}

/// Generates every secret
#[derive(Debug, Default, Clone, Copy)]
pub struct GeneratedCredentials;

impl CredentialProvider for GeneratedCredentials {
    fn obtain(&self, kind: SecretKind) -> StewardResult<SecureString> {
        Ok(match kind {
            SecretKind::SigningKey => generate_signing_key(),
            SecretKind::DatabasePassword | SecretKind::AdminPassword => {
                generate_password(GENERATED_PASSWORD_LEN)
            }
        })
    }
}

/// Asks the operator on the terminal; an empty answer generates a value
#[derive(Debug, Clone, Copy)]
pub struct PromptCredentials {
    /// Ask for a second entry and compare
    pub confirm: bool,
}

impl PromptCredentials {
    fn read(prompt: &str) -> StewardResult<SecureString> {
        rpassword::prompt_password(prompt)
            .map(SecureString::from)
            .map_err(|e| StewardError::Credential(format!("Failed to read input: {}", e)))
    }
}

impl CredentialProvider for PromptCredentials {
    fn obtain(&self, kind: SecretKind) -> StewardResult<SecureString> {
        if kind == SecretKind::SigningKey {
            return GeneratedCredentials.obtain(kind);
        }

        loop {
            let value = Self::read(&format!("Enter {} (leave empty to generate): ", kind))?;
            if value.is_empty() {
                return GeneratedCredentials.obtain(kind);
            }

            if let Err(e) = check_strength(&value) {
                eprintln!("{}", e);
                continue;
            }

            if self.confirm {
                let again = Self::read(&format!("Confirm {}: ", kind))?;
                if again != value {
                    eprintln!("Entries do not match. Please try again.");
                    continue;
                }
            }

            return Ok(value);
        }
    }
}
