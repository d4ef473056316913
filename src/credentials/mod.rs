//! Secrets handling
//!
//! - `secure`: zeroizing string wrapper
//! - `provider`: generated or prompted secrets under one strength policy
//! - `context`: the short-lived bundle of secrets one operation works with

pub mod context;
pub mod provider;
pub mod secure;

pub use context::{CredentialContext, DbConnection};
pub use provider::{
    check_strength, generate_password, CredentialProvider, GeneratedCredentials,
    PromptCredentials, SecretKind,
};
pub use secure::SecureString;
