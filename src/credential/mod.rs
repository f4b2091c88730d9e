//! Voice password persistence and verification

mod store;

pub use store::{Credential, CredentialError, CredentialStore};
