//! Credential verification, session tokens and per-operation role checks.

mod access;
mod password;
mod session;

pub use access::{Caller, Operation};
pub use password::{hash_password, verify_decoy, verify_password, PasswordError};
pub use session::SessionRegistry;
