use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Mutex;

use argon2::password_hash::rand_core::{OsRng, RngCore};

use super::access::Caller;

/// In-process registry of opaque session tokens.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Caller>>,
}

impl SessionRegistry {
    pub fn issue(&self, caller: Caller) -> String {
        let token = random_token();
        self.sessions
            .lock()
            .expect("session mutex poisoned")
            .insert(token.clone(), caller);
        token
    }

    pub fn resolve(&self, token: &str) -> Option<Caller> {
        self.sessions
            .lock()
            .expect("session mutex poisoned")
            .get(token)
            .cloned()
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions
            .lock()
            .expect("session mutex poisoned")
            .remove(token)
            .is_some()
    }

    /// Drop every session belonging to a user, e.g. after the account is deleted.
    pub fn revoke_user(&self, user_id: &crate::workflows::registration::UserId) -> usize {
        let mut guard = self.sessions.lock().expect("session mutex poisoned");
        let before = guard.len();
        guard.retain(|_, caller| &caller.user_id != user_id);
        before - guard.len()
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(64), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}
