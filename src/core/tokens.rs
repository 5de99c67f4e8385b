//! Live access token sets.

use super::AuthSettings;
use crate::error::{ReloadError, Result};
use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Tokens {
    valid: HashSet<String>,
    admin: HashSet<String>,
}

/// Request and admin tokens, swapped wholesale on every configuration reload.
#[derive(Debug, Clone)]
pub struct TokenSet {
    current: Arc<ArcSwap<Tokens>>,
}

impl TokenSet {
    /// Token sets taken from `auth`.
    pub fn new(auth: &AuthSettings) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(Self::collect(auth))),
        }
    }

    fn collect(auth: &AuthSettings) -> Tokens {
        Tokens {
            valid: auth.valid_tokens.iter().cloned().collect(),
            admin: auth.admin_tokens.iter().cloned().collect(),
        }
    }

    /// Replace both sets.
    pub fn refresh(&self, auth: &AuthSettings) {
        self.current.store(Arc::new(Self::collect(auth)));
    }

    /// Whether `token` may call handlers.
    pub fn is_valid(&self, token: &str) -> bool {
        self.current.load().valid.contains(token)
    }

    /// Whether `token` may run administrative operations.
    pub fn is_admin(&self, token: &str) -> bool {
        self.current.load().admin.contains(token)
    }

    /// `Ok` for admin tokens, [`ReloadError::Unauthorized`] otherwise.
    pub fn authorize_admin(&self, token: &str) -> Result<()> {
        if self.is_admin(token) {
            Ok(())
        } else {
            Err(ReloadError::Unauthorized)
        }
    }
}

impl Default for TokenSet {
    fn default() -> Self {
        Self::new(&AuthSettings::default())
    }
}
