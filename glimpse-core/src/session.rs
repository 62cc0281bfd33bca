use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Error;

/// Bearer credential issued by the authentication service.  We never mint
/// or refresh these ourselves, we only carry them.
#[derive(Clone)]
pub struct AccessToken {
    token: Arc<str>,
}

impl AccessToken {
    pub fn new(token: impl Into<Arc<str>>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self { token })
        }
    }

    pub fn as_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// Cheap to clone, shareable handle holding the current credential.  Every
/// outgoing request asks for `bearer()` first and aborts with
/// `Error::Unauthorized` before touching the network if there is none.
#[derive(Clone, Default)]
pub struct SessionService {
    token: Arc<Mutex<Option<AccessToken>>>,
}

impl SessionService {
    /// Create a session without any credential.  Requests will fail until
    /// `update_token` is called.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        let session = Self::empty();
        session.update_token(token);
        session
    }

    /// Replace the active credential.  Blank tokens sign the session out.
    pub fn update_token(&self, token: &str) {
        *self.token.lock() = AccessToken::new(token);
    }

    pub fn is_authorized(&self) -> bool {
        self.token.lock().is_some()
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> Result<String, Error> {
        self.token
            .lock()
            .as_ref()
            .map(AccessToken::as_header)
            .ok_or(Error::Unauthorized)
    }
}
