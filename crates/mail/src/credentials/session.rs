//! Per-caller session state

/// What the boundary keeps for one caller between requests
///
/// Only the resolved account address lives here. How a session is carried
/// (cookie, CLI process, FFI handle) is up to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    principal: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session that already knows its account (e.g. restored from a cookie)
    pub fn with_principal(principal: impl Into<String>) -> Self {
        Self {
            principal: Some(principal.into()),
        }
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    pub(crate) fn set_principal(&mut self, principal: impl Into<String>) {
        self.principal = Some(principal.into());
    }

    pub(crate) fn clear(&mut self) {
        self.principal = None;
    }
}
