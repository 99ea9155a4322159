/// Supplies the identity of the caller, if any.
pub trait AuthProvider: Send + Sync {
    fn current_user_id(&self) -> Option<String>;
}

/// A fixed identity, resolved before the call reaches the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity(pub Option<String>);

impl CallerIdentity {
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self(Some(id.into()))
    }
}

impl AuthProvider for CallerIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.0.clone()
    }
}
