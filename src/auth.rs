use std::sync::RwLock;

/// Supplies the signed-in user's id. Sign-in itself happens elsewhere.
pub trait IdentityProvider: Send + Sync {
    fn current_user_id(&self) -> Option<String>;
}

/// In-process record of who is signed in.
#[derive(Debug, Default)]
pub struct AuthSession {
    user_id: RwLock<Option<String>>,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: impl Into<String>) -> Self {
        let session = Self::new();
        session.sign_in(user_id);
        session
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        let normalized = Some(user_id.trim().to_string()).filter(|id| !id.is_empty());
        let mut guard = match self.user_id.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = normalized;
    }

    pub fn sign_out(&self) {
        let mut guard = match self.user_id.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_user_id().is_some()
    }
}

impl IdentityProvider for AuthSession {
    fn current_user_id(&self) -> Option<String> {
        match self.user_id.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
