/// Identity of the signed-in user, passed explicitly to whatever needs it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    user_id: String,
    auth_token: Option<String>,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            auth_token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Token for the `Authorization: Bearer` header, if the session has one.
    pub fn bearer(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }
}
