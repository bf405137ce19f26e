use crate::share::ShareId;

/// A username/password pair obtained from the credential collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Boundary to the secure credential store. Synchronous; an implementation
/// may prompt a human. Returning `None` means the user declined.
pub trait CredentialProvider: Send + Sync {
    fn get_credentials(&self, identity: &ShareId) -> Option<Credentials>;
}

/// Fixed credentials, e.g. from CLI flags or the environment.
pub struct StaticCredentials {
    credentials: Option<Credentials>,
}

impl StaticCredentials {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self { credentials }
    }

    pub fn none() -> Self {
        Self { credentials: None }
    }
}

impl CredentialProvider for StaticCredentials {
    fn get_credentials(&self, _identity: &ShareId) -> Option<Credentials> {
        self.credentials.clone()
    }
}

/// Scripted provider for tests: hands out a fixed answer and counts how
/// often it was asked.
pub struct ScriptedCredentials {
    answer: Option<Credentials>,
    prompts: std::sync::atomic::AtomicUsize,
}

impl ScriptedCredentials {
    pub fn answering(credentials: Credentials) -> Self {
        Self {
            answer: Some(credentials),
            prompts: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn cancelling() -> Self {
        Self {
            answer: None,
            prompts: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl CredentialProvider for ScriptedCredentials {
    fn get_credentials(&self, _identity: &ShareId) -> Option<Credentials> {
        self.prompts
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.answer.clone()
    }
}
