//! Scripted identity provider and dependent store for tests.
//!
//! Enabled with the `test-support` feature.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use standin_core::identity::AuthIdentity;

use crate::lifecycle::DependentStore;
use crate::provider::{IdentityProvider, ProviderError};

#[derive(Debug, Clone)]
enum Script {
    Resolve(Option<AuthIdentity>),
    Fail,
    Abort,
    Hang,
}

/// Provider whose `current_session` follows a fixed script.
pub struct FakeProvider {
    script: Script,
    fail_sign_out: bool,
    sign_outs: Arc<AtomicUsize>,
}

impl FakeProvider {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            fail_sign_out: false,
            sign_outs: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn resolving(identity: Option<AuthIdentity>) -> Self {
        Self::with_script(Script::Resolve(identity))
    }

    #[must_use]
    pub fn failing() -> Self {
        Self::with_script(Script::Fail)
    }

    #[must_use]
    pub fn aborting() -> Self {
        Self::with_script(Script::Abort)
    }

    /// Never answers.
    #[must_use]
    pub fn hanging() -> Self {
        Self::with_script(Script::Hang)
    }

    #[must_use]
    pub fn with_failing_sign_out(mut self) -> Self {
        self.fail_sign_out = true;
        self
    }

    #[must_use]
    pub fn sign_out_counter(&self) -> Arc<AtomicUsize> {
        self.sign_outs.clone()
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn current_session(&self) -> Result<Option<AuthIdentity>, ProviderError> {
        match &self.script {
            Script::Resolve(identity) => Ok(identity.clone()),
            Script::Fail => Err(ProviderError::Request("HTTP 503: cold start".into())),
            Script::Abort => Err(ProviderError::Aborted("navigation".into())),
            Script::Hang => std::future::pending().await,
        }
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out {
            Err(ProviderError::Request("network unreachable".into()))
        } else {
            Ok(())
        }
    }
}

/// Dependent store that only counts teardowns.
pub struct RecordingDependent {
    name: String,
    teardowns: AtomicUsize,
}

impl RecordingDependent {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            teardowns: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DependentStore for RecordingDependent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn teardown(&self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}
