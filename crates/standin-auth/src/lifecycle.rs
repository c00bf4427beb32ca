//! Identity lifecycle manager.
//!
//! Single writer of the real [`AuthIdentity`]. Everything else reads it via
//! [`IdentityManager::subscribe`].
//!
//! Startup waits on the provider with a bounded timeout: the provider call and
//! a timer race, and whichever finishes first clears the loading flag through
//! the same guarded `complete_init`. Identity changes keep the tenant cache
//! owned by the current principal; losing the identity tears down every
//! registered dependent store before the identity itself is cleared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use standin_config::IdentityConfig;
use standin_core::identity::AuthIdentity;
use standin_core::tenant::{TenantContextStore, ensure_cache_owner};
use tokio::sync::watch;

use crate::provider::{IdentityEvent, IdentityProvider};

pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// A store whose contents belong to the signed-in user and must be dropped
/// when that user goes away.
#[async_trait]
pub trait DependentStore: Send + Sync {
    fn name(&self) -> &str;

    /// Discard all local state. Must not fail and must be safe to repeat.
    async fn teardown(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitPath {
    Provider,
    Timeout,
}

pub struct IdentityManager {
    provider: Arc<dyn IdentityProvider>,
    tenant: Arc<dyn TenantContextStore>,
    identity: watch::Sender<Option<AuthIdentity>>,
    loading: watch::Sender<bool>,
    init_done: AtomicBool,
    logging_out: AtomicBool,
    dependents: Mutex<Vec<Arc<dyn DependentStore>>>,
    init_timeout: Duration,
}

impl IdentityManager {
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        tenant: Arc<dyn TenantContextStore>,
        init_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            tenant,
            identity: watch::Sender::new(None),
            loading: watch::Sender::new(true),
            init_done: AtomicBool::new(false),
            logging_out: AtomicBool::new(false),
            dependents: Mutex::new(Vec::new()),
            init_timeout,
        }
    }

    #[must_use]
    pub fn from_config(
        provider: Arc<dyn IdentityProvider>,
        tenant: Arc<dyn TenantContextStore>,
        config: &IdentityConfig,
    ) -> Self {
        Self::new(provider, tenant, config.init_timeout())
    }

    /// Register a store to be torn down on sign-out, logout and user switch.
    pub fn register_dependent(&self, store: Arc<dyn DependentStore>) {
        self.dependents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(store);
    }

    #[must_use]
    pub fn identity(&self) -> Option<AuthIdentity> {
        self.identity.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthIdentity>> {
        self.identity.subscribe()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    #[must_use]
    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    /// Query the provider for an existing session.
    ///
    /// The loading flag becomes false within the configured timeout even if
    /// the provider never answers. An aborted provider call leaves the flag
    /// to the timer; any other provider error counts as "no identity" for
    /// this boot.
    pub async fn initialize(self: &Arc<Self>) -> Option<AuthIdentity> {
        let weak = Arc::downgrade(self);
        let timeout = self.init_timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(manager) = weak.upgrade() {
                manager.complete_init(InitPath::Timeout);
            }
        });

        match self.provider.current_session().await {
            Ok(identity) => {
                self.adopt_initial(identity);
                self.complete_init(InitPath::Provider);
                timer.abort();
            }
            Err(error) if error.is_abort() => {
                tracing::debug!(%error, "initial session query aborted");
            }
            Err(error) => {
                tracing::warn!(%error, "initial session query failed; continuing signed out");
                self.adopt_initial(None);
                self.complete_init(InitPath::Provider);
                timer.abort();
            }
        }

        self.identity()
    }

    /// First-wins completion of startup. Returns whether this call won.
    ///
    /// Every path that ends startup, timer included, checks the tenant cache
    /// owner against whatever identity is current before loading clears.
    fn complete_init(&self, path: InitPath) -> bool {
        if self.init_done.swap(true, Ordering::SeqCst) {
            return false;
        }
        if path == InitPath::Timeout {
            tracing::warn!(
                timeout_secs = self.init_timeout.as_secs(),
                "identity provider did not answer in time; continuing without waiting",
            );
        }
        let current = self.identity();
        ensure_cache_owner(
            self.tenant.as_ref(),
            current.as_ref().map(|i| i.user_id.as_str()),
        );
        self.loading.send_replace(false);
        true
    }

    /// A push event may already have delivered a newer identity; the
    /// startup answer never overrides it.
    fn adopt_initial(&self, identity: Option<AuthIdentity>) {
        if let Some(identity) = identity {
            self.identity.send_if_modified(|current| {
                if current.is_none() {
                    *current = Some(identity);
                    true
                } else {
                    false
                }
            });
        }
        let current = self.identity();
        ensure_cache_owner(
            self.tenant.as_ref(),
            current.as_ref().map(|i| i.user_id.as_str()),
        );
    }

    /// Handle an identity-provider push event.
    ///
    /// `InitialSession` is ignored (`initialize` covers it). Switching to a
    /// different user tears down every dependent store and clears the tenant
    /// cache before the new identity is visible, as does losing the identity.
    pub async fn on_identity_changed(&self, event: IdentityEvent, identity: Option<AuthIdentity>) {
        if event == IdentityEvent::InitialSession {
            tracing::debug!("ignoring initial session replay");
            return;
        }
        let identity = if event == IdentityEvent::SignedOut {
            None
        } else {
            identity
        };

        match identity {
            Some(next) => {
                let previous_user = self.identity.borrow().as_ref().map(|i| i.user_id.clone());
                if let Some(previous_user) = previous_user
                    && previous_user != next.user_id
                {
                    tracing::info!(
                        %event,
                        from = %previous_user,
                        to = %next.user_id,
                        "identity switched to another user; tearing down dependent state",
                    );
                    self.teardown_dependents().await;
                    self.tenant.clear_cache();
                }
                ensure_cache_owner(self.tenant.as_ref(), Some(&next.user_id));
                self.identity.send_replace(Some(next));
            }
            None => {
                tracing::info!(%event, "identity lost; tearing down dependent state");
                self.teardown_dependents().await;
                self.tenant.clear_cache();
                self.identity.send_replace(None);
            }
        }
    }

    /// Tear down dependent stores and the tenant cache, sign out with the
    /// provider, then clear the identity.
    ///
    /// A second call while one is in progress returns immediately. A failed
    /// provider sign-out is logged; local state is cleared regardless.
    pub async fn logout(&self) {
        if self.logging_out.swap(true, Ordering::SeqCst) {
            tracing::debug!("logout already in progress");
            return;
        }

        self.teardown_dependents().await;
        self.tenant.clear_cache();

        match self.provider.sign_out().await {
            Ok(()) => {}
            Err(error) if error.is_abort() => tracing::debug!(%error, "sign-out aborted"),
            Err(error) => tracing::warn!(%error, "provider sign-out failed; clearing local identity anyway"),
        }

        self.identity.send_replace(None);
        self.logging_out.store(false, Ordering::SeqCst);
    }

    async fn teardown_dependents(&self) {
        let dependents: Vec<Arc<dyn DependentStore>> = self
            .dependents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for store in dependents {
            tracing::debug!(store = store.name(), "tearing down dependent store");
            store.teardown().await;
        }
    }
}
