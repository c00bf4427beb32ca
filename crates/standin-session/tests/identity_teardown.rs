//! The session manager wired to the identity lifecycle.

mod common;

use std::sync::Arc;

use common::{FakeAuthority, FakeDataLayer, OPERATOR, identity, init_tracing, target, tenant_with_home};
use pretty_assertions::assert_eq;
use standin_auth::lifecycle::{DEFAULT_INIT_TIMEOUT, IdentityManager};
use standin_auth::provider::IdentityEvent;
use standin_auth::test_support::{FakeProvider, RecordingDependent};
use standin_core::session::SessionPhase;
use standin_core::test_support::InMemoryTenantStore;
use standin_session::manager::ImpersonationManager;
use standin_session::storage::{MemorySessionStorage, SessionStorage};
use standin_session::EffectiveIdentityResolver;

struct App {
    identity: Arc<IdentityManager>,
    sessions: Arc<ImpersonationManager>,
    tenant: Arc<InMemoryTenantStore>,
    storage: Arc<MemorySessionStorage>,
    other_store: Arc<RecordingDependent>,
}

async fn boot() -> App {
    init_tracing();
    let tenant = tenant_with_home();
    let identity = Arc::new(IdentityManager::new(
        Arc::new(FakeProvider::resolving(Some(identity(OPERATOR)))),
        tenant.clone(),
        DEFAULT_INIT_TIMEOUT,
    ));
    identity.initialize().await;

    let data = Arc::new(FakeDataLayer::default());
    let storage = Arc::new(MemorySessionStorage::new());
    let sessions = Arc::new(ImpersonationManager::new(
        Arc::new(FakeAuthority::new(tenant.clone())),
        data.clone(),
        data,
        tenant.clone(),
        storage.clone(),
        identity.subscribe(),
    ));
    let other_store = Arc::new(RecordingDependent::new("dashboard_cache"));
    identity.register_dependent(sessions.clone());
    identity.register_dependent(other_store.clone());

    App {
        identity,
        sessions,
        tenant,
        storage,
        other_store,
    }
}

#[tokio::test]
async fn sign_out_while_impersonating_tears_everything_down() {
    let app = boot().await;
    app.sessions
        .start(target("U", "OrgX"))
        .await
        .expect("start")
        .expect("not abandoned");

    app.identity
        .on_identity_changed(IdentityEvent::SignedOut, None)
        .await;

    assert!(app.identity.identity().is_none());
    assert!(!app.sessions.is_impersonating());
    assert_eq!(app.sessions.phase(), SessionPhase::Idle);
    assert!(app.storage.load().expect("load").is_none());
    assert_eq!(app.other_store.teardowns(), 1);
    assert!(app.tenant.clear_count() >= 1);
    assert!(app.tenant.current_id().is_none());
}

#[tokio::test]
async fn logout_while_impersonating_discards_session() {
    let app = boot().await;
    app.sessions.start(target("U", "OrgX")).await.expect("start");

    app.identity.logout().await;

    assert!(!app.sessions.is_impersonating());
    assert!(app.storage.raw().is_none());
    assert_eq!(app.other_store.teardowns(), 1);
}

#[tokio::test]
async fn restore_after_sign_out_finds_nothing() {
    let app = boot().await;
    app.sessions.start(target("U", "OrgX")).await.expect("start");
    app.identity
        .on_identity_changed(IdentityEvent::SignedOut, None)
        .await;

    assert!(app.sessions.restore().await.is_none());
}

#[tokio::test]
async fn start_after_sign_out_requires_identity() {
    let app = boot().await;
    app.identity
        .on_identity_changed(IdentityEvent::SignedOut, None)
        .await;

    let err = app
        .sessions
        .start(target("U", "OrgX"))
        .await
        .expect_err("signed out");
    assert!(matches!(err, standin_session::SessionError::NotAuthenticated));
}

#[tokio::test]
async fn switching_user_mid_session_discards_impersonation() {
    let app = boot().await;
    app.sessions
        .start(target("U", "OrgX"))
        .await
        .expect("start")
        .expect("not abandoned");
    let mut effective =
        EffectiveIdentityResolver::new(app.identity.subscribe(), app.sessions.subscribe());

    app.identity
        .on_identity_changed(IdentityEvent::SignedIn, Some(identity("someone_else")))
        .await;

    assert!(!app.sessions.is_impersonating());
    assert_eq!(app.sessions.phase(), SessionPhase::Idle);
    assert!(app.storage.raw().is_none());
    assert_eq!(app.other_store.teardowns(), 1);
    assert!(app.tenant.current_id().is_none());
    let now = effective.current().expect("signed in");
    assert_eq!(now.user_id, "someone_else");
    assert!(!now.is_impersonated);
}

#[tokio::test]
async fn token_refresh_mid_session_keeps_impersonation() {
    let app = boot().await;
    app.sessions.start(target("U", "OrgX")).await.expect("start");

    app.identity
        .on_identity_changed(IdentityEvent::TokenRefreshed, Some(identity(OPERATOR)))
        .await;

    assert!(app.sessions.is_impersonating());
    assert_eq!(app.tenant.current_id().as_deref(), Some("OrgX"));
    assert_eq!(app.other_store.teardowns(), 0);
}

#[tokio::test]
async fn effective_identity_follows_session_lifecycle() {
    let app = boot().await;
    let mut effective =
        EffectiveIdentityResolver::new(app.identity.subscribe(), app.sessions.subscribe());
    let before = effective.current().expect("signed in");
    assert_eq!(before.user_id, OPERATOR);
    assert!(!before.is_impersonated);

    app.sessions.start(target("U", "OrgX")).await.expect("start");
    let during = effective.current().expect("impersonating");
    assert_eq!(during.user_id, "U");
    assert_eq!(during.display_name, "User U");
    assert_eq!(during.role.as_deref(), Some("member"));
    assert!(during.is_impersonated);

    app.sessions.end().await;
    let after = effective.current().expect("back");
    assert_eq!(after, before);

    app.identity
        .on_identity_changed(IdentityEvent::SignedOut, None)
        .await;
    assert!(effective.current().is_none());
}
