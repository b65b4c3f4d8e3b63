//! Session lifecycle integration tests
//!
//! The remote API, storage and navigator are replaced by in-process
//! doubles. Calls to the API can be held at a gate to reproduce responses
//! arriving out of order.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use reqwest::StatusCode;
use serde_json::json;
use tokio::sync::{Notify, Semaphore};

use storefront_session::{
    config::Config,
    error::{Error, ErrorKind, Result},
    gateway::AuthApi,
    navigation::Navigator,
    protocol::{Credentials, Profile, Registration, TokenResponse},
    session::{ProfileState, Session},
    storage::{self, MemoryStorage, Storage},
    user::{UserId, UserUpdate},
};

const API_URL: &str = "https://shop.example/api";

/// What the profile endpoint answers for a token.
#[derive(Clone)]
enum Reply {
    Profile(Profile),
    Status(StatusCode),
}

impl Default for Reply {
    fn default() -> Self {
        Self::Profile(Profile::default())
    }
}

#[derive(Default)]
struct Backend {
    accounts: Mutex<HashMap<String, TokenResponse>>,
    replies: Mutex<HashMap<String, Reply>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    entered: Notify,
    registrations: Mutex<Vec<Registration>>,
    me_calls: AtomicUsize,
}

#[derive(Clone, Default)]
struct MockApi {
    backend: Arc<Backend>,
}

impl MockApi {
    fn account(&self, email: &str, access_token: &str) {
        self.backend.accounts.lock().unwrap().insert(
            email.to_owned(),
            TokenResponse {
                access_token: access_token.to_owned(),
                refresh_token: format!("refresh-{email}"),
                username: email.to_owned(),
            },
        );
    }

    fn reply(&self, token: &str, reply: Reply) {
        self.backend
            .replies
            .lock()
            .unwrap()
            .insert(token.to_owned(), reply);
    }

    /// Holds calls keyed by `key` (an e-mail for sign-in, a token for the
    /// profile) until [`MockApi::release`].
    fn hold(&self, key: &str) {
        self.backend
            .gates
            .lock()
            .unwrap()
            .insert(key.to_owned(), Arc::new(Semaphore::new(0)));
    }

    fn release(&self, key: &str) {
        if let Some(gate) = self.backend.gates.lock().unwrap().remove(key) {
            gate.add_permits(64);
        }
    }

    /// Resolves once a call is held at a gate.
    async fn entered(&self) {
        self.backend.entered.notified().await;
    }

    async fn pass(&self, key: &str) {
        let gate = self.backend.gates.lock().unwrap().get(key).cloned();
        if let Some(gate) = gate {
            self.backend.entered.notify_one();
            let _permit = gate.acquire().await;
        }
    }

    fn me_calls(&self) -> usize {
        self.backend.me_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthApi for MockApi {
    async fn sign_in(&self, credentials: &Credentials) -> Result<TokenResponse> {
        self.pass(&credentials.email).await;

        let account = self
            .backend
            .accounts
            .lock()
            .unwrap()
            .get(&credentials.email)
            .cloned();
        account.ok_or_else(|| Error::from_status(StatusCode::UNAUTHORIZED, "bad credentials"))
    }

    async fn sign_up(&self, registration: &Registration) -> Result<()> {
        self.backend
            .registrations
            .lock()
            .unwrap()
            .push(registration.clone());
        Ok(())
    }

    async fn me(&self, token: &str) -> Result<Profile> {
        self.backend.me_calls.fetch_add(1, Ordering::SeqCst);
        self.pass(token).await;

        let reply = self
            .backend
            .replies
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .unwrap_or_default();
        match reply {
            Reply::Profile(profile) => Ok(profile),
            Reply::Status(status) => Err(Error::from_status(status, "")),
        }
    }
}

#[derive(Clone, Default)]
struct RecordingNavigator {
    routes: Arc<Mutex<Vec<String>>>,
}

impl RecordingNavigator {
    fn routes(&self) -> Vec<String> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        self.routes.lock().unwrap().push(route.to_owned());
    }
}

/// Storage that can be told to fail one write, or every removal.
#[derive(Default)]
struct FlakyStorage {
    entries: MemoryStorage,
    sets: AtomicUsize,
    failing_set: AtomicUsize,
    failing_removes: AtomicBool,
}

impl FlakyStorage {
    /// Fails the `n`th write from now on.
    fn fail_write(&self, n: usize) {
        self.sets.store(0, Ordering::SeqCst);
        self.failing_set.store(n, Ordering::SeqCst);
    }

    fn fail_removes(&self) {
        self.failing_removes.store(true, Ordering::SeqCst);
    }
}

impl Storage for FlakyStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let n = self.sets.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.failing_set.load(Ordering::SeqCst) {
            return Err(Error::unavailable("storage offline"));
        }
        self.entries.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        if self.failing_removes.load(Ordering::SeqCst) {
            return Err(Error::unavailable("storage offline"));
        }
        self.entries.remove(key)
    }
}

fn flaky_session(
    api: &MockApi,
    storage: &Arc<FlakyStorage>,
) -> Session<MockApi, Arc<FlakyStorage>, RecordingNavigator> {
    let config = Config::with_api_url(API_URL).unwrap();
    Session::create(
        api.clone(),
        Arc::clone(storage),
        RecordingNavigator::default(),
        &config,
    )
}

type TestSession = Session<MockApi, Arc<MemoryStorage>, RecordingNavigator>;

struct Harness {
    api: MockApi,
    storage: Arc<MemoryStorage>,
    navigator: RecordingNavigator,
    session: TestSession,
}

impl Harness {
    fn new() -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new()))
    }

    fn with_storage(storage: Arc<MemoryStorage>) -> Self {
        let api = MockApi::default();
        let navigator = RecordingNavigator::default();
        let config = Config::with_api_url(API_URL).unwrap();
        let session = Session::create(
            api.clone(),
            Arc::clone(&storage),
            navigator.clone(),
            &config,
        );

        Self {
            api,
            storage,
            navigator,
            session,
        }
    }

    fn assert_consistent(&self) {
        let state = self.session.state();
        assert_eq!(
            state.user().is_some(),
            state.access_token().is_some(),
            "user and access token must be present together"
        );
    }
}

/// Builds an unsigned JWT carrying `claims`.
fn token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

fn jane_token() -> String {
    token(&json!({
        "sub": "jane@x.com",
        "id": 7,
        "name": "Jane",
        "roles": ["ROLE_USER"],
    }))
}

fn credentials(email: &str) -> Credentials {
    Credentials::new(email, "secret")
}

#[tokio::test]
async fn login_publishes_claims_and_persists_tokens() {
    let harness = Harness::new();
    let jane = jane_token();
    harness.api.account("jane@x.com", &jane);
    harness.assert_consistent();

    harness.session.login(&credentials("jane@x.com")).await.unwrap();
    harness.assert_consistent();

    let user = harness.session.current_user().unwrap();
    assert_eq!(user.id, UserId(7));
    assert_eq!(user.email, "jane@x.com");
    assert_eq!(user.name, "Jane");
    assert!(harness.session.has_role("ROLE_USER"));
    assert!(!harness.session.is_admin());
    assert_eq!(harness.session.access_token().as_deref(), Some(jane.as_str()));

    assert_eq!(
        harness.storage.get(storage::ACCESS_TOKEN).as_deref(),
        Some(jane.as_str())
    );
    assert_eq!(
        harness.storage.get(storage::REFRESH_TOKEN).as_deref(),
        Some("refresh-jane@x.com")
    );
    assert_eq!(
        harness.storage.get(storage::USERNAME).as_deref(),
        Some("jane@x.com")
    );
}

#[tokio::test]
async fn roles_round_trip_from_claims() {
    let harness = Harness::new();
    let admin = token(&json!({
        "sub": "a@x.com",
        "id": 1,
        "name": "A",
        "roles": ["ROLE_ADMIN"],
    }));
    harness.api.account("a@x.com", &admin);

    harness.session.login(&credentials("a@x.com")).await.unwrap();

    assert!(harness.session.has_role("ROLE_ADMIN"));
    assert!(harness.session.is_admin());
    assert!(!harness.session.has_role("ROLE_USER"));
    assert!(harness
        .session
        .has_any_role(["ROLE_USER", "ROLE_ADMIN"]));
    assert!(!harness.session.has_any_role(["ROLE_USER"]));
    assert!(!harness.session.has_any_role(Vec::<String>::new()));
}

#[tokio::test]
async fn name_falls_back_to_email_local_part() {
    let harness = Harness::new();
    harness
        .api
        .account("bob@x.com", &token(&json!({"sub": "bob@x.com", "id": 2})));

    harness.session.login(&credentials("bob@x.com")).await.unwrap();

    let user = harness.session.current_user().unwrap();
    assert_eq!(user.name, "bob");
    assert!(user.roles.is_empty());
}

#[tokio::test]
async fn profile_merges_over_claims() {
    let harness = Harness::new();
    let jane = jane_token();
    harness.api.account("jane@x.com", &jane);
    harness.api.reply(
        &jane,
        Reply::Profile(Profile {
            phone: Some("555".to_owned()),
            roles: Some(vec!["ROLE_USER".to_owned(), "ROLE_ADMIN".to_owned()]),
            foto_url: Some("me.png".to_owned()),
            ..Profile::default()
        }),
    );

    harness.session.login(&credentials("jane@x.com")).await.unwrap();
    assert_eq!(harness.session.profile_state(), Some(ProfileState::Pending));

    harness.session.wait_for_profile().await;
    harness.assert_consistent();

    let user = harness.session.current_user().unwrap();
    assert_eq!(user.name, "Jane");
    assert_eq!(user.email, "jane@x.com");
    assert_eq!(user.id, UserId(7));
    assert_eq!(user.phone.as_deref(), Some("555"));
    assert_eq!(
        user.avatar.as_deref(),
        Some("https://shop.example/api/arquivos/download/me.png")
    );
    assert!(harness.session.is_admin());
    assert_eq!(harness.session.profile_state(), Some(ProfileState::Synced));
    assert_eq!(harness.api.me_calls(), 1);
}

#[tokio::test]
async fn rejected_profile_fetch_logs_out() {
    let harness = Harness::new();
    let jane = jane_token();
    harness.api.account("jane@x.com", &jane);
    harness.api.reply(&jane, Reply::Status(StatusCode::UNAUTHORIZED));

    harness.session.login(&credentials("jane@x.com")).await.unwrap();
    harness.session.wait_for_profile().await;

    assert!(!harness.session.is_authenticated());
    assert_eq!(harness.session.current_user(), None);
    assert!(harness.storage.is_empty());
    assert_eq!(harness.navigator.routes(), ["/login"]);
    harness.assert_consistent();
}

#[tokio::test]
async fn forbidden_profile_fetch_logs_out() {
    let harness = Harness::new();
    let jane = jane_token();
    harness.api.account("jane@x.com", &jane);
    harness.session.login(&credentials("jane@x.com")).await.unwrap();
    harness.session.wait_for_profile().await;

    harness.api.reply(&jane, Reply::Status(StatusCode::FORBIDDEN));
    let e = harness.session.refresh_user_data().await.unwrap_err();

    assert_eq!(e.kind, ErrorKind::PermissionDenied);
    assert!(!harness.session.is_authenticated());
    assert!(harness.storage.is_empty());
}

#[tokio::test]
async fn server_errors_leave_session_untouched() {
    let harness = Harness::new();
    let jane = jane_token();
    harness.api.account("jane@x.com", &jane);
    harness.session.login(&credentials("jane@x.com")).await.unwrap();
    harness.session.wait_for_profile().await;
    let before = harness.session.state();

    for status in [
        StatusCode::INTERNAL_SERVER_ERROR,
        StatusCode::SERVICE_UNAVAILABLE,
        StatusCode::NOT_FOUND,
    ] {
        harness.api.reply(&jane, Reply::Status(status));
        assert!(harness.session.refresh_user_data().await.is_err());
    }

    assert_eq!(harness.session.state(), before);
    assert_eq!(
        harness.storage.get(storage::ACCESS_TOKEN).as_deref(),
        Some(jane.as_str())
    );
    assert!(harness.navigator.routes().is_empty());
}

#[tokio::test]
async fn refresh_while_anonymous_does_nothing() {
    let harness = Harness::new();

    harness.session.refresh_user_data().await.unwrap();

    assert_eq!(harness.api.me_calls(), 0);
    assert!(harness.navigator.routes().is_empty());
}

#[tokio::test]
async fn malformed_persisted_token_clears_storage() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set(storage::ACCESS_TOKEN, "not-a-jwt").unwrap();
    storage.set(storage::REFRESH_TOKEN, "r").unwrap();
    storage.set(storage::USERNAME, "jane@x.com").unwrap();

    let harness = Harness::with_storage(storage);

    assert!(!harness.session.is_authenticated());
    assert!(harness.storage.is_empty());
    assert_eq!(harness.navigator.routes(), ["/login"]);
    harness.assert_consistent();
}

#[tokio::test]
async fn persisted_token_resumes_session() {
    let storage = Arc::new(MemoryStorage::new());
    let jane = jane_token();
    storage.set(storage::ACCESS_TOKEN, &jane).unwrap();

    let harness = Harness::with_storage(storage);
    assert_eq!(harness.session.current_user().unwrap().name, "Jane");

    harness.session.wait_for_profile().await;
    assert_eq!(harness.api.me_calls(), 1);
    assert_eq!(harness.session.profile_state(), Some(ProfileState::Synced));
}

#[test]
fn resumes_without_runtime() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set(storage::ACCESS_TOKEN, &jane_token()).unwrap();

    let harness = Harness::with_storage(storage);

    assert!(harness.session.is_authenticated());
    assert_eq!(harness.session.profile_state(), Some(ProfileState::Pending));
    assert_eq!(harness.api.me_calls(), 0);
}

#[tokio::test]
async fn malformed_issued_token_logs_out() {
    let harness = Harness::new();
    harness.api.account("jane@x.com", "not-a-jwt");

    let e = harness
        .session
        .login(&credentials("jane@x.com"))
        .await
        .unwrap_err();

    assert_eq!(e.kind, ErrorKind::Unauthenticated);
    assert!(!harness.session.is_authenticated());
    assert!(harness.storage.is_empty());
    assert_eq!(harness.navigator.routes(), ["/login"]);
}

#[tokio::test]
async fn failed_login_leaves_state_untouched() {
    let harness = Harness::new();
    let jane = jane_token();
    harness.api.account("jane@x.com", &jane);
    harness.session.login(&credentials("jane@x.com")).await.unwrap();
    harness.session.wait_for_profile().await;
    let before = harness.session.state();

    let e = harness
        .session
        .login(&credentials("nobody@x.com"))
        .await
        .unwrap_err();

    assert!(e.is_rejection());
    assert_eq!(harness.session.state(), before);
    assert_eq!(
        harness.storage.get(storage::ACCESS_TOKEN).as_deref(),
        Some(jane.as_str())
    );
    assert!(harness.navigator.routes().is_empty());
}

#[tokio::test]
async fn logout_is_idempotent() {
    let harness = Harness::new();
    harness.api.account("jane@x.com", &jane_token());
    harness.session.login(&credentials("jane@x.com")).await.unwrap();

    harness.session.logout();
    let once = harness.session.state();
    harness.session.logout();

    assert_eq!(harness.session.state(), once);
    assert!(!harness.session.is_authenticated());
    assert!(harness.storage.is_empty());
    assert_eq!(harness.navigator.routes(), ["/login", "/login"]);
    harness.assert_consistent();
}

#[tokio::test]
async fn latest_login_wins() {
    let harness = Harness::new();
    let a = token(&json!({"sub": "a@x.com", "id": 1}));
    let b = token(&json!({"sub": "b@x.com", "id": 2}));
    harness.api.account("a@x.com", &a);
    harness.api.account("b@x.com", &b);
    harness.api.hold("a@x.com");

    let first = tokio::spawn({
        let session = harness.session.clone();
        async move { session.login(&credentials("a@x.com")).await }
    });
    harness.api.entered().await;

    harness.session.login(&credentials("b@x.com")).await.unwrap();
    harness.api.release("a@x.com");

    let e = first.await.unwrap().unwrap_err();
    assert_eq!(e.kind, ErrorKind::Aborted);

    assert_eq!(harness.session.current_user().unwrap().email, "b@x.com");
    assert_eq!(harness.session.access_token().as_deref(), Some(b.as_str()));
    assert_eq!(
        harness.storage.get(storage::ACCESS_TOKEN).as_deref(),
        Some(b.as_str())
    );
    harness.assert_consistent();
}

#[tokio::test]
async fn logout_cancels_login_in_flight() {
    let harness = Harness::new();
    harness.api.account("jane@x.com", &jane_token());
    harness.api.hold("jane@x.com");

    let login = tokio::spawn({
        let session = harness.session.clone();
        async move { session.login(&credentials("jane@x.com")).await }
    });
    harness.api.entered().await;

    harness.session.logout();
    harness.api.release("jane@x.com");

    assert_eq!(login.await.unwrap().unwrap_err().kind, ErrorKind::Aborted);
    assert!(!harness.session.is_authenticated());
    assert!(harness.storage.is_empty());
}

#[tokio::test]
async fn profile_after_logout_is_discarded() {
    let harness = Harness::new();
    let jane = jane_token();
    harness.api.account("jane@x.com", &jane);
    harness.api.reply(
        &jane,
        Reply::Profile(Profile {
            name: Some("Jane Doe".to_owned()),
            ..Profile::default()
        }),
    );
    harness.api.hold(&jane);

    harness.session.login(&credentials("jane@x.com")).await.unwrap();
    harness.api.entered().await;

    harness.session.logout();
    harness.api.release(&jane);
    harness.session.wait_for_profile().await;

    assert!(!harness.session.is_authenticated());
    assert!(harness.storage.is_empty());
    harness.assert_consistent();
}

#[tokio::test]
async fn stale_rejection_keeps_newer_session() {
    let harness = Harness::new();
    let a = token(&json!({"sub": "a@x.com", "id": 1}));
    let b = token(&json!({"sub": "b@x.com", "id": 2}));
    harness.api.account("a@x.com", &a);
    harness.api.account("b@x.com", &b);

    harness.session.login(&credentials("a@x.com")).await.unwrap();
    harness.session.wait_for_profile().await;

    harness.api.reply(&a, Reply::Status(StatusCode::UNAUTHORIZED));
    harness.api.hold(&a);

    let (refreshed, ()) = tokio::join!(harness.session.refresh_user_data(), async {
        harness.api.entered().await;
        harness.session.login(&credentials("b@x.com")).await.unwrap();
        harness.api.release(&a);
    });

    assert!(refreshed.unwrap_err().is_rejection());
    assert_eq!(harness.session.access_token().as_deref(), Some(b.as_str()));
    assert!(harness.navigator.routes().is_empty());

    harness.session.wait_for_profile().await;
    assert_eq!(harness.session.profile_state(), Some(ProfileState::Synced));
}

#[tokio::test]
async fn register_does_not_authenticate() {
    let harness = Harness::new();
    let registration = Registration::new(
        "Jane Doe",
        "jane@x.com",
        "secret",
        "123.456.789-09",
        "(11) 98765-4321",
    );

    harness.session.register(&registration).await.unwrap();

    assert!(!harness.session.is_authenticated());
    assert!(harness.storage.is_empty());
    let registrations = harness.api.backend.registrations.lock().unwrap();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].cpf, "12345678909");
}

#[tokio::test]
async fn update_user_merges_local_changes() {
    let harness = Harness::new();
    harness.api.account("jane@x.com", &jane_token());

    harness
        .session
        .update_user(UserUpdate::default().with_name("Nobody"));
    assert_eq!(harness.session.current_user(), None);
    harness.assert_consistent();

    harness.session.login(&credentials("jane@x.com")).await.unwrap();
    harness.session.update_user(
        UserUpdate::default()
            .with_phone("11 5555-0000")
            .with_avatar("https://cdn.example/jane.png"),
    );

    let user = harness.session.current_user().unwrap();
    assert_eq!(user.name, "Jane");
    assert_eq!(user.phone.as_deref(), Some("11 5555-0000"));
    assert_eq!(user.avatar.as_deref(), Some("https://cdn.example/jane.png"));
}

#[tokio::test]
async fn subscribers_observe_changes() {
    let harness = Harness::new();
    harness.api.account("jane@x.com", &jane_token());
    let mut changes = harness.session.subscribe();
    assert!(!changes.borrow_and_update().is_authenticated());

    harness.session.login(&credentials("jane@x.com")).await.unwrap();
    changes.changed().await.unwrap();
    assert!(changes.borrow_and_update().is_authenticated());

    harness.session.logout();
    changes.changed().await.unwrap();
    assert!(!changes.borrow_and_update().is_authenticated());
}

#[tokio::test]
async fn reset_forgets_memory_only() {
    let harness = Harness::new();
    let jane = jane_token();
    harness.api.account("jane@x.com", &jane);
    harness.session.login(&credentials("jane@x.com")).await.unwrap();

    harness.session.reset();

    assert!(!harness.session.is_authenticated());
    assert_eq!(
        harness.storage.get(storage::ACCESS_TOKEN).as_deref(),
        Some(jane.as_str())
    );
    assert!(harness.navigator.routes().is_empty());
}

#[tokio::test]
async fn failed_token_write_leaves_no_session_behind() {
    let api = MockApi::default();
    api.account("jane@x.com", &jane_token());
    let storage = Arc::new(FlakyStorage::default());
    let session = flaky_session(&api, &storage);

    storage.fail_write(2);
    let e = session.login(&credentials("jane@x.com")).await.unwrap_err();

    assert_eq!(e.kind, ErrorKind::Unavailable);
    assert!(!session.is_authenticated());
    assert_eq!(storage.get(storage::ACCESS_TOKEN), None);
    assert_eq!(storage.get(storage::REFRESH_TOKEN), None);
    assert_eq!(storage.get(storage::USERNAME), None);

    let reopened = flaky_session(&api, &storage);
    assert!(!reopened.is_authenticated());
}

#[tokio::test]
async fn failed_token_write_keeps_previous_session() {
    let api = MockApi::default();
    let a = token(&json!({"sub": "a@x.com", "id": 1}));
    let b = token(&json!({"sub": "b@x.com", "id": 2}));
    api.account("a@x.com", &a);
    api.account("b@x.com", &b);
    let storage = Arc::new(FlakyStorage::default());
    let session = flaky_session(&api, &storage);
    session.login(&credentials("a@x.com")).await.unwrap();
    session.wait_for_profile().await;

    storage.fail_write(2);
    assert!(session.login(&credentials("b@x.com")).await.is_err());

    assert_eq!(session.access_token().as_deref(), Some(a.as_str()));
    assert_eq!(
        storage.get(storage::ACCESS_TOKEN).as_deref(),
        Some(a.as_str())
    );
    assert_eq!(
        storage.get(storage::REFRESH_TOKEN).as_deref(),
        Some("refresh-a@x.com")
    );
    assert_eq!(storage.get(storage::USERNAME).as_deref(), Some("a@x.com"));

    let reopened = flaky_session(&api, &storage);
    assert_eq!(reopened.access_token().as_deref(), Some(a.as_str()));
}

#[tokio::test]
async fn logout_blanks_keys_it_cannot_remove() {
    let api = MockApi::default();
    api.account("jane@x.com", &jane_token());
    let storage = Arc::new(FlakyStorage::default());
    let session = flaky_session(&api, &storage);
    session.login(&credentials("jane@x.com")).await.unwrap();
    session.wait_for_profile().await;

    storage.fail_removes();
    session.logout();

    assert!(!session.is_authenticated());
    assert_eq!(storage.get(storage::ACCESS_TOKEN).as_deref(), Some(""));

    let reopened = flaky_session(&api, &storage);
    assert!(!reopened.is_authenticated());
    assert_eq!(
        reopened.is_authenticated(),
        reopened.current_user().is_some()
    );
}
