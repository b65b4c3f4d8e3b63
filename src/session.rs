//! Session and authentication state.
//!
//! A [`Session`] owns the bearer token and the identity derived from it.
//! It is either anonymous or authenticated; an authenticated session's
//! profile is first provisional, decoded from the token claims, and later
//! synced from the profile endpoint in the background.
//!
//! ```text
//!                 login / persisted token
//!   Anonymous ────────────────────────────▶ Authenticated (pending)
//!       ▲                                          │ profile fetched
//!       │ logout, malformed token,                 ▼
//!       └──────── 401/403 on refresh ───── Authenticated (synced)
//! ```
//!
//! # Consistency
//!
//! * A user is published if and only if an access token is: both live in
//!   the same [`State`] variant.
//! * Every token mutation writes through to [`Storage`] before the new
//!   state is published, inside one critical section.
//! * Responses are applied only if nothing changed while they were in
//!   flight. A login response loses to any later login or logout; a
//!   profile response is dropped once its token is no longer current.
//!
//! # Example
//!
//! ```rust
//! use storefront_session::{config::Config, protocol::Credentials, session::Session};
//!
//! let config = Config::from_file("config.toml")?;
//! let session = Session::open(&config)?;
//!
//! session.login(&Credentials::new("jane@x.com", "secret")).await?;
//! if session.is_admin() {
//!     println!("welcome back, {}", session.current_user().unwrap().name);
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::{sync::watch, task::JoinHandle};
use url::Url;
use veil::Redact;

use crate::{
    claims,
    config::Config,
    error::{Error, ErrorKind, Result},
    gateway::{AuthApi, Gateway},
    navigation::{LogNavigator, Navigator},
    protocol::{Credentials, Registration, TokenResponse},
    storage::{self, FileStorage, Storage},
    user::{User, UserUpdate},
};

/// Role granting access to the administration area.
pub const ADMIN_ROLE: &str = "ROLE_ADMIN";

/// Whether the profile of an authenticated session has been fetched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProfileState {
    /// Only the token claims are known.
    Pending,
    /// The profile endpoint has answered at least once.
    Synced,
}

/// Published session state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct State {
    auth: Option<Authenticated>,
}

#[derive(Clone, PartialEq, Eq, Redact)]
struct Authenticated {
    #[redact]
    access_token: String,
    user: User,
    profile: ProfileState,
}

impl State {
    fn authenticated(access_token: String, user: User) -> Self {
        Self {
            auth: Some(Authenticated {
                access_token,
                user,
                profile: ProfileState::Pending,
            }),
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.auth.as_ref().map(|auth| auth.access_token.as_str())
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.auth.as_ref().map(|auth| &auth.user)
    }

    #[must_use]
    pub fn profile_state(&self) -> Option<ProfileState> {
        self.auth.as_ref().map(|auth| auth.profile)
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.user().is_some_and(|user| user.has_role(role))
    }

    #[must_use]
    pub fn has_any_role<I, T>(&self, roles: I) -> bool
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.user().is_some_and(|user| user.has_any_role(roles))
    }
}

/// Counters that tell in-flight responses whether they are still wanted.
#[derive(Debug, Default)]
struct Generations {
    /// Bumped by every login attempt and every logout.
    login: u64,
    /// Bumped whenever a session starts or ends.
    session: u64,
}

struct Inner<A, S, N> {
    api: A,
    storage: S,
    navigator: N,

    api_url: Url,
    login_route: String,

    /// Writers hold this lock while they touch storage and publish state.
    generations: Mutex<Generations>,
    state: watch::Sender<State>,
    hydration: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the session. Clones share the same state.
pub struct Session<A = Gateway, S = FileStorage, N = LogNavigator> {
    inner: Arc<Inner<A, S, N>>,
}

impl<A, S, N> Clone for Session<A, S, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Session {
    /// Opens the session described by `config`: the REST API gateway,
    /// file-backed storage and logged redirects.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the gateway cannot be built or the storage
    /// file cannot be read.
    pub fn open(config: &Config) -> Result<Self> {
        let api = Gateway::new(config)?;
        let storage = FileStorage::open(&config.storage_file)?;
        Ok(Self::create(api, storage, LogNavigator, config))
    }
}

impl<A, S, N> Session<A, S, N>
where
    A: AuthApi + 'static,
    S: Storage + 'static,
    N: Navigator + 'static,
{
    /// Creates the session, resuming any persisted one.
    ///
    /// A persisted access token whose claims decode makes the session
    /// authenticated right away, and its profile is fetched in the
    /// background when a Tokio runtime is available. A token that does not
    /// decode is treated as a logout.
    pub fn create(api: A, storage: S, navigator: N, config: &Config) -> Self {
        let (state, _) = watch::channel(State::default());

        let session = Self {
            inner: Arc::new(Inner {
                api,
                storage,
                navigator,
                api_url: config.api_url.clone(),
                login_route: config.login_route.clone(),
                generations: Mutex::new(Generations::default()),
                state,
                hydration: Mutex::new(None),
            }),
        };

        let persisted = session
            .inner
            .storage
            .get(storage::ACCESS_TOKEN)
            .filter(|token| !token.is_empty());
        if let Some(token) = persisted {
            match claims::user_from_token(&token) {
                Ok(user) => {
                    info!("resuming session of {}", user.email);
                    if let Ok(mut generations) = session.generations() {
                        generations.session += 1;
                        session
                            .inner
                            .state
                            .send_replace(State::authenticated(token, user));
                    }
                    session.spawn_hydration();
                }
                Err(e) => {
                    warn!("persisted access token is unusable: {e}");
                    session.logout();
                }
            }
        }

        session
    }

    /// Signs in and starts an authenticated session.
    ///
    /// Returns as soon as the tokens are persisted and the claims are
    /// published; the profile is fetched in the background.
    ///
    /// # Errors
    ///
    /// Will return `Err` and leave the session untouched if:
    /// - the API rejects the credentials or cannot be reached
    /// - a later login or a logout happened while this one was in flight
    ///
    /// Will return `Err` and log out if the issued token does not decode.
    pub async fn login(&self, credentials: &Credentials) -> Result<()> {
        let attempt = self.begin_login()?;

        let tokens = self.inner.api.sign_in(credentials).await.map_err(|e| {
            warn!("login of {} failed: {e}", credentials.email);
            e
        })?;

        match claims::user_from_token(&tokens.access_token) {
            Ok(user) => self.start(attempt, tokens, user)?,
            Err(e) => {
                error!("issued access token is unusable: {e}");
                if self.is_latest_login(attempt)? {
                    self.logout();
                }
                return Err(e.into());
            }
        }

        self.spawn_hydration();
        Ok(())
    }

    fn begin_login(&self) -> Result<u64> {
        let mut generations = self.generations()?;
        generations.login += 1;
        Ok(generations.login)
    }

    fn is_latest_login(&self, attempt: u64) -> Result<bool> {
        Ok(self.generations()?.login == attempt)
    }

    /// Persists `tokens` and publishes `user`, unless `attempt` has been
    /// superseded.
    fn start(&self, attempt: u64, tokens: TokenResponse, user: User) -> Result<()> {
        let mut generations = self.generations()?;
        if generations.login != attempt {
            debug!("discarding superseded login of {}", user.email);
            return Err(Error::aborted("login superseded by a newer request"));
        }

        self.persist(&tokens)?;

        info!("logged in as {}", user.email);
        generations.session += 1;
        self.inner
            .state
            .send_replace(State::authenticated(tokens.access_token, user));

        Ok(())
    }

    /// Writes `tokens` to storage, all or nothing.
    ///
    /// The access token is written last since it alone resumes a session.
    /// If any write fails, the keys written before it get their previous
    /// values back.
    fn persist(&self, tokens: &TokenResponse) -> Result<()> {
        let storage = &self.inner.storage;
        let writes = [
            (storage::REFRESH_TOKEN, tokens.refresh_token.as_str()),
            (storage::USERNAME, tokens.username.as_str()),
            (storage::ACCESS_TOKEN, tokens.access_token.as_str()),
        ];
        let previous: Vec<Option<String>> =
            writes.iter().map(|(key, _)| storage.get(key)).collect();

        for (written, (key, value)) in writes.iter().enumerate() {
            if let Err(e) = storage.set(key, value) {
                error!("failed to persist {key}: {e}");
                for ((key, _), value) in writes[..written].iter().zip(&previous) {
                    let restored = match value {
                        Some(value) => storage.set(key, value),
                        None => storage.remove(key),
                    };
                    if let Err(e) = restored {
                        error!("failed to restore {key}: {e}");
                    }
                }
                return Err(e);
            }
        }

        Ok(())
    }

    /// Creates a customer account. Does not log in.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the API rejects the registration or cannot be
    /// reached.
    pub async fn register(&self, registration: &Registration) -> Result<()> {
        match self.inner.api.sign_up(registration).await {
            Ok(()) => {
                info!("registered {}", registration.email);
                Ok(())
            }
            Err(e) => {
                warn!("registration of {} failed: {e}", registration.email);
                Err(e)
            }
        }
    }

    /// Ends the session and navigates to the login route.
    ///
    /// Clears the persisted keys first, then the published state. Calling
    /// this while anonymous only navigates. In-flight logins and profile
    /// fetches are discarded when they complete.
    ///
    /// A key that cannot be removed is blanked instead, and an empty access
    /// token does not resume a session. Storage failures are logged, never
    /// returned: the in-memory session ends regardless. Only if storage
    /// refuses both can the old token resume on the next start.
    pub fn logout(&self) {
        match self.generations() {
            Ok(mut generations) => {
                generations.login += 1;
                generations.session += 1;

                for key in storage::SESSION_KEYS {
                    if let Err(e) = self.inner.storage.remove(key) {
                        error!("failed to remove {key} from storage: {e}");
                        if let Err(e) = self.inner.storage.set(key, "") {
                            error!("failed to blank {key} in storage: {e}");
                        }
                    }
                }

                if self.inner.state.borrow().is_authenticated() {
                    info!("logged out");
                }
                self.inner.state.send_replace(State::default());
            }
            Err(e) => error!("failed to log out: {e}"),
        }

        self.inner.navigator.navigate(&self.inner.login_route);
    }

    /// Fetches the profile and merges it into the current user.
    ///
    /// Does nothing while anonymous. A `401` or `403` means the server no
    /// longer accepts the token and logs out. Any other failure leaves the
    /// session as it is.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the profile could not be fetched, or if the
    /// session changed while the request was in flight.
    pub async fn refresh_user_data(&self) -> Result<()> {
        let Some((token, session)) = self.current_token()? else {
            return Ok(());
        };

        match self.inner.api.me(&token).await {
            Ok(profile) => {
                let update = UserUpdate::from_profile(profile, &self.inner.api_url);
                self.merge_profile(session, &token, update)
            }
            Err(e) if e.is_rejection() => {
                if self.is_current(session, &token)? {
                    warn!("session rejected by the server: {e}");
                    self.logout();
                }
                Err(e)
            }
            Err(e) => {
                warn!("profile refresh failed: {e}");
                Err(e)
            }
        }
    }

    /// The access token together with the session it belongs to.
    fn current_token(&self) -> Result<Option<(String, u64)>> {
        let generations = self.generations()?;
        let state = self.inner.state.borrow();
        Ok(state
            .access_token()
            .map(|token| (token.to_owned(), generations.session)))
    }

    fn merge_profile(&self, session: u64, token: &str, update: UserUpdate) -> Result<()> {
        let generations = self.generations()?;
        if generations.session != session {
            debug!("discarding profile of an ended session");
            return Err(Error::aborted("session changed during profile refresh"));
        }

        let merged = self.inner.state.send_if_modified(|state| match state.auth {
            Some(ref mut auth) if auth.access_token == token => {
                auth.user = std::mem::take(&mut auth.user).merge(update);
                auth.profile = ProfileState::Synced;
                true
            }
            _ => false,
        });

        if merged {
            debug!("profile synced");
            Ok(())
        } else {
            Err(Error::aborted("access token changed during profile refresh"))
        }
    }

    fn is_current(&self, session: u64, token: &str) -> Result<bool> {
        let generations = self.generations()?;
        Ok(generations.session == session
            && self.inner.state.borrow().access_token() == Some(token))
    }

    /// Merges locally known changes into the current user, e.g. after a
    /// photo upload. Does nothing while anonymous.
    pub fn update_user(&self, update: UserUpdate) {
        self.inner.state.send_if_modified(|state| match state.auth {
            Some(ref mut auth) => {
                let merged = auth.user.clone().merge(update);
                let modified = merged != auth.user;
                auth.user = merged;
                modified
            }
            None => false,
        });
    }

    /// Forgets the in-memory session without touching storage or
    /// navigating. Meant for test isolation.
    pub fn reset(&self) {
        if let Ok(mut generations) = self.generations() {
            generations.login += 1;
            generations.session += 1;
            self.inner.state.send_replace(State::default());
        }
    }

    /// Waits for the background profile fetch, if one is running.
    pub async fn wait_for_profile(&self) {
        let handle = self
            .inner
            .hydration
            .lock()
            .ok()
            .and_then(|mut hydration| hydration.take());

        if let Some(handle) = handle {
            match handle.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => trace!("profile fetch was superseded"),
                Err(e) => error!("profile fetch task failed: {e}"),
            }
        }
    }

    fn spawn_hydration(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no async runtime; not fetching profile");
            return;
        };

        let session = self.clone();
        let handle = runtime.spawn(async move {
            match session.refresh_user_data().await {
                Ok(()) => {}
                Err(e) if e.kind == ErrorKind::Aborted => debug!("{e}"),
                Err(e) => debug!("background profile fetch failed: {e}"),
            }
        });

        // Only the newest session's profile is wanted.
        if let Ok(mut hydration) = self.inner.hydration.lock() {
            if let Some(previous) = hydration.replace(handle) {
                previous.abort();
            }
        }
    }

    fn generations(&self) -> Result<MutexGuard<'_, Generations>> {
        self.inner.generations.lock().map_err(Into::into)
    }
}

/// Read-only views.
impl<A, S, N> Session<A, S, N> {
    /// Snapshot of the published state.
    #[must_use]
    pub fn state(&self) -> State {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every published state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.inner.state.subscribe()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.inner.state.borrow().access_token().map(ToOwned::to_owned)
    }

    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.inner.state.borrow().user().cloned()
    }

    #[must_use]
    pub fn profile_state(&self) -> Option<ProfileState> {
        self.inner.state.borrow().profile_state()
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.inner.state.borrow().has_role(role)
    }

    #[must_use]
    pub fn has_any_role<I, T>(&self, roles: I) -> bool
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.inner.state.borrow().has_any_role(roles)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }
}
