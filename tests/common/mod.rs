// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use axum::{routing::get, Json, Router};
use marketplace_auth::config::{Config, SessionConfig};
use marketplace_auth::db::RestDb;
use marketplace_auth::error::AuthError;
use marketplace_auth::middleware::auth::create_access_token;
use marketplace_auth::models::{AuthEvent, Identity, Session};
use marketplace_auth::routes::create_router;
use marketplace_auth::services::AuthProvider;
use marketplace_auth::session::cache::is_auth_key;
use marketplace_auth::session::{
    KeyValueStore, MemoryStorage, SessionController, SessionSnapshot,
};
use marketplace_auth::AppState;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Create a test app backed by the in-memory profile store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState {
        config: Config::test_default(),
        db: RestDb::new_in_memory(),
    });
    (create_router(state.clone()), state)
}

/// Access token accepted by `create_test_app`.
#[allow(dead_code)]
pub fn test_token(user_id: &str) -> String {
    create_access_token(
        user_id,
        Some("a@test.com"),
        &Config::test_default().jwt_secret,
        3600,
    )
    .unwrap()
}

/// Session for `user_id` carrying a valid test access token.
#[allow(dead_code)]
pub fn test_session(user_id: &str, email: &str) -> Session {
    Session::new(
        test_token(user_id),
        format!("refresh-{}", user_id),
        3600,
        Identity::new(user_id, Some(email)),
    )
}

/// Serve `router` on an ephemeral local port. Returns the base URL.
#[allow(dead_code)]
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Stub `/api/profile` endpoint that counts requests.
#[allow(dead_code)]
pub struct StubProfileServer {
    pub base_url: String,
    pub hits: Arc<AtomicUsize>,
    pub last_authorization: Arc<Mutex<Option<String>>>,
}

#[allow(dead_code)]
impl StubProfileServer {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.last_authorization.lock().unwrap().clone()
    }
}

/// Spawn a stub profile endpoint answering `status` + `body` after `delay`.
#[allow(dead_code)]
pub async fn spawn_profile_server(
    status: StatusCode,
    body: serde_json::Value,
    delay: Duration,
) -> StubProfileServer {
    let hits = Arc::new(AtomicUsize::new(0));
    let last_authorization = Arc::new(Mutex::new(None));

    let handler_hits = hits.clone();
    let handler_auth = last_authorization.clone();
    let router = Router::new().route(
        "/api/profile",
        get(move |headers: HeaderMap| {
            let hits = handler_hits.clone();
            let auth = handler_auth.clone();
            let body = body.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                *auth.lock().unwrap() = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                (status, Json(body))
            }
        }),
    );

    StubProfileServer {
        base_url: serve(router).await,
        hits,
        last_authorization,
    }
}

/// Scriptable auth provider.
///
/// `emit` updates the stub's live session the way the real service would
/// before announcing the event. A successful `refresh_session` announces
/// `TOKEN_REFRESHED`, as `GoTrueClient` does.
#[allow(dead_code)]
pub struct StubAuth {
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
    pub hang_get_session: AtomicBool,
    pub get_session_error: Mutex<Option<AuthError>>,
    pub refresh_result: Mutex<Option<Result<Session, AuthError>>>,
    pub sign_out_error: Mutex<Option<AuthError>>,
    pub refresh_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
}

#[allow(dead_code)]
impl StubAuth {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            session: Mutex::new(None),
            events,
            hang_get_session: AtomicBool::new(false),
            get_session_error: Mutex::new(None),
            refresh_result: Mutex::new(None),
            sign_out_error: Mutex::new(None),
            refresh_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        })
    }

    pub fn with_session(session: Session) -> Arc<Self> {
        let stub = Self::new();
        *stub.session.lock().unwrap() = Some(session);
        stub
    }

    pub fn emit(&self, event: AuthEvent) {
        {
            let mut current = self.session.lock().unwrap();
            match &event {
                AuthEvent::SignedOut => *current = None,
                other => {
                    if let Some(session) = other.session() {
                        *current = Some(session.clone());
                    }
                }
            }
        }
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl AuthProvider for StubAuth {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        if self.hang_get_session.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(err) = self.get_session_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.session.lock().unwrap().clone())
    }

    async fn refresh_session(&self, _refresh_token: &str) -> Result<Session, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let result = self
            .refresh_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(Err(AuthError::Rejected {
                status: 400,
                message: "invalid_grant".to_string(),
            }));
        if let Ok(session) = &result {
            self.emit(AuthEvent::TokenRefreshed(session.clone()));
        }
        result
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        _password: &str,
    ) -> Result<Session, AuthError> {
        let session = test_session("u1", email);
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.emit(AuthEvent::SignedOut);
        match self.sign_out_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

/// Controller wired to `auth`, the profile API at `api_base_url`, and two
/// fresh in-memory storages.
#[allow(dead_code)]
pub struct TestSession {
    pub controller: SessionController,
    pub local: Arc<MemoryStorage>,
    pub session_storage: Arc<MemoryStorage>,
}

#[allow(dead_code)]
pub fn session_controller(auth: Arc<StubAuth>, api_base_url: &str) -> TestSession {
    session_controller_with(auth, api_base_url, Arc::new(MemoryStorage::new()))
}

#[allow(dead_code)]
pub fn session_controller_with(
    auth: Arc<StubAuth>,
    api_base_url: &str,
    local: Arc<MemoryStorage>,
) -> TestSession {
    let session_storage = Arc::new(MemoryStorage::new());
    let config = SessionConfig {
        api_base_url: api_base_url.to_string(),
        http_timeout: Duration::from_secs(5),
        ..SessionConfig::default()
    };
    let controller = SessionController::new(
        config,
        auth,
        local.clone() as Arc<dyn KeyValueStore>,
        session_storage.clone() as Arc<dyn KeyValueStore>,
    )
    .unwrap();

    TestSession {
        controller,
        local,
        session_storage,
    }
}

/// Wait (bounded) until the session state satisfies `predicate`.
#[allow(dead_code)]
pub async fn wait_for_state(
    controller: &SessionController,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx = controller.watch();
    let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for session state")
        .expect("session store dropped")
        .clone();
    snapshot
}

/// Keys in `storage` that the logout purge should have removed.
#[allow(dead_code)]
pub fn auth_keys(storage: &dyn KeyValueStore) -> Vec<String> {
    let config = SessionConfig::default();
    storage
        .keys()
        .into_iter()
        .filter(|k| is_auth_key(k, &config.purge_patterns))
        .collect()
}

/// Poll `condition` until it holds (bounded).
#[allow(dead_code)]
pub async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true");
}
