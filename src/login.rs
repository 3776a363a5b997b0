#![cfg(not(tarpaulin_include))]
#![cfg(feature = "web")]

use crate::app::{AppState, render_page};
use crate::error::PriceError;
use crate::mailer::{Notifier, RESET_PASSWORD_LENGTH, generate_password, reset_mail_body};
use crate::quote::QuoteSession;
use crate::store::SheetStore;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};
use uuid::Uuid;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session";

/// Column names of the Users table.
pub const EMAIL_COLUMN: &str = "email";
pub const PASSWORD_COLUMN: &str = "password";
pub const NAME_COLUMN: &str = "name";

/// Result of a login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Credentials are valid; carries the display name.
    Success { name: String },
    WrongPassword,
    UnknownEmail,
}

/// Hash a password with Argon2id and a fresh salt.
pub fn hash_password(password: &str) -> Result<String, PriceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PriceError::PasswordHash(e.to_string()))
}

/// Check a password against a stored hash. A malformed hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash.trim()) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Login and password maintenance against the Users table.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn SheetStore>,
    table: String,
}

impl Authenticator {
    pub fn new(store: Arc<dyn SheetStore>, table: &str) -> Self {
        Authenticator {
            store,
            table: table.to_string(),
        }
    }

    /// Scan the Users table for `email` and check `password` against its hash.
    pub fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, PriceError> {
        let email = email.trim();
        for user in self.store.all_rows(&self.table)? {
            let db_email = user.get(EMAIL_COLUMN).map(|v| v.trim()).unwrap_or("");
            if db_email != email {
                continue;
            }

            let hash = user.get(PASSWORD_COLUMN).map(String::as_str).unwrap_or("");
            if !verify_password(password, hash) {
                return Ok(LoginOutcome::WrongPassword);
            }
            let name = match user.get(NAME_COLUMN).map(|v| v.trim()) {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => email.to_string(),
            };
            return Ok(LoginOutcome::Success { name });
        }
        Ok(LoginOutcome::UnknownEmail)
    }

    pub fn change_password(&self, email: &str, new_password: &str) -> Result<(), PriceError> {
        if new_password.is_empty() {
            return Err(PriceError::EmptyPassword);
        }
        let row = self.user_row(email)?;
        let hash = hash_password(new_password)?;
        self.store.update_cell(&self.table, row, PASSWORD_COLUMN, &hash)
    }

    /// Mail a fresh random password to `email`, then store its hash.
    ///
    /// The stored hash only changes once the mail went out.
    pub fn reset_password(&self, email: &str, notifier: &dyn Notifier, subject: &str) -> Result<(), PriceError> {
        let email = email.trim();
        let row = self.user_row(email)?;

        let new_password = generate_password(RESET_PASSWORD_LENGTH);
        notifier.send(email, subject, &reset_mail_body(&new_password))?;

        let hash = hash_password(&new_password)?;
        self.store.update_cell(&self.table, row, PASSWORD_COLUMN, &hash)?;
        info!("Password reset mailed to {}", email);
        Ok(())
    }

    fn user_row(&self, email: &str) -> Result<usize, PriceError> {
        self.store
            .find_row(&self.table, EMAIL_COLUMN, email)?
            .ok_or_else(|| PriceError::UnknownEmail(email.trim().to_string()))
    }
}

/// Everything the server remembers about one login.
#[derive(Debug, Clone)]
pub struct UserSession {
    pub email: String,
    pub name: String,
    pub expires_at: SystemTime,
    pub quote: QuoteSession,
}

/// Session id and state of the request's login, placed in request extensions
/// by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub id: String,
    pub session: UserSession,
}

/// Active logins keyed by session id.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, UserSession>>,
    duration: Duration,
}

impl SessionStore {
    pub fn new(duration: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            duration,
        }
    }

    /// Open a session, sweeping out every expired one first.
    pub fn create(&self, email: &str, name: &str) -> String {
        let now = SystemTime::now();
        let session_id = Uuid::new_v4().to_string();
        let session = UserSession {
            email: email.to_string(),
            name: name.to_string(),
            expires_at: now + self.duration,
            quote: QuoteSession::default(),
        };

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(session_id.clone(), session);
        session_id
    }

    /// Number of sessions currently held, expired ones not yet swept included.
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The session for `session_id`, if it exists and has not expired.
    pub fn get(&self, session_id: &str) -> Option<UserSession> {
        let now = SystemTime::now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        match sessions.get(session_id) {
            Some(session) if session.expires_at > now => Some(session.clone()),
            Some(_) => {
                sessions.remove(session_id);
                None
            }
            None => None,
        }
    }

    /// Compute the next quote of `session_id` from its current one and store
    /// it, all under the write lock. A failed `change` leaves the quote as is.
    pub fn update_quote<F>(&self, session_id: &str, change: F) -> Result<QuoteSession, PriceError>
    where
        F: FnOnce(&QuoteSession) -> Result<QuoteSession, PriceError>,
    {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let session = sessions
            .get_mut(session_id)
            .filter(|session| session.expires_at > SystemTime::now())
            .ok_or(PriceError::SessionExpired)?;
        let next = change(&session.quote)?;
        session.quote = next.clone();
        Ok(next)
    }

    pub fn remove(&self, session_id: &str) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChangeRequest {
    pub new_password: String,
}

/// `?error=` / `?success=` banners on the login page.
#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

fn redirect_with(path: &str, key: &str, message: &str) -> Response {
    Redirect::to(&format!("{}?{}={}", path, key, urlencoding::encode(message))).into_response()
}

/// Serve the login page (login and forgot-password tabs).
pub async fn serve_login_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessageQuery>,
) -> Response {
    render_login(&state, query, false)
}

pub async fn serve_forgot_password_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessageQuery>,
) -> Response {
    render_login(&state, query, true)
}

fn render_login(state: &AppState, query: MessageQuery, forgot: bool) -> Response {
    render_page(
        state,
        "login",
        &serde_json::json!({
            "error": query.error,
            "success": query.success,
            "forgot": forgot,
        }),
    )
}

/// Check the submitted credentials and open a session on success.
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    match state.auth.login(&form.email, &form.password) {
        Ok(LoginOutcome::Success { name }) => {
            let session_id = state.sessions.create(form.email.trim(), &name);
            info!("{} signed in", form.email.trim());
            let mut cookie = Cookie::new(SESSION_COOKIE, session_id);
            cookie.set_http_only(true);
            cookie.set_path("/");
            (jar.add(cookie), Redirect::to("/")).into_response()
        }
        Ok(LoginOutcome::WrongPassword) => redirect_with("/login", "error", "Incorrect password"),
        Ok(LoginOutcome::UnknownEmail) => redirect_with("/login", "error", "This email is not registered"),
        Err(e) => {
            warn!("Login failed: {}", e);
            redirect_with("/login", "error", &format!("System error: {}", e))
        }
    }
}

/// End the session and clear the cookie.
pub async fn handle_logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value());
    }
    let mut cookie = Cookie::new(SESSION_COOKIE, "");
    cookie.set_path("/");
    (jar.remove(cookie), Redirect::to("/login")).into_response()
}

/// Mail a new password to the submitted address.
pub async fn handle_forgot_password(
    State(state): State<Arc<AppState>>,
    Form(request): Form<PasswordResetRequest>,
) -> Response {
    let email = request.email.trim().to_string();
    if email.is_empty() {
        return redirect_with("/forgot-password", "error", "Please enter your email");
    }
    let Some(notifier) = state.notifier.clone() else {
        return redirect_with("/forgot-password", "error", "The administrator has not configured a mail sender");
    };

    let auth = state.auth.clone();
    let subject = state.settings.mail.subject.clone();
    let result = tokio::task::spawn_blocking(move || auth.reset_password(&email, notifier.as_ref(), &subject)).await;

    match result {
        Ok(Ok(())) => redirect_with("/login", "success", "Your new password has been sent to your email"),
        Ok(Err(PriceError::UnknownEmail(_))) => {
            redirect_with("/forgot-password", "error", "This email is not registered")
        }
        Ok(Err(e)) => {
            warn!("Password reset failed: {}", e);
            redirect_with("/forgot-password", "error", &e.to_string())
        }
        Err(e) => {
            warn!("Password reset task failed: {}", e);
            redirect_with("/forgot-password", "error", "Server error")
        }
    }
}

/// Change the signed-in user's password.
pub async fn handle_change_password(
    State(state): State<Arc<AppState>>,
    axum::Extension(current): axum::Extension<CurrentSession>,
    Form(request): Form<PasswordChangeRequest>,
) -> Response {
    match state.auth.change_password(&current.session.email, &request.new_password) {
        Ok(()) => {
            info!("{} changed their password", current.session.email);
            redirect_with("/", "notice", "Password updated")
        }
        Err(PriceError::EmptyPassword) => redirect_with("/", "error", "Password cannot be empty"),
        Err(e) => {
            warn!("Password change failed: {}", e);
            redirect_with("/", "error", "Password change failed")
        }
    }
}

/// Authentication middleware.
///
/// Lets the request through with a [`CurrentSession`] extension when the
/// session cookie is valid. Otherwise API calls get 401 and pages are
/// redirected to the login page.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Some(session) = state.sessions.get(cookie.value()) {
            request.extensions_mut().insert(CurrentSession {
                id: cookie.value().to_string(),
                session,
            });
            return next.run(request).await;
        }
    }

    if request.uri().path().starts_with("/api/") {
        (StatusCode::UNAUTHORIZED, "Not signed in").into_response()
    } else {
        Redirect::to("/login").into_response()
    }
}
