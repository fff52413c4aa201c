//! First-party email/password sessions.
//!
//! A session token travels either as `Authorization: Bearer <token>` or in the
//! session cookie. Only its sha-256 digest is stored server side.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tower_cookies::cookie::{time, SameSite};
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

use crate::core::config::SessionConfig;
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::crm::error::CrmError;
use crate::crm::extract::ValidatedJson;
use crate::crm::types::User;
use crate::security::session::{digest_token, is_expired, issue_session};
use crate::security::validation::Validator;

/// The authenticated caller, resolved once per request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: User,
    pub token_digest: String,
}

impl RequestContext {
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for RequestContext {
    type Rejection = CrmError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = match bearer_token(parts) {
            Some(token) => token,
            None => Cookies::from_request_parts(parts, state)
                .await
                .ok()
                .and_then(|cookies| {
                    cookies
                        .get(&state.config.session.cookie_name)
                        .map(|cookie| cookie.value().to_string())
                })
                .ok_or(CrmError::Unauthorized)?,
        };

        let digest = digest_token(&token);
        let session = state
            .store
            .find_session(&digest)
            .await?
            .ok_or(CrmError::Unauthorized)?;
        if is_expired(&session, Utc::now()) {
            state.store.delete_session(&digest).await?;
            return Err(CrmError::Unauthorized);
        }

        let user = state
            .store
            .get_user(session.user_id)
            .await?
            .ok_or(CrmError::Unauthorized)?;
        Ok(Self {
            user,
            token_digest: digest,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

fn session_cookie(config: &SessionConfig, token: String) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .secure(config.secure_cookie)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(config.effective_ttl_hours()))
        .build()
}

async fn start_session(state: &AppState, cookies: &Cookies, user: User) -> Result<AuthResponse, CrmError> {
    let config = &state.config.session;
    let (token, session) = issue_session(user.id, config.effective_ttl_hours(), Utc::now());
    state.store.insert_session(&session).await?;
    cookies.add(session_cookie(config, token.clone()));
    Ok(AuthResponse { user, token })
}

async fn hash_password(state: &AppState, password: String) -> Result<String, CrmError> {
    let hasher = state.hasher.clone();
    tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|e| CrmError::Internal(e.to_string()))?
        .map_err(|e| CrmError::Internal(e.to_string()))
}

async fn verify_password(state: &AppState, password: String, hash: String) -> Result<bool, CrmError> {
    let hasher = state.hasher.clone();
    tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
        .await
        .map_err(|e| CrmError::Internal(e.to_string()))?
        .map_err(|e| CrmError::Internal(e.to_string()))
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), CrmError> {
    Validator::new()
        .email(&req.email, "email")
        .string_required(&req.name, "name")
        .max_length(Some(&req.name), "name", 200)
        .password(&req.password)
        .validate()?;

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        email: req.email.trim().to_lowercase(),
        name: req.name.trim().to_string(),
        profile_image_url: None,
        created_at: now,
        updated_at: now,
    };
    let password_hash = hash_password(&state, req.password).await?;
    if !state.store.insert_user(&user, &password_hash).await? {
        return Err(CrmError::Conflict("Email is already registered".to_string()));
    }
    info!("Registered user {}", user.id);

    let response = start_session(&state, &cookies, user).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<AuthResponse>, CrmError> {
    Validator::new()
        .string_required(&req.email, "email")
        .string_required(&req.password, "password")
        .validate()?;

    let email = req.email.trim().to_lowercase();
    let Some((user, hash)) = state.store.find_user_by_email(&email).await? else {
        warn!("Login attempt for unknown email");
        return Err(CrmError::Unauthorized);
    };
    if !verify_password(&state, req.password, hash).await? {
        warn!("Failed login for user {}", user.id);
        return Err(CrmError::Unauthorized);
    }

    Ok(Json(start_session(&state, &cookies, user).await?))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    ctx: RequestContext,
) -> Result<StatusCode, CrmError> {
    state.store.delete_session(&ctx.token_digest).await?;
    cookies.remove(
        Cookie::build((state.config.session.cookie_name.clone(), ""))
            .path("/")
            .build(),
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn current_user(ctx: RequestContext) -> Json<User> {
    Json(ctx.user)
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::AUTH_REGISTER, post(register))
        .route(ApiUrls::AUTH_LOGIN, post(login))
        .route(ApiUrls::AUTH_LOGOUT, post(logout))
        .route(ApiUrls::AUTH_USER, get(current_user))
}
