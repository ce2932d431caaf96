use crate::{
    auth::{user, AccessToken, AuthUser},
    errors::ApiError,
    handlers::common::{created_response, form_body, map_service_error, success_response},
    handlers::flash,
    services::accounts::{ChangePasswordInput, LoginInput, ProfileInput, RegisterInput},
    AppState,
};
use axum::{
    extract::{rejection::FormRejection, State},
    http::HeaderMap,
    response::Response,
    routing::{get, post},
    Form, Router,
};
use serde::Serialize;
use tracing::info;

/// Token response carrying the account it was issued for
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    #[serde(flatten)]
    pub token: AccessToken,
    pub user: user::Model,
}

pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/logout", post(logout))
        .route("/profile", get(profile).post(update_profile))
        .route("/change-password", post(change_password))
}

fn issue_token(state: &AppState, user: user::Model) -> Result<TokenResponse, ApiError> {
    let token = state
        .auth
        .generate_token(&user)
        .map_err(|e| map_service_error(e.into()))?;
    Ok(TokenResponse { token, user })
}

/// Login handler: username or email plus password
pub async fn login(
    State(state): State<AppState>,
    body: Result<Form<LoginInput>, FormRejection>,
) -> Result<Response, ApiError> {
    let payload = form_body(body)?;

    let user = state
        .services
        .accounts
        .authenticate(&payload)
        .await
        .map_err(map_service_error)?;

    info!(user_id = %user.id, "User logged in");
    Ok(success_response(issue_token(&state, user)?))
}

/// Register handler; signs the new account in straight away
pub async fn register(
    State(state): State<AppState>,
    body: Result<Form<RegisterInput>, FormRejection>,
) -> Result<Response, ApiError> {
    let payload = form_body(body)?;

    let user = state
        .services
        .accounts
        .register(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(issue_token(&state, user)?))
}

/// Logout handler: the presented token stops working immediately
pub async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ApiError> {
    state
        .auth
        .revoke_token_id(&user.token_id, user.expires_at)
        .await;

    info!(user_id = %user.user_id, "User logged out");
    Ok(success_response(serde_json::json!({
        "success": true,
        "message": "You have been logged out",
    })))
}

/// Current user's profile with order count
pub async fn profile(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let profile = state
        .services
        .accounts
        .profile(user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(flash::page(&headers, profile))
}

/// Update names and email
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    body: Result<Form<ProfileInput>, FormRejection>,
) -> Result<Response, ApiError> {
    let payload = form_body(body)?;

    let profile = state
        .services
        .accounts
        .update_profile(user.user_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(profile))
}

/// Change password after confirming the current one
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    body: Result<Form<ChangePasswordInput>, FormRejection>,
) -> Result<Response, ApiError> {
    let payload = form_body(body)?;

    state
        .services
        .accounts
        .change_password(user.user_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(serde_json::json!({
        "success": true,
        "message": "Your password was changed",
    })))
}
