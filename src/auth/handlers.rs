use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{
            ConfirmEmailQuery, ForgotPasswordRequest, LoginRequest, PublicUser, RegisterRequest,
            ResetLinkQuery, ResetPasswordRequest, Validate, WorkflowOutcome,
        },
        extractors::AuthUser,
    },
    state::AppState,
};

const INVALID_PROPERTIES: &str = "Some properties are not valid";

type Reply = (StatusCode, Json<WorkflowOutcome>);

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/confirmemail", get(confirm_email).post(confirm_email))
        .route("/forgotpassword", post(forgot_password))
        .route("/resetpassword", get(reset_link).post(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn reply(outcome: WorkflowOutcome) -> Reply {
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(outcome))
}

fn invalid(errors: Vec<String>) -> Reply {
    warn!(?errors, "request rejected by shape checks");
    reply(WorkflowOutcome::failure(INVALID_PROPERTIES, errors))
}

/// Unwrap the body, turning an unreadable one into the failure envelope.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Reply> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|rejection| invalid(vec![rejection.body_text()]))
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, Reply> {
    params
        .map(|Query(inner)| inner)
        .map_err(|rejection| invalid(vec![rejection.body_text()]))
}

fn check(payload: &impl Validate) -> Result<(), Reply> {
    let errors = payload.validate();
    if errors.is_empty() {
        return Ok(());
    }
    Err(invalid(errors))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Reply {
    let mut payload = match body(payload) {
        Ok(payload) => payload,
        Err(rejected) => return rejected,
    };
    payload.email = normalize_email(&payload.email);
    if let Err(rejected) = check(&payload) {
        return rejected;
    }
    reply(state.workflow.register(&payload).await)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Reply {
    let mut payload = match body(payload) {
        Ok(payload) => payload,
        Err(rejected) => return rejected,
    };
    payload.email = normalize_email(&payload.email);
    if let Err(rejected) = check(&payload) {
        return rejected;
    }
    reply(state.workflow.login(&payload).await)
}

#[instrument(skip(state, params))]
pub async fn confirm_email(
    State(state): State<AppState>,
    params: Result<Query<ConfirmEmailQuery>, QueryRejection>,
) -> Reply {
    let params = match query(params) {
        Ok(params) => params,
        Err(rejected) => return rejected,
    };
    if let Err(rejected) = check(&params) {
        return rejected;
    }
    reply(state.workflow.confirm_email(&params.userid, &params.token).await)
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Reply {
    let mut payload = match body(payload) {
        Ok(payload) => payload,
        Err(rejected) => return rejected,
    };
    payload.email = normalize_email(&payload.email);
    if let Err(rejected) = check(&payload) {
        return rejected;
    }
    reply(state.workflow.forgot_password(&payload.email).await)
}

/// Landing point of the emailed reset link: hands back the email and token
/// a client needs to post the new password.
#[instrument(skip(params))]
pub async fn reset_link(
    params: Result<Query<ResetLinkQuery>, QueryRejection>,
) -> Result<Json<ResetLinkQuery>, Reply> {
    let mut params = query(params)?;
    params.email = normalize_email(&params.email);
    check(&params)?;
    Ok(Json(params))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Reply {
    let mut payload = match body(payload) {
        Ok(payload) => payload,
        Err(rejected) => return rejected,
    };
    payload.email = normalize_email(&payload.email);
    if let Err(rejected) = check(&payload) {
        return rejected;
    }
    reply(state.workflow.reset_password(&payload).await)
}

#[instrument(skip(claims))]
pub async fn get_me(AuthUser(claims): AuthUser) -> Json<PublicUser> {
    Json(PublicUser {
        id: claims.sub,
        email: claims.email,
    })
}
