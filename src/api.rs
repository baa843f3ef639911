//! HTTP API handlers for Crunch.
//!
//! Member data (`/users`) requires a logged-in session; the distance
//! statistics and the login flow do not. Passwords and digests never appear
//! in logs or responses.

use std::collections::HashMap;

use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::aggregation::aggregate;
use crate::auth::verify_credentials;
use crate::model::{DistanceStatistics, LoginForm, MemberProfile};
use crate::pages::{LOGIN_HTML, LOGOUT_HTML, WELCOME_HTML};
use crate::session::{SessionHandle, SessionStore};
use crate::storage::Storage;
use crate::validation::{RegistrationError, validate_registration};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub sessions: SessionStore,
}

/// Build the application router with request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/login", get(get_login).post(post_login))
        .route("/logout", post(post_logout))
        .route("/users", get(get_users).post(post_users))
        .route("/distances", get(get_distances))
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Attach the session cookie to a response if the session was just issued.
fn with_session(session: &SessionHandle, response: impl IntoResponse) -> Response {
    let mut response = response.into_response();
    if let Some(cookie) = session.set_cookie() {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}

/// GET / - Welcome page. Query parameters are not accepted.
pub async fn index(Query(params): Query<HashMap<String, String>>) -> Response {
    if !params.is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }
    Html(WELCOME_HTML).into_response()
}

/// GET /login - Login form, or the logout form for an authenticated session.
#[instrument(skip_all)]
pub async fn get_login(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = state.sessions.resolve(&headers).await;
    let page = if session.authenticated {
        LOGOUT_HTML
    } else {
        LOGIN_HTML
    };
    with_session(&session, Html(page))
}

/// POST /login - Check credentials and start a new session.
///
/// # Form Fields
///
/// - `username` (required): The member's email
/// - `password` (required)
///
/// The session is always regenerated. It is marked authenticated only when
/// the credentials match. Responds with a redirect to `/login` either way,
/// or `400 Bad Request` when a field is missing.
#[instrument(skip_all)]
pub async fn post_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    if form.username.is_empty() || form.password.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let current = state.sessions.resolve(&headers).await;
    let mut session = state.sessions.regenerate(current.id).await;

    match verify_credentials(&state.storage, &form.username, &form.password).await {
        Ok(true) => {
            state.sessions.authenticate(&mut session).await;
            info!("Member logged in");
        }
        Ok(false) => info!("Login rejected"),
        Err(e) => {
            warn!(error = %e, "Failed to check credentials");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    with_session(&session, Redirect::to("/login"))
}

/// POST /logout - Invalidate the session and redirect to `/login`.
#[instrument(skip_all)]
pub async fn post_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let current = state.sessions.resolve(&headers).await;
    let session = state.sessions.regenerate(current.id).await;
    info!("Session closed");
    with_session(&session, Redirect::to("/login"))
}

/// GET /users - All registered members, without password digests.
///
/// Unauthenticated sessions are redirected to `/login`.
#[instrument(skip_all)]
pub async fn get_users(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = state.sessions.resolve(&headers).await;
    if !session.authenticated {
        return with_session(&session, Redirect::to("/login"));
    }

    match state.storage.list_members().await {
        Ok(members) => {
            let profiles: Vec<MemberProfile> = members.into_iter().map(Into::into).collect();
            info!(count = profiles.len(), "Members listed");
            with_session(&session, Json(profiles))
        }
        Err(e) => {
            warn!(error = %e, "Failed to list members");
            with_session(&session, StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /users - Register a new member.
///
/// # Form Fields
///
/// - `longitude`, `latitude`, `email`, `company`, `last_name`, `first_name` (required)
/// - `password` (optional)
///
/// # Response
///
/// - `201 Created` with a confirmation message
/// - `400 Bad Request` with a description of the invalid parameter
/// - `409 Conflict` when the email is already registered
#[instrument(skip_all)]
pub async fn post_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    let session = state.sessions.resolve(&headers).await;
    if !session.authenticated {
        return with_session(&session, Redirect::to("/login"));
    }

    let response = match register(&state.storage, &params).await {
        Ok(email) => {
            info!(email = %email, "Member registered");
            (
                StatusCode::CREATED,
                Html(format!("<h1>Registered new user '{email}'<h1>")),
            )
                .into_response()
        }
        Err(RegisterFailure::Invalid(e)) => {
            info!(reason = %e, "Registration rejected");
            (e.status_code(), e.to_string()).into_response()
        }
        Err(RegisterFailure::Storage(e)) => {
            warn!(error = %e, "Failed to register member");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    };

    with_session(&session, response)
}

enum RegisterFailure {
    Invalid(RegistrationError),
    Storage(anyhow::Error),
}

impl From<RegistrationError> for RegisterFailure {
    fn from(e: RegistrationError) -> Self {
        RegisterFailure::Invalid(e)
    }
}

impl From<anyhow::Error> for RegisterFailure {
    fn from(e: anyhow::Error) -> Self {
        RegisterFailure::Storage(e)
    }
}

/// Validate and store a registration, returning the new member's email.
async fn register(
    storage: &Storage,
    params: &HashMap<String, String>,
) -> Result<String, RegisterFailure> {
    let registration = validate_registration(params)?;

    if storage.email_exists(&registration.email).await? {
        return Err(RegistrationError::AlreadyExists(registration.email).into());
    }

    match storage.register_member(&registration).await {
        Ok(member) => Ok(member.email),
        // A concurrent registration can win the race past the existence check
        Err(e) if is_unique_violation(&e) => {
            Err(RegistrationError::AlreadyExists(registration.email).into())
        }
        Err(e) => Err(e.into()),
    }
}

fn is_unique_violation(e: &anyhow::Error) -> bool {
    e.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|e| e.is_unique_violation())
}

/// GET /distances - Statistics over the distances between all members.
///
/// # Response
///
/// ```json
/// {
///     "min": 0.0,
///     "max": 18260426.14597582,
///     "mean": 10473652.01956172,
///     "standard deviation": 4741588.665776003
/// }
/// ```
///
/// or, with fewer than two members,
///
/// ```json
/// { "error": "Not enough users to provide distance statistics." }
/// ```
#[instrument(skip(state))]
pub async fn get_distances(
    State(state): State<AppState>,
) -> Result<Json<DistanceStatistics>, StatusCode> {
    let coordinates = state.storage.list_coordinates().await.map_err(|e| {
        warn!(error = %e, "Failed to load member coordinates");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let count = coordinates.len();

    // Quadratic in the member count, so keep it off the async workers
    let stats = tokio::task::spawn_blocking(move || aggregate(&coordinates))
        .await
        .map_err(|e| {
            warn!(error = %e, "Distance aggregation task failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    match &stats {
        DistanceStatistics::Summary {
            min,
            max,
            mean,
            standard_deviation,
        } => info!(
            members = count,
            min,
            max,
            mean,
            standard_deviation,
            "Distance statistics computed"
        ),
        DistanceStatistics::Insufficient { .. } => {
            info!(members = count, "Not enough members for distance statistics")
        }
    }

    Ok(Json(stats))
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
