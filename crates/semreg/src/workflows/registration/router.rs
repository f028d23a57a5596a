use std::sync::Arc;

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{
        header::{AUTHORIZATION, COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::auth::Caller;

use super::accounts::Credentials;
use super::admin::{NewStudent, NewUser};
use super::assignments::{AssignmentDraft, AssignmentId, AssignmentPatch};
use super::desk::VerificationUpdate;
use super::domain::{StudentId, UserId};
use super::error::RegistryError;
use super::fines::FineUpdate;
use super::notify::NotificationId;
use super::registry::Registry;
use super::windows::{WindowDraft, WindowId, WindowPatch};

const SESSION_COOKIE: &str = "sid";
const DEFAULT_LOG_PAGE: usize = 100;

/// Router exposing every registry operation under the shared JSON envelope.
pub fn registry_router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/student/registration", get(registration_status_handler))
        .route("/student/registration/apply", post(apply_handler))
        .route(
            "/tutor/registrations/:student_id/approve",
            post(approve_handler),
        )
        .route(
            "/tutor/semester-registrations",
            get(list_windows_handler).post(create_window_handler),
        )
        .route(
            "/tutor/semester-registrations/:id",
            put(update_window_handler).delete(delete_window_handler),
        )
        .route(
            "/tutor/semester-registrations/:id/statistics",
            get(window_statistics_handler),
        )
        .route(
            "/tutor/semester-registrations/:id/reminders",
            post(reminders_handler),
        )
        .route("/tutor/assignments", get(my_scopes_handler))
        .route(
            "/staff/students/:student_id/fines",
            get(fines_handler).put(update_fines_handler),
        )
        .route(
            "/staff/students/:student_id/verification",
            put(update_verification_handler),
        )
        .route(
            "/admin/users",
            get(list_users_handler).post(create_user_handler),
        )
        .route("/admin/users/:id", axum::routing::delete(delete_user_handler))
        .route(
            "/admin/students",
            get(list_students_handler).post(create_student_handler),
        )
        .route(
            "/admin/tutor-assignments",
            get(list_assignments_handler).post(create_assignment_handler),
        )
        .route(
            "/admin/tutor-assignments/:id",
            put(update_assignment_handler).delete(delete_assignment_handler),
        )
        .route("/admin/logs", get(logs_handler))
        .route("/notifications", get(notifications_handler))
        .route("/notifications/:id/read", post(mark_read_handler))
        .with_state(registry)
}

/// Response body shared by every route.
#[derive(Debug, Serialize)]
struct Envelope<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

fn success<T: Serialize>(status: StatusCode, data: T) -> Response {
    let body = Envelope {
        success: true,
        data: Some(data),
        message: None,
    };
    (status, Json(body)).into_response()
}

fn acknowledged(message: &str) -> Response {
    let body = Envelope::<()> {
        success: true,
        data: None,
        message: Some(message.to_string()),
    };
    (StatusCode::OK, Json(body)).into_response()
}

fn failure(status: StatusCode, message: String) -> Response {
    let body = Envelope::<()> {
        success: false,
        data: None,
        message: Some(message),
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = match &self {
            RegistryError::Validation(_) => StatusCode::BAD_REQUEST,
            RegistryError::Unauthenticated | RegistryError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            RegistryError::Forbidden(_) => StatusCode::FORBIDDEN,
            RegistryError::Conflict(_) => StatusCode::CONFLICT,
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::Precondition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RegistryError::Repository(_)
            | RegistryError::Notification(_)
            | RegistryError::Credential(_) => {
                error!(error = %self, "registry operation failed");
                return failure(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                );
            }
        };
        failure(status, self.to_string())
    }
}

/// Session token from `Authorization: Bearer` or the `sid` cookie.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Caller resolved from the request's session token.
pub struct Authenticated(pub Caller);

#[async_trait]
impl FromRequestParts<Arc<Registry>> for Authenticated {
    type Rejection = RegistryError;

    async fn from_request_parts(
        parts: &mut Parts,
        registry: &Arc<Registry>,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers);
        registry.authenticate(token.as_deref()).map(Authenticated)
    }
}

/// Malformed bodies surface as validation failures inside the envelope.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, RegistryError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| RegistryError::Validation(rejection.body_text()))
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, RegistryError> {
    params
        .map(|Query(value)| value)
        .map_err(|rejection| RegistryError::Validation(rejection.body_text()))
}

pub(crate) async fn login_handler(
    State(registry): State<Arc<Registry>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, RegistryError> {
    let credentials = body(payload)?;
    let session = registry.login(&credentials)?;
    let cookie = format!(
        "{SESSION_COOKIE}={}; HttpOnly; Path=/; SameSite=Lax",
        session.token
    );

    let mut response = success(StatusCode::OK, session);
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(SET_COOKIE, value);
    }
    Ok(response)
}

pub(crate) async fn logout_handler(
    State(registry): State<Arc<Registry>>,
    headers: HeaderMap,
) -> Result<Response, RegistryError> {
    let token = session_token(&headers).ok_or(RegistryError::Unauthenticated)?;
    if !registry.logout(&token) {
        return Err(RegistryError::Unauthenticated);
    }

    let mut response = acknowledged("logged out");
    response.headers_mut().insert(
        SET_COOKIE,
        HeaderValue::from_static("sid=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0"),
    );
    Ok(response)
}

pub(crate) async fn registration_status_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
) -> Result<Response, RegistryError> {
    let outcome = registry.registration_status(&caller)?;
    Ok(success(StatusCode::OK, outcome))
}

pub(crate) async fn apply_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
) -> Result<Response, RegistryError> {
    let outcome = registry.apply(&caller)?;
    Ok(success(StatusCode::OK, outcome))
}

pub(crate) async fn approve_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
    Path(student_id): Path<String>,
) -> Result<Response, RegistryError> {
    let outcome = registry.approve(&caller, &StudentId(student_id))?;
    Ok(success(StatusCode::OK, outcome))
}

pub(crate) async fn list_windows_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
) -> Result<Response, RegistryError> {
    Ok(success(StatusCode::OK, registry.windows_for(&caller)?))
}

pub(crate) async fn create_window_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
    payload: Result<Json<WindowDraft>, JsonRejection>,
) -> Result<Response, RegistryError> {
    let window = registry.create_window(&caller, &body(payload)?)?;
    Ok(success(StatusCode::CREATED, window))
}

pub(crate) async fn update_window_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
    payload: Result<Json<WindowPatch>, JsonRejection>,
) -> Result<Response, RegistryError> {
    let window = registry.update_window(&caller, &WindowId(id), &body(payload)?)?;
    Ok(success(StatusCode::OK, window))
}

pub(crate) async fn delete_window_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
) -> Result<Response, RegistryError> {
    registry.delete_window(&caller, &WindowId(id))?;
    Ok(acknowledged("registration window deleted"))
}

pub(crate) async fn window_statistics_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
) -> Result<Response, RegistryError> {
    let stats = registry.window_statistics(&caller, &WindowId(id))?;
    Ok(success(StatusCode::OK, stats))
}

pub(crate) async fn reminders_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
) -> Result<Response, RegistryError> {
    let report = registry.send_reminders(&caller, &WindowId(id))?;
    Ok(success(StatusCode::OK, report))
}

pub(crate) async fn my_scopes_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
) -> Result<Response, RegistryError> {
    Ok(success(StatusCode::OK, registry.my_scopes(&caller)?))
}

pub(crate) async fn fines_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
    Path(student_id): Path<String>,
) -> Result<Response, RegistryError> {
    let summary = registry.fines(&caller, &StudentId(student_id))?;
    Ok(success(StatusCode::OK, summary))
}

pub(crate) async fn update_fines_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
    Path(student_id): Path<String>,
    payload: Result<Json<FineUpdate>, JsonRejection>,
) -> Result<Response, RegistryError> {
    let summary = registry.update_fines(&caller, &StudentId(student_id), &body(payload)?)?;
    Ok(success(StatusCode::OK, summary))
}

pub(crate) async fn update_verification_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
    Path(student_id): Path<String>,
    payload: Result<Json<VerificationUpdate>, JsonRejection>,
) -> Result<Response, RegistryError> {
    let student =
        registry.update_verification(&caller, &StudentId(student_id), &body(payload)?)?;
    Ok(success(StatusCode::OK, student))
}

pub(crate) async fn list_users_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
) -> Result<Response, RegistryError> {
    Ok(success(StatusCode::OK, registry.list_users(&caller)?))
}

pub(crate) async fn create_user_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> Result<Response, RegistryError> {
    let user = registry.create_user(&caller, &body(payload)?)?;
    Ok(success(StatusCode::CREATED, user))
}

pub(crate) async fn delete_user_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
) -> Result<Response, RegistryError> {
    registry.delete_user(&caller, &UserId(id))?;
    Ok(acknowledged("user deleted"))
}

pub(crate) async fn list_students_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
) -> Result<Response, RegistryError> {
    Ok(success(StatusCode::OK, registry.list_students(&caller)?))
}

pub(crate) async fn create_student_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
    payload: Result<Json<NewStudent>, JsonRejection>,
) -> Result<Response, RegistryError> {
    let student = registry.create_student(&caller, &body(payload)?)?;
    Ok(success(StatusCode::CREATED, student))
}

pub(crate) async fn list_assignments_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
) -> Result<Response, RegistryError> {
    Ok(success(StatusCode::OK, registry.list_assignments(&caller)?))
}

pub(crate) async fn create_assignment_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
    payload: Result<Json<AssignmentDraft>, JsonRejection>,
) -> Result<Response, RegistryError> {
    let assignment = registry.create_assignment(&caller, &body(payload)?)?;
    Ok(success(StatusCode::CREATED, assignment))
}

pub(crate) async fn update_assignment_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
    payload: Result<Json<AssignmentPatch>, JsonRejection>,
) -> Result<Response, RegistryError> {
    let assignment = registry.update_assignment(&caller, &AssignmentId(id), &body(payload)?)?;
    Ok(success(StatusCode::OK, assignment))
}

pub(crate) async fn delete_assignment_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
) -> Result<Response, RegistryError> {
    registry.delete_assignment(&caller, &AssignmentId(id))?;
    Ok(acknowledged("tutor assignment deleted"))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LogQuery {
    limit: Option<usize>,
}

pub(crate) async fn logs_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
    params: Result<Query<LogQuery>, QueryRejection>,
) -> Result<Response, RegistryError> {
    let limit = query(params)?.limit.unwrap_or(DEFAULT_LOG_PAGE);
    let logs = registry.logs(&caller, limit)?;
    Ok(success(StatusCode::OK, logs))
}

pub(crate) async fn notifications_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
) -> Result<Response, RegistryError> {
    Ok(success(StatusCode::OK, registry.notifications_for(&caller)?))
}

pub(crate) async fn mark_read_handler(
    State(registry): State<Arc<Registry>>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
) -> Result<Response, RegistryError> {
    let notification = registry.mark_notification_read(&caller, &NotificationId(id))?;
    Ok(success(StatusCode::OK, notification))
}
