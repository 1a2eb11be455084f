use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Extension, Json,
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use super::{AppState, CurrentUser};
use crate::error::{Failure, ValidationError};
use crate::features::{
    AddShoppingItem, ChangeTaskPriority, CompleteTask, CreateMember, CreateTask,
    DeleteMember, DeleteShoppingItem, DeleteTask, GetMembers, GetShoppingList, GetTaskById,
    GetTasks, Login, Logout, MarkItemPurchased, MemberDto, PriorityDirection, Register,
    ShoppingItemDto, TaskDetailDto, TaskDto,
};
use crate::hub::RequestOptions;
use crate::models::{AppUser, DomainEvent};

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationError>,
}

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<T, ApiError>;

fn error_body(status: StatusCode, error: impl Into<String>, errors: Vec<ValidationError>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: error.into(),
            errors,
        }),
    )
}

/// Map a pipeline failure to a response.
/// Unexpected failures are logged in full server-side; clients only see a
/// generic message.
fn api_error(failure: Failure) -> ApiError {
    match failure {
        Failure::NotFound(_) => error_body(StatusCode::NOT_FOUND, failure.to_string(), Vec::new()),
        Failure::ValidationFailed(errors) => {
            error_body(StatusCode::BAD_REQUEST, "Validation failed", errors)
        }
        Failure::BusinessRuleViolation(error) => {
            error_body(StatusCode::CONFLICT, error.message.clone(), vec![error])
        }
        Failure::Cancelled => {
            error_body(StatusCode::SERVICE_UNAVAILABLE, "Request cancelled", Vec::new())
        }
        Failure::Unexpected(e) => {
            tracing::error!("Internal error: {:#}", e);
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                Vec::new(),
            )
        }
    }
}

fn as_user(current: &CurrentUser) -> RequestOptions {
    RequestOptions::as_user(current.audit_name())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Created {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PriorityInput {
    pub direction: PriorityDirection,
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Tasks
// ============================================================

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<GetTasks>,
) -> ApiResult<Json<Vec<TaskDto>>> {
    state
        .hub
        .send_with(query, as_user(&current))
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TaskDetailDto>> {
    state
        .hub
        .send_with(GetTaskById { task_id: id }, as_user(&current))
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn create_task(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(input): Json<CreateTask>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    state
        .hub
        .send_with(input, as_user(&current))
        .await
        .map(|id| (StatusCode::CREATED, Json(Created { id })))
        .map_err(api_error)
}

pub async fn complete_task(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .hub
        .send_with(CompleteTask { task_id: id }, as_user(&current))
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn change_task_priority(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<PriorityInput>,
) -> ApiResult<StatusCode> {
    let command = ChangeTaskPriority {
        task_id: id,
        direction: input.direction,
    };
    state
        .hub
        .send_with(command, as_user(&current))
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .hub
        .send_with(DeleteTask { task_id: id }, as_user(&current))
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================
// Members
// ============================================================

pub async fn list_members(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<MemberDto>>> {
    state
        .hub
        .send_with(GetMembers, as_user(&current))
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn create_member(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(input): Json<CreateMember>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    state
        .hub
        .send_with(input, as_user(&current))
        .await
        .map(|id| (StatusCode::CREATED, Json(Created { id })))
        .map_err(api_error)
}

pub async fn delete_member(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .hub
        .send_with(DeleteMember { member_id: id }, as_user(&current))
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================
// Shopping List
// ============================================================

pub async fn shopping_list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<GetShoppingList>,
) -> ApiResult<Json<Vec<ShoppingItemDto>>> {
    state
        .hub
        .send_with(query, as_user(&current))
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn add_shopping_item(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(input): Json<AddShoppingItem>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    state
        .hub
        .send_with(input, as_user(&current))
        .await
        .map(|id| (StatusCode::CREATED, Json(Created { id })))
        .map_err(api_error)
}

pub async fn mark_item_purchased(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .hub
        .send_with(MarkItemPurchased { item_id: id }, as_user(&current))
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_shopping_item(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .hub
        .send_with(DeleteShoppingItem { item_id: id }, as_user(&current))
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================
// Events
// ============================================================

/// Server-sent stream of committed domain events.
pub async fn event_stream(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!(user_id = %current.user.id, "Event stream opened");

    Sse::new(domain_events(state.hub.subscribe_events())).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// One SSE message per event, named after the event. Lagged receivers skip
/// what they missed.
fn domain_events(
    rx: broadcast::Receiver<DomainEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => match Event::default().event(event.name()).json_data(&event) {
                Ok(sse) => Some(Ok(sse)),
                Err(e) => {
                    tracing::warn!("Failed to serialize event: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Event stream error: {}", e);
                None
            }
        }
    })
}

// ============================================================
// Authentication
// ============================================================

pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<Register>,
) -> ApiResult<(StatusCode, Json<AppUser>)> {
    state
        .hub
        .send(input)
        .await
        .map(|user| (StatusCode::CREATED, Json(user)))
        .map_err(api_error)
}

/// Sets the session cookie. The token itself is not echoed in the body.
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<Login>,
) -> ApiResult<impl IntoResponse> {
    let session = state.hub.send(input).await.map_err(api_error)?;
    let cookie = state.security.session_cookie(&session.token);
    Ok(([(header::SET_COOKIE, cookie)], Json(session.user)))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<impl IntoResponse> {
    let options = as_user(&current);
    state
        .hub
        .send_with(Logout { token: current.token }, options)
        .await
        .map_err(api_error)?;
    let cookie = state.security.expired_session_cookie();
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]))
}
