//! Route handlers.

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures_util::stream::{Stream, StreamExt};
use protocol::messages::{
    FileContentResponse, FileListResponse, GroupsResponse, HealthStatus, ServiceInfo, TailEvent,
    UserInfoResponse,
};
use serde::{de::DeserializeOwned, Deserialize};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use super::auth::{resolve_user, AuthUser};
use super::error::{file_error_response, ApiError, ApiResult};
use super::AppState;

/// `Query` whose rejection is reported as an [`ApiError`] body.
#[derive(Debug, Clone)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(ApiQuery(value))
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub directory: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub start_line: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TailQuery {
    pub user: Option<String>,
}

pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        application: "LogView".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: "Read-only, access-controlled log file viewer".to_string(),
    })
}

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus::healthy())
}

pub async fn user_info(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
) -> Json<UserInfoResponse> {
    let groups = state.service.user_groups(&username);
    Json(UserInfoResponse { username, groups })
}

pub async fn list_files(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Json<FileListResponse>> {
    let files = state.service.list_directory(&username, &query.directory).await?;
    Ok(Json(FileListResponse {
        files,
        directory: query.directory,
        user_groups: state.service.user_groups(&username),
    }))
}

pub async fn file_content(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Path(file_path): Path<String>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<FileContentResponse>> {
    let start_line = query.start_line.unwrap_or(1);
    let page = state
        .service
        .read_file_page(&username, &file_path, start_line, query.page_size)
        .await?;

    Ok(Json(FileContentResponse {
        content: page.lines,
        file_path,
        start_line: page.start_line,
        page_size: page.page_size,
        total_lines: page.total_lines,
        has_more: page.has_more,
    }))
}

/// Server-sent events of appended lines.
///
/// Each line is one default event whose data is the JSON-encoded line; a
/// failure after streaming has begun arrives as a final `error` event.
pub async fn tail_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file_path): Path<String>,
    ApiQuery(query): ApiQuery<TailQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let username = resolve_user(&headers, &state.config.server.auth_header, query.user.as_deref())?;

    let lines = state
        .service
        .tail_file(&username, &file_path)
        .await?
        .until_cancelled(state.shutdown.clone());

    let events = lines.map(|item| {
        let event = match item {
            Ok(line) => TailEvent::Line(line),
            Err(err) => TailEvent::Error(file_error_response(&err).1),
        };
        Ok(to_sse_event(&event))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: &TailEvent) -> Event {
    let data = event.data().unwrap_or_else(|e| {
        tracing::error!("Failed to encode tail event: {}", e);
        "null".to_string()
    });
    let sse = match event.event_name() {
        Some(name) => Event::default().event(name),
        None => Event::default(),
    };
    sse.data(data)
}

pub async fn download_file(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
    Path(file_path): Path<String>,
) -> ApiResult<Response> {
    let download = state.service.open_download(&username, &file_path).await?;

    let safe_name: String = download
        .file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();
    let disposition = format!("attachment; filename=\"{}\"", safe_name);
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| ApiError::Internal(format!("invalid file name header: {}", e)))?;

    // Send exactly the stat'ed length even if the file keeps growing.
    let file = tokio::fs::File::from_std(download.file).take(download.size);
    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_LENGTH, HeaderValue::from(download.size)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

pub async fn config_groups(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
) -> Json<GroupsResponse> {
    Json(GroupsResponse {
        groups: state.service.group_summaries(&username),
        user_groups: state.service.user_groups(&username),
        base_path: state.service.root().display().to_string(),
    })
}
