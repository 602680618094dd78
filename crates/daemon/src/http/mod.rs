//! HTTP transport for the file service.
//!
//! Routes:
//! - `GET /` and `GET /health`: service information and liveness
//! - `GET /user`: the caller and their groups
//! - `GET /files?directory=`: filtered directory listing
//! - `GET /files/{*path}`: one page of a file
//! - `GET /tail/{*path}`: server-sent events of appended lines
//! - `GET /download/{*path}`: whole-file download
//! - `GET /config/groups`: group summaries for the caller

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    http::{HeaderName, HeaderValue, Method},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Config, ConfigError, CorsConfig};
use crate::service::FileService;

pub mod auth;
pub mod error;
pub mod handlers;

pub use auth::AuthUser;
pub use error::{ApiError, ApiResult};

/// State shared by all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: Arc<FileService>,
    pub config: Arc<Config>,
    /// Cancelled on shutdown; ends open tail streams.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Arc<Config>, shutdown: CancellationToken) -> Result<Self, ConfigError> {
        let service = Arc::new(FileService::new(config.clone())?);
        Ok(Self {
            service,
            config,
            shutdown,
        })
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/user", get(handlers::user_info))
        .route("/files", get(handlers::list_files))
        .route("/files/{*path}", get(handlers::file_content))
        .route("/tail/{*path}", get(handlers::tail_file))
        .route("/download/{*path}", get(handlers::download_file))
        .route("/config/groups", get(handlers::config_groups))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS layer from configuration.
///
/// A `*` entry allows anything. With credentials enabled a literal `*` is
/// not a valid response header, so the request's own value is mirrored.
pub fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let wildcard = |values: &[String]| values.iter().any(|v| v.trim() == "*");
    let credentials = cors.allow_credentials;

    let origin = if wildcard(&cors.allow_origins) {
        if credentials {
            AllowOrigin::mirror_request()
        } else {
            AllowOrigin::any()
        }
    } else {
        AllowOrigin::list(parse_all(&cors.allow_origins, |v| HeaderValue::from_str(v).ok()))
    };

    let methods = if wildcard(&cors.allow_methods) {
        if credentials {
            AllowMethods::mirror_request()
        } else {
            AllowMethods::any()
        }
    } else {
        AllowMethods::list(parse_all(&cors.allow_methods, |v| {
            Method::from_bytes(v.to_uppercase().as_bytes()).ok()
        }))
    };

    let headers = if wildcard(&cors.allow_headers) {
        if credentials {
            AllowHeaders::mirror_request()
        } else {
            AllowHeaders::any()
        }
    } else {
        AllowHeaders::list(parse_all(&cors.allow_headers, |v| {
            HeaderName::from_bytes(v.as_bytes()).ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(credentials)
}

fn parse_all<T>(values: &[String], parse: impl Fn(&str) -> Option<T>) -> Vec<T> {
    values
        .iter()
        .filter_map(|value| {
            let parsed = parse(value.trim());
            if parsed.is_none() {
                tracing::warn!("Ignoring invalid CORS entry: {:?}", value);
            }
            parsed
        })
        .collect()
}

/// Serve until the state's shutdown token is cancelled.
pub async fn serve(state: AppState) -> Result<()> {
    let addr = state.config.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(
        address = %addr,
        root = %state.service.root().display(),
        "LogView listening"
    );

    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server error")?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use futures_util::StreamExt;
    use serde_json::Value;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn setup() -> (TempDir, AppState) {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("app")).unwrap();
        fs::create_dir_all(temp_dir.path().join("system")).unwrap();
        fs::write(temp_dir.path().join("app/x.log"), "one\ntwo\nthree\n").unwrap();
        fs::write(temp_dir.path().join("app/notes.txt"), "hidden\n").unwrap();
        fs::write(temp_dir.path().join("system/syslog"), "boot\n").unwrap();

        let mut config = Config::default();
        config.server.base_path = temp_dir.path().to_path_buf();
        config.limits.tail_check_interval_ms = 20;
        config.groups = vec![
            GroupConfig {
                name: "app".to_string(),
                pattern: r"app/.*\.log".to_string(),
                users: vec!["alice".to_string()],
                description: Some("Application logs".to_string()),
            },
            GroupConfig {
                name: "system".to_string(),
                pattern: "system/".to_string(),
                users: vec!["root".to_string()],
                description: None,
            },
        ];

        let state = AppState::new(Arc::new(config), CancellationToken::new()).unwrap();
        (temp_dir, state)
    }

    async fn get(state: &AppState, uri: &str, user: Option<&str>) -> Response {
        let mut request = Request::builder().uri(uri);
        if let Some(user) = user {
            request = request.header("X-User", user);
        }
        router(state.clone())
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_root() {
        let (_dir, state) = setup();

        let response = get(&state, "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");

        let response = get(&state, "/", None).await;
        assert_eq!(json_body(response).await["application"], "LogView");
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let (_dir, state) = setup();

        let response = get(&state, "/user", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_user_info() {
        let (_dir, state) = setup();

        let body = json_body(get(&state, "/user", Some("alice")).await).await;
        assert_eq!(body["username"], "alice");
        assert_eq!(body["groups"], serde_json::json!(["app"]));
    }

    #[tokio::test]
    async fn test_list_files() {
        let (_dir, state) = setup();

        let response = get(&state, "/files?directory=app", Some("alice")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["directory"], "app");
        let files = body["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["relative_path"], "app/x.log");

        let body = json_body(get(&state, "/files?directory=app", Some("nobody")).await).await;
        assert!(body["files"].as_array().unwrap().is_empty());
        assert!(body["user_groups"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_content_page() {
        let (_dir, state) = setup();

        let response = get(&state, "/files/app/x.log?start_line=2&page_size=1", Some("alice")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["content"], serde_json::json!(["two"]));
        assert_eq!(body["file_path"], "app/x.log");
        assert_eq!(body["total_lines"], 3);
        assert_eq!(body["has_more"], true);
    }

    #[tokio::test]
    async fn test_file_errors_map_to_status() {
        let (_dir, state) = setup();

        let cases = [
            ("/files/system/syslog", StatusCode::FORBIDDEN, "ACCESS_DENIED"),
            ("/files/app/missing.log", StatusCode::NOT_FOUND, "NOT_FOUND"),
            ("/files/..%2F..%2Fetc%2Fpasswd", StatusCode::BAD_REQUEST, "OUT_OF_BOUNDS_PATH"),
            ("/files/app/x.log?start_line=0", StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ("/files?directory=app%2Fx.log", StatusCode::BAD_REQUEST, "NOT_A_DIRECTORY"),
            ("/files/app/x.log?start_line=-1", StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ("/files/app/x.log?page_size=ten", StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
        ];

        for (uri, status, code) in cases {
            let response = get(&state, uri, Some("alice")).await;
            assert_eq!(response.status(), status, "{}", uri);
            assert_eq!(json_body(response).await["error"]["code"], code, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_download() {
        let (_dir, state) = setup();

        let response = get(&state, "/download/app/x.log", Some("alice")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"x.log\""
        );
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "14");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"one\ntwo\nthree\n");

        let response = get(&state, "/download/system/syslog", Some("alice")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_config_groups() {
        let (_dir, state) = setup();

        let body = json_body(get(&state, "/config/groups", Some("alice")).await).await;
        let groups = body["groups"].as_array().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0]["users"], serde_json::json!(["alice"]));
        assert!(groups[1].get("users").is_none());
        assert_eq!(body["user_groups"], serde_json::json!(["app"]));
    }

    #[tokio::test]
    async fn test_tail_requires_access() {
        let (_dir, state) = setup();

        let response = get(&state, "/tail/system/syslog?user=alice", None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = get(&state, "/tail/app/x.log", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_tail_streams_appended_lines() {
        let (dir, state) = setup();

        let response = get(&state, "/tail/app/x.log?user=alice", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");

        append(&dir.path().join("app/x.log"), "four\n");

        let mut body = response.into_body().into_data_stream();
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(std::str::from_utf8(&chunk).unwrap(), "data: \"four\"\n\n");
    }

    #[tokio::test]
    async fn test_tail_ends_on_shutdown() {
        let (_dir, state) = setup();

        let response = get(&state, "/tail/app/x.log?user=alice", None).await;
        state.shutdown.cancel();

        let bytes = tokio::time::timeout(
            Duration::from_secs(5),
            to_bytes(response.into_body(), usize::MAX),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_cors_preflight_mirrors_origin_with_credentials() {
        let (_dir, state) = setup();

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/files")
            .header(header::ORIGIN, "https://logs.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://logs.example.com"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );
    }

    #[test]
    fn test_cors_layer_from_explicit_lists() {
        let cors = CorsConfig {
            allow_origins: vec!["https://logs.example.com".to_string()],
            allow_credentials: false,
            allow_methods: vec!["get".to_string()],
            allow_headers: vec!["X-User".to_string(), "bad header".to_string()],
        };
        // Layering validates the CORS rules.
        let _router: Router = Router::new()
            .route("/", axum::routing::get(|| async { "ok" }))
            .layer(cors_layer(&cors));
    }

    fn append(path: &Path, text: &str) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }
}
