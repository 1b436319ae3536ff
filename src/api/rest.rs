// REST API endpoints
// Every request takes a fresh snapshot on a blocking thread.

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use super::{DnsQuery, ErrorResponse};
use crate::config::Config;
use crate::dns::native_dns_backend;
use crate::error::SnapshotError;
use crate::routes::{NetRoute, lookup::RouteLookup, native_route_backend};
use crate::snapshot::{DnsSnapshot, RouteSnapshot};

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        AppState {
            config: Arc::new(config),
        }
    }
}

pub fn create_api_router(config: Config) -> Router {
    let state = Arc::new(AppState::new(config));

    Router::new()
        .route("/api/routes", get(get_routes))
        .route("/api/dns", get(get_dns))
        .route("/api/lookup/:addr", get(lookup_route))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn snapshot_error(e: SnapshotError) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.kind().to_string(),
            message: e.user_message(),
        }),
    )
}

fn join_error(e: tokio::task::JoinError) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "TaskFailed".to_string(),
            message: format!("Snapshot task did not complete: {}", e),
        }),
    )
}

async fn capture_routes(config: Arc<Config>) -> Result<RouteSnapshot, ApiError> {
    tokio::task::spawn_blocking(move || RouteSnapshot::capture(&native_route_backend(&config)))
        .await
        .map_err(join_error)?
        .map_err(snapshot_error)
}

async fn get_routes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RouteSnapshot>, ApiError> {
    let snapshot = capture_routes(state.config.clone()).await?;
    tracing::debug!(routes = snapshot.routes.len(), "served route snapshot");
    Ok(Json(snapshot))
}

async fn get_dns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DnsQuery>,
) -> Result<Json<DnsSnapshot>, ApiError> {
    let config = state.config.clone();
    let snapshot = tokio::task::spawn_blocking(move || {
        DnsSnapshot::capture(&native_dns_backend(&config), query.manual)
    })
    .await
    .map_err(join_error)?
    .map_err(snapshot_error)?;
    Ok(Json(snapshot))
}

async fn lookup_route(
    State(state): State<Arc<AppState>>,
    Path(addr): Path<String>,
) -> Result<Json<NetRoute>, ApiError> {
    let ip = addr.parse::<Ipv4Addr>().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "InvalidDestination".to_string(),
                message: format!("Not an IPv4 address: {}", addr),
            }),
        )
    })?;

    let snapshot = capture_routes(state.config.clone()).await?;
    let matched = RouteLookup::new(&snapshot.routes).lookup(ip).cloned();

    matched.map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "NoRouteToHost".to_string(),
                message: format!("No route found to {}", ip),
            }),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_error_body() {
        let (status, Json(body)) = snapshot_error(SnapshotError::UnsupportedPlatform);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "UnsupportedPlatform");
        assert_eq!(body.message, SnapshotError::UnsupportedPlatform.user_message());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_lookup_against_configured_route_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let route_file = dir.path().join("route");
        std::fs::write(
            &route_file,
            "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT\n\
             eth0\t00000000\t0100000A\t0003\t0\t0\t100\t00000000\t0\t0\t0\n\
             eth0\t0000000A\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.sources.route_file = route_file;
        let state = Arc::new(AppState::new(config));

        let Json(route) = lookup_route(State(state.clone()), Path("10.0.0.7".to_string()))
            .await
            .unwrap();
        assert_eq!(route.destination, "10.0.0.0/255.255.255.0");

        let Json(route) = lookup_route(State(state.clone()), Path("8.8.8.8".to_string()))
            .await
            .unwrap();
        assert_eq!(route.gateway, "10.0.0.1");

        let (status, _) = lookup_route(State(state), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_unreadable_route_file_is_500() {
        let mut config = Config::default();
        config.sources.route_file = "/nonexistent/net/route".into();
        let state = Arc::new(AppState::new(config));

        let (status, Json(body)) = get_routes(State(state)).await.unwrap_err();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Io");
    }
}
