use std::{
    net::{IpAddr, SocketAddr},
    str::FromStr,
    sync::Arc,
};

use anyhow::Context;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    Json, Router,
    extract::State,
    http::{self, HeaderMap, HeaderName, HeaderValue, Method},
    response::IntoResponse,
    routing::{get, post},
};
use products_pipeline::{Actor, PipelineEngine, Role};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{config::AppConfig, graphql::SchemaType};

const ACTOR_ID_HEADER: &str = "x-actor-id";
const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(Clone)]
pub struct AppState {
    pub engine: PipelineEngine,
    pub schema: SchemaType,
    pub config: Arc<AppConfig>,
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(config: ServeConfig, state: AppState) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    info!(%config.addr, "pipeline server listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let allow_origin = if allowed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed)
    };
    CorsLayer::new()
        .allow_headers([
            http::header::CONTENT_TYPE,
            HeaderName::from_static(ACTOR_ID_HEADER),
            HeaderName::from_static(ACTOR_ROLE_HEADER),
        ])
        .allow_methods([Method::POST, Method::GET])
        .allow_origin(allow_origin)
}

pub fn build_router(state: AppState) -> Router {
    let header_name = HeaderName::from_static("x-request-id");
    Router::new()
        .route("/health", get(health_handler))
        .route("/graphql", post(graphql_handler))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), MakeRequestUuid))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.cors_allowed_origins)),
        )
        .with_state(state)
}

async fn graphql_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: GraphQLRequest,
) -> GraphQLResponse {
    let mut req = request.into_inner();
    if let Some(actor) = actor_from_headers(&headers) {
        req = req.data(actor);
    }
    state.schema.execute(req).await.into()
}

/// Reads the caller identity set by the authenticating proxy. Anything
/// malformed is treated as anonymous.
pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Option<Actor> {
    let id = headers.get(ACTOR_ID_HEADER)?.to_str().ok()?;
    let role = headers.get(ACTOR_ROLE_HEADER)?.to_str().ok()?;
    let id = Uuid::parse_str(id.trim()).ok()?;
    match Role::from_str(role) {
        Ok(role) => Some(Actor::new(id, role)),
        Err(err) => {
            debug!(%err, "ignoring actor headers");
            None
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let ok = state.engine.ping().await.is_ok();
    Json(HealthResponse {
        ok,
        store: state.config.store.as_str(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    store: &'static str,
    version: &'static str,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{activity::ActivityFeed, config::StoreKind};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use products_pipeline::{InMemoryDealStore, TracingAuditSink};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn state() -> AppState {
        let engine = PipelineEngine::new(
            Arc::new(InMemoryDealStore::new()),
            Arc::new(TracingAuditSink),
        );
        AppState {
            schema: crate::graphql::build_schema(engine.clone(), ActivityFeed::default()),
            engine,
            config: Arc::new(AppConfig {
                store: StoreKind::Memory,
                ..AppConfig::default()
            }),
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_store_kind() {
        let response = build_router(state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = body_json(response).await;
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["store"], json!("memory"));
    }

    #[tokio::test]
    async fn graphql_uses_actor_headers() {
        let request = Request::post("/graphql")
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(ACTOR_ID_HEADER, Uuid::new_v4().to_string())
            .header(ACTOR_ROLE_HEADER, "bd_staff")
            .body(Body::from(
                json!({"query": r#"mutation { openDeal(title: "Yard") { stage version } }"#})
                    .to_string(),
            ))
            .unwrap();
        let response = build_router(state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body["data"]["openDeal"],
            json!({"stage": "NEW_REQUEST", "version": 1})
        );
    }

    #[test]
    fn malformed_actor_headers_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_ID_HEADER, HeaderValue::from_static("nope"));
        headers.insert(ACTOR_ROLE_HEADER, HeaderValue::from_static("ADMIN"));
        assert_eq!(actor_from_headers(&headers), None);

        let id = Uuid::new_v4();
        headers.insert(ACTOR_ID_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
        headers.insert(ACTOR_ROLE_HEADER, HeaderValue::from_static("janitor"));
        assert_eq!(actor_from_headers(&headers), None);

        headers.insert(ACTOR_ROLE_HEADER, HeaderValue::from_static("admin"));
        assert_eq!(actor_from_headers(&headers), Some(Actor::admin(id)));
    }
}
