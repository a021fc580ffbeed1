//! HTTP server setup.
//!
//! # Responsibilities
//! - Build every service from config and injected collaborators
//! - Create the Axum router and wire its middleware
//! - Serve until the shutdown signal fires

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header, HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::access::AccessCodeService;
use crate::builder::{ConfigService, SettingsService};
use crate::collaborators::{Collaborators, Dependencies};
use crate::config::GatewayConfig;
use crate::error::GatewayResult;
use crate::http::handlers;
use crate::observability::metrics;
use crate::resilience::BreakerSettings;
use crate::security::{admission_middleware, identity_middleware, AdmissionController, IdentityVerifier};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config_service: Arc<ConfigService>,
    pub settings_service: Arc<SettingsService>,
    pub access: AccessCodeService,
    pub deps: Arc<Dependencies>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
}

impl HttpServer {
    /// Wire services over `collaborators` and build the router.
    pub fn new(config: GatewayConfig, collaborators: Collaborators) -> GatewayResult<Self> {
        let deps = Arc::new(Dependencies::new(
            collaborators,
            BreakerSettings::from(&config.circuit_breaker),
        ));
        let access = AccessCodeService::new(deps.clone());

        let state = AppState {
            config_service: Arc::new(ConfigService::new(deps.clone(), access.clone(), &config)),
            settings_service: Arc::new(SettingsService::new(deps.clone(), &config)),
            access,
            deps,
        };

        let admission = Arc::new(AdmissionController::new(&config.rate_limit));
        let verifier = Arc::new(IdentityVerifier::new(&config.auth)?);

        let router = Self::build_router(&config, state, admission, verifier);
        Ok(Self { router, config })
    }

    /// `/health` sits outside admission and identity; `/api` passes
    /// admission first, then identity.
    #[allow(deprecated)]
    fn build_router(
        config: &GatewayConfig,
        state: AppState,
        admission: Arc<AdmissionController>,
        verifier: Arc<IdentityVerifier>,
    ) -> Router {
        let api = Router::new()
            .route("/api/config", get(handlers::get_config))
            .route(
                "/api/settings",
                get(handlers::get_settings).post(handlers::save_settings),
            )
            .route("/api/data", get(handlers::get_data))
            .route_layer(middleware::from_fn_with_state(verifier, identity_middleware))
            .route_layer(middleware::from_fn_with_state(admission, admission_middleware));

        let mut router = Router::new()
            .route("/health", get(handlers::health))
            .merge(api)
            .route_layer(middleware::from_fn(track_requests))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        if config.security.enable_headers {
            router = router
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::REFERRER_POLICY,
                    HeaderValue::from_static("no-referrer"),
                ));
        }

        router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// Count and time every routed request.
async fn track_requests(request: Request<Body>, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| route_label(path.as_str()))
        .unwrap_or("other");
    let started = Instant::now();

    let response = next.run(request).await;
    metrics::record_request(route, response.status().as_u16(), started.elapsed());
    response
}

fn route_label(path: &str) -> &'static str {
    match path {
        "/api/config" => "config",
        "/api/settings" => "settings",
        "/api/data" => "data",
        "/health" => "health",
        _ => "other",
    }
}
