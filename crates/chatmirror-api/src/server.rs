//! Relay server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use chatmirror_config::ServerConfig;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::http::routes::create_router;
use crate::state::ApiState;

/// The viewer-facing server.
pub struct ApiServer {
    config: ServerConfig,
    state: Arc<ApiState>,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: Arc<ApiState>) -> Self {
        Self { config, state }
    }

    /// Get the server address.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Router with request tracing and permissive CORS, since viewers are
    /// served from other origins.
    pub fn router(&self) -> Router {
        create_router(self.state.clone()).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
    }

    /// Serve until `shutdown` resolves.
    pub async fn run(
        &self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let addr: SocketAddr = self.addr().parse()?;
        let listener = TcpListener::bind(addr).await?;

        info!("chatmirror listening on {}", addr);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use chatmirror_cdp::testing::FakeDevtools;
    use chatmirror_config::Config;
    use chatmirror_sync::SyncService;
    use tower::ServiceExt;

    fn server(fake: &FakeDevtools, host: &str, port: u16) -> ApiServer {
        let mut config = Config::default();
        config.devtools.ports = vec![fake.port()];
        config.devtools.default_port = fake.port();
        let service = Arc::new(SyncService::new(&config).unwrap());
        let state = Arc::new(ApiState::new(service, &config.sync));
        ApiServer::new(
            ServerConfig {
                host: host.to_string(),
                port,
            },
            state,
        )
    }

    #[tokio::test]
    async fn test_server_addr_format() {
        let fake = FakeDevtools::start().await;
        assert_eq!(server(&fake, "192.168.1.1", 443).addr(), "192.168.1.1:443");
    }

    #[tokio::test]
    async fn test_router_allows_cross_origin_viewers() {
        let fake = FakeDevtools::start().await;
        let app = server(&fake, "127.0.0.1", 3004).router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "http://phone.local")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }
}
