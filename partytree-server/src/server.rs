//! HTTP listener.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::api;
use crate::config::ServerConfig;
use crate::engine::PartyEngine;
use crate::identity::ContactNormalizer;
use crate::store::TreeStore;

pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Open the store and build the engine.
    pub fn engine(&self) -> Result<PartyEngine> {
        let store = TreeStore::open(&self.config.db_path)
            .with_context(|| format!("opening database {}", self.config.db_path))?;
        let contacts = ContactNormalizer::new(self.config.default_country_code)
            .context("resolving default country code")?;
        Ok(PartyEngine::new(store, contacts))
    }

    /// Full application router with CORS.
    pub fn app(&self, engine: Arc<PartyEngine>) -> Router {
        api::router(engine).layer(self.cors())
    }

    fn cors(&self) -> CorsLayer {
        if self.config.cors_origins.is_empty() {
            return CorsLayer::permissive();
        }
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(
                self.config
                    .cors_origins
                    .iter()
                    .filter_map(|o| o.parse::<HeaderValue>().ok()),
            ))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    }

    pub async fn run(self) -> Result<()> {
        let engine = Arc::new(self.engine()?);
        let app = self.app(engine);
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .with_context(|| format!("binding {}", self.config.listen_addr))?;
        tracing::info!("Listening on {}", self.config.listen_addr);
        axum::serve(listener, app).await?;
        Ok(())
    }
}
