//! Terko Shop API library
//!
//! Catalog, cart, checkout, order history, reviews and accounts for a small
//! online shop, served as JSON over HTTP.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod services;
pub mod tracing;

use axum::{extract::FromRef, middleware, Router};
use sea_orm::DatabaseConnection;
use std::{sync::Arc, time::Duration};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer};

use crate::auth::{AuthConfig, AuthService};
use crate::handlers::{
    admin::admin_routes,
    auth::auth_router,
    commerce::{carts_routes, checkout_routes, orders_routes, products_routes},
    health::health_routes,
    AppServices,
};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: Arc<events::EventSender>,
    pub services: AppServices,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let event_sender = Arc::new(event_sender);
        let auth = Arc::new(AuthService::new(AuthConfig::from(&config)));
        let services = AppServices::new(db.clone(), event_sender.clone());

        Self {
            db,
            config: Arc::new(config),
            event_sender,
            services,
            auth,
        }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Every storefront, account and staff route
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(products_routes())
        .merge(carts_routes())
        .merge(checkout_routes())
        .merge(orders_routes())
        .merge(auth_router())
        .merge(admin_routes())
        .nest("/health", health_routes())
}

/// Builds the complete application router with its middleware stack.
///
/// CORS is layered on by the binary since it depends on deployment settings.
pub fn app_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    api_routes()
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}
