pub mod admin;
pub mod auth;
pub mod commerce;
pub mod common;
pub mod flash;
pub mod health;

use crate::events::EventSender;
use crate::services::{
    accounts::AccountService,
    commerce::{CartService, CheckoutService, ProductCatalogService, ReviewService},
    orders::OrderService,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub product_catalog: Arc<ProductCatalogService>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub order: Arc<OrderService>,
    pub reviews: Arc<ReviewService>,
    pub accounts: Arc<AccountService>,
}

impl AppServices {
    /// Build every service over one connection pool and event channel.
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self {
            product_catalog: Arc::new(ProductCatalogService::new(db.clone())),
            cart: Arc::new(CartService::new(db.clone(), event_sender.clone())),
            checkout: Arc::new(CheckoutService::new(db.clone(), event_sender.clone())),
            order: Arc::new(OrderService::new(db.clone(), event_sender.clone())),
            reviews: Arc::new(ReviewService::new(db.clone(), event_sender.clone())),
            accounts: Arc::new(AccountService::new(db, event_sender)),
        }
    }
}
