use crate::handlers::common::map_service_error;
use crate::handlers::flash;
use crate::{auth::AuthUser, entities::order, errors::ApiError, AppState};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
    routing::get,
    Router,
};
use serde::Serialize;
use uuid::Uuid;

/// Creates the router for the shopper's order history
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(order_list))
        .route("/orders/:id", get(order_detail))
}

#[derive(Debug, Serialize)]
struct OrderList {
    orders: Vec<order::Model>,
}

/// The current user's orders, newest first
async fn order_list(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let orders = state
        .services
        .order
        .list_for_user(user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(flash::page(&headers, OrderList { orders }))
}

/// One of the current user's orders
async fn order_detail(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let detail = state
        .services
        .order
        .get_for_user(user.user_id, id)
        .await
        .map_err(map_service_error)?;

    Ok(flash::page(&headers, detail))
}
