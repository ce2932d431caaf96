//! Staff-only endpoints: catalog maintenance, review moderation and order status.

use crate::{
    auth::AdminUser,
    entities::OrderStatus,
    errors::ApiError,
    handlers::common::{created_response, json_body, map_service_error, success_response},
    services::commerce::product_catalog_service::{
        CategoryInput, ProductImageInput, ProductInput, ProductUpdate,
    },
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/reviews", get(review_queue))
        .route("/admin/reviews/:id/approve", post(approve_review))
        .route("/admin/reviews/:id/reject", post(reject_review))
        .route("/admin/orders", get(list_orders))
        .route("/admin/orders/:id", get(get_order))
        .route("/admin/orders/:id/status", put(update_order_status))
        .route("/admin/categories", post(create_category))
        .route("/admin/products", post(create_product))
        .route("/admin/products/:id", put(update_product))
        .route("/admin/products/:id/images", post(add_product_image))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewQueueParams {
    pub approved: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderListParams {
    pub status: Option<OrderStatus>,
    pub page: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

async fn review_queue(
    State(state): State<AppState>,
    AdminUser(_staff): AdminUser,
    Query(params): Query<ReviewQueueParams>,
) -> Result<Response, ApiError> {
    let reviews = state
        .services
        .reviews
        .list_for_moderation(params.approved)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(reviews))
}

async fn approve_review(
    State(state): State<AppState>,
    AdminUser(staff): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    moderate(&state, &staff.username, id, true).await
}

async fn reject_review(
    State(state): State<AppState>,
    AdminUser(staff): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    moderate(&state, &staff.username, id, false).await
}

async fn moderate(
    state: &AppState,
    staff: &str,
    review_id: Uuid,
    approved: bool,
) -> Result<Response, ApiError> {
    let review = state
        .services
        .reviews
        .set_approval(review_id, approved)
        .await
        .map_err(map_service_error)?;

    info!(%review_id, approved, staff, "Review moderated by staff");
    Ok(success_response(review))
}

async fn list_orders(
    State(state): State<AppState>,
    AdminUser(_staff): AdminUser,
    Query(params): Query<OrderListParams>,
) -> Result<Response, ApiError> {
    let orders = state
        .services
        .order
        .list_all(params.status, params.page.as_deref())
        .await
        .map_err(map_service_error)?;

    Ok(success_response(orders))
}

async fn get_order(
    State(state): State<AppState>,
    AdminUser(_staff): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let order = state
        .services
        .order
        .get(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

async fn update_order_status(
    State(state): State<AppState>,
    AdminUser(staff): AdminUser,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateOrderStatusRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let payload = json_body(body)?;

    let order = state
        .services
        .order
        .update_status(id, payload.status)
        .await
        .map_err(map_service_error)?;

    info!(order_id = %id, staff = %staff.username, status = %order.status, "Order status set by staff");
    Ok(success_response(order))
}

async fn create_category(
    State(state): State<AppState>,
    AdminUser(_staff): AdminUser,
    body: Result<Json<CategoryInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let payload = json_body(body)?;

    let category = state
        .services
        .product_catalog
        .create_category(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(category))
}

async fn create_product(
    State(state): State<AppState>,
    AdminUser(_staff): AdminUser,
    body: Result<Json<ProductInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let payload = json_body(body)?;

    let product = state
        .services
        .product_catalog
        .create_product(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(product))
}

async fn update_product(
    State(state): State<AppState>,
    AdminUser(_staff): AdminUser,
    Path(id): Path<Uuid>,
    body: Result<Json<ProductUpdate>, JsonRejection>,
) -> Result<Response, ApiError> {
    let payload = json_body(body)?;

    let product = state
        .services
        .product_catalog
        .update_product(id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(product))
}

async fn add_product_image(
    State(state): State<AppState>,
    AdminUser(_staff): AdminUser,
    Path(id): Path<Uuid>,
    body: Result<Json<ProductImageInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let payload = json_body(body)?;

    let image = state
        .services
        .product_catalog
        .add_image(id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(image))
}
