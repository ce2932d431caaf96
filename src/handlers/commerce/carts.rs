use crate::handlers::common::{form_body, map_service_error, success_response};
use crate::handlers::flash::{self, FlashLevel};
use crate::{auth::AuthUser, errors::ApiError, AppState};
use axum::{
    extract::{rejection::FormRejection, Path, State},
    http::HeaderMap,
    response::Response,
    routing::{get, post},
    Form, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Creates the router for cart endpoints
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(cart_view))
        .route("/cart/add/:product_id", post(add_to_cart))
        .route("/cart/update/:item_id", post(update_cart_item))
        .route("/cart/remove/:item_id", post(remove_from_cart))
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

/// JSON answer to XHR cart mutations
#[derive(Debug, Serialize)]
pub struct CartMutationResponse {
    pub success: bool,
    pub message: String,
    /// Number of units in the cart
    pub cart_total: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_total: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart_total_price: Option<Decimal>,
}

/// Cart page
async fn cart_view(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let cart = state
        .services
        .cart
        .get_cart(user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(flash::page(&headers, cart))
}

/// Add one unit of a product to the cart
async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Path(product_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let added = state
        .services
        .cart
        .add_item(user.user_id, product_id)
        .await
        .map_err(map_service_error)?;

    if flash::is_ajax(&headers) {
        return Ok(success_response(CartMutationResponse {
            success: true,
            message: "Product added to cart".to_string(),
            cart_total: added.totals.total_items,
            item_total: None,
            cart_total_price: Some(added.totals.total_price),
        }));
    }

    Ok(flash::redirect_with_flash(
        &format!("/product/{}", added.product_slug),
        FlashLevel::Success,
        format!("{} added to cart", added.product_name),
    ))
}

/// Set the quantity of a cart line; zero or less removes it
async fn update_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
    body: Result<Form<UpdateQuantityRequest>, FormRejection>,
) -> Result<Response, ApiError> {
    let payload = form_body(body)?;

    let updated = state
        .services
        .cart
        .update_item(user.user_id, item_id, payload.quantity)
        .await
        .map_err(map_service_error)?;

    let message = if updated.removed {
        "Item removed from cart"
    } else {
        "Quantity updated"
    };

    if flash::is_ajax(&headers) {
        return Ok(success_response(CartMutationResponse {
            success: true,
            message: message.to_string(),
            cart_total: updated.totals.total_items,
            item_total: Some(updated.item_total),
            cart_total_price: Some(updated.totals.total_price),
        }));
    }

    Ok(flash::redirect_with_flash("/cart", FlashLevel::Success, message))
}

/// Remove a line from the cart
async fn remove_from_cart(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let removed = state
        .services
        .cart
        .remove_item(user.user_id, item_id)
        .await
        .map_err(map_service_error)?;

    let message = format!("{} removed from cart", removed.product_name);
    if flash::is_ajax(&headers) {
        return Ok(success_response(CartMutationResponse {
            success: true,
            message,
            cart_total: removed.totals.total_items,
            item_total: None,
            cart_total_price: Some(removed.totals.total_price),
        }));
    }

    Ok(flash::redirect_with_flash("/cart", FlashLevel::Success, message))
}
