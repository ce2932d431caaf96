use crate::handlers::common::{created_response, form_body, map_service_error};
use crate::handlers::flash::{self, FlashLevel};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    services::commerce::{CartView, ShippingDetails},
    AppState,
};
use axum::{
    extract::{rejection::FormRejection, State},
    http::HeaderMap,
    response::Response,
    routing::get,
    Form, Router,
};
use serde::Serialize;

const EMPTY_CART_MESSAGE: &str = "Your cart is empty";

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/checkout", get(checkout_page).post(place_order))
}

/// Checkout page model: the cart being bought plus a blank shipping form
#[derive(Debug, Serialize)]
struct CheckoutPage {
    cart: CartView,
    form: ShippingDetails,
}

/// Show the checkout page, or send the shopper back to an empty cart
async fn checkout_page(
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

    if cart.is_empty() {
        return Ok(flash::redirect_with_flash("/cart", FlashLevel::Warning, EMPTY_CART_MESSAGE));
    }

    Ok(flash::page(
        &headers,
        CheckoutPage {
            cart,
            form: ShippingDetails::default(),
        },
    ))
}

/// Place an order from the cart
async fn place_order(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    body: Result<Form<ShippingDetails>, FormRejection>,
) -> Result<Response, ApiError> {
    let cart = state
        .services
        .cart
        .get_cart(user.user_id)
        .await
        .map_err(map_service_error)?;
    if cart.is_empty() {
        return Ok(flash::redirect_with_flash("/cart", FlashLevel::Warning, EMPTY_CART_MESSAGE));
    }

    let shipping = form_body(body)?;
    let placed = state
        .services
        .checkout
        .place_order(user.user_id, shipping)
        .await
        .map_err(map_service_error)?;

    let message = format!("Order #{} created successfully", placed.order.order_number);
    if flash::is_ajax(&headers) {
        return Ok(created_response(serde_json::json!({
            "success": true,
            "message": message,
            "order_id": placed.order.id,
            "order_number": placed.order.order_number,
            "total_amount": placed.order.total_amount,
        })));
    }

    Ok(flash::redirect_with_flash(
        &format!("/orders/{}", placed.order.id),
        FlashLevel::Success,
        message,
    ))
}
