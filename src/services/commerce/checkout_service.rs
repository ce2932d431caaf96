use crate::{
    db::with_transaction,
    entities::{order, order_item, OrderStatus},
    entities::commerce::{cart_item, CartItem},
    errors::ServiceError,
    events::{Event, EventSender},
    services::commerce::cart_service::{self, CartLine},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Attempts at drawing an unused order number before giving up
const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Shipping form submitted at checkout
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct ShippingDetails {
    #[validate(length(min = 1, message = "This field is required"))]
    pub shipping_address: String,
    #[validate(length(min = 1, max = 100, message = "City must be 1 to 100 characters"))]
    pub shipping_city: String,
    #[validate(length(min = 1, max = 10, message = "ZIP code must be 1 to 10 characters"))]
    pub shipping_zip_code: String,
    #[validate(length(min = 1, max = 20, message = "Phone must be 1 to 20 characters"))]
    pub shipping_phone: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ShippingDetails {
    /// Drops surrounding whitespace so blank fields fail the length rules.
    pub fn trimmed(self) -> Self {
        Self {
            shipping_address: self.shipping_address.trim().to_string(),
            shipping_city: self.shipping_city.trim().to_string(),
            shipping_zip_code: self.shipping_zip_code.trim().to_string(),
            shipping_phone: self.shipping_phone.trim().to_string(),
            notes: self
                .notes
                .map(|notes| notes.trim().to_string())
                .filter(|notes| !notes.is_empty()),
        }
    }
}

/// Eight uppercase hex characters drawn from a fresh v4 uuid.
pub fn generate_order_number() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

/// Order line priced at checkout time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLineDraft {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
    pub total_price: Decimal,
}

/// An order computed from a cart but not yet persisted.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub user_id: Uuid,
    pub order_number: String,
    pub total_amount: Decimal,
    pub shipping: ShippingDetails,
    pub lines: Vec<OrderLineDraft>,
}

impl OrderDraft {
    /// Freezes the cart lines into order lines.
    ///
    /// # Errors
    ///
    /// * `ServiceError::InvalidOperation` - the cart has no lines
    pub fn from_cart(
        user_id: Uuid,
        lines: &[CartLine],
        shipping: ShippingDetails,
    ) -> Result<Self, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::InvalidOperation("Your cart is empty".to_string()));
        }

        let lines: Vec<OrderLineDraft> = lines
            .iter()
            .map(|line| OrderLineDraft {
                product_id: line.product_id,
                quantity: line.quantity,
                price: line.unit_price,
                total_price: line.line_total,
            })
            .collect();
        let total_amount = lines.iter().map(|line| line.total_price).sum();

        Ok(Self {
            user_id,
            order_number: generate_order_number(),
            total_amount,
            shipping,
            lines,
        })
    }

    fn into_models(self, order_id: Uuid) -> (order::ActiveModel, Vec<order_item::ActiveModel>) {
        let now = Utc::now();
        let items = self
            .lines
            .iter()
            .map(|line| order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                price: Set(line.price),
                total_price: Set(line.total_price),
            })
            .collect();

        let shipping = self.shipping;
        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(self.order_number),
            user_id: Set(self.user_id),
            status: Set(OrderStatus::Pending),
            total_amount: Set(self.total_amount),
            shipping_address: Set(shipping.shipping_address),
            shipping_city: Set(shipping.shipping_city),
            shipping_zip_code: Set(shipping.shipping_zip_code),
            shipping_phone: Set(shipping.shipping_phone),
            notes: Set(shipping.notes.unwrap_or_default()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        (order, items)
    }
}

/// Result of a successful checkout
#[derive(Debug, Clone, Serialize)]
pub struct PlacedOrder {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Turns a user's cart into an order in one transaction.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CheckoutService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Places an order from the user's cart.
    ///
    /// Inside a single transaction: the cart lines are read, an order with a
    /// fresh order number is written with one item per line at the current
    /// final price, and the cart is emptied. Any failure leaves both the cart
    /// and the orders table untouched. Stock is neither checked nor
    /// decremented.
    ///
    /// # Errors
    ///
    /// * `ServiceError::InvalidForm` - shipping details fail validation
    /// * `ServiceError::InvalidOperation` - the cart is empty
    #[instrument(skip(self, shipping))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        shipping: ShippingDetails,
    ) -> Result<PlacedOrder, ServiceError> {
        let shipping = shipping.trimmed();
        shipping.validate()?;

        let cart = cart_service::get_or_create_cart(&*self.db, user_id).await?;
        let cart_id = cart.id;

        let placed = with_transaction::<_, _, ServiceError>(&self.db, move |txn| {
            Box::pin(async move {
                let lines = cart_service::load_lines(txn, cart_id).await?;
                for line in lines.iter().filter(|line| line.quantity > line.stock) {
                    warn!(
                        product_id = %line.product_id,
                        quantity = line.quantity,
                        stock = line.stock,
                        "Ordering more units than in stock"
                    );
                }

                let mut draft = OrderDraft::from_cart(user_id, &lines, shipping)?;
                draft.order_number = unused_order_number(txn, draft.order_number).await?;

                let (order, items) = draft.into_models(Uuid::new_v4());
                let order = order.insert(txn).await?;

                let mut saved = Vec::with_capacity(items.len());
                for item in items {
                    saved.push(item.insert(txn).await?);
                }

                CartItem::delete_many()
                    .filter(cart_item::Column::CartId.eq(cart_id))
                    .exec(txn)
                    .await?;

                Ok(PlacedOrder {
                    order,
                    items: saved,
                })
            })
        })
        .await?;

        metrics::counter!("terko_orders.placed", 1);
        self.event_sender
            .send_or_log(Event::OrderPlaced {
                order_id: placed.order.id,
                order_number: placed.order.order_number.clone(),
                user_id,
                total_amount: placed.order.total_amount,
                item_count: placed.items.len(),
            })
            .await;

        info!(
            order_id = %placed.order.id,
            order_number = %placed.order.order_number,
            total = %placed.order.total_amount,
            "Order placed"
        );
        Ok(placed)
    }
}

/// Keeps `candidate` unless another order already uses it, redrawing a
/// bounded number of times.
async fn unused_order_number<C: ConnectionTrait>(
    conn: &C,
    mut candidate: String,
) -> Result<String, ServiceError> {
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let taken = order::Entity::find()
            .filter(order::Column::OrderNumber.eq(candidate.as_str()))
            .count(conn)
            .await?
            > 0;
        if !taken {
            return Ok(candidate);
        }
        warn!(order_number = %candidate, "Order number collision, redrawing");
        candidate = generate_order_number();
    }
    Err(ServiceError::InternalError(
        "Could not allocate a unique order number".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::commerce::pricing_service::line_total;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn shipping() -> ShippingDetails {
        ShippingDetails {
            shipping_address: "12 Harbour Road".into(),
            shipping_city: "Split".into(),
            shipping_zip_code: "21000".into(),
            shipping_phone: "+385 21 000 000".into(),
            notes: None,
        }
    }

    fn line(quantity: i32, unit_price: Decimal) -> CartLine {
        CartLine {
            item_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "Olive oil".into(),
            product_slug: "olive-oil".into(),
            product_image: String::new(),
            unit_price,
            quantity,
            line_total: line_total(unit_price, quantity),
            stock: 5,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn order_numbers_are_eight_uppercase_hex() {
        let number = generate_order_number();
        assert_eq!(number.len(), 8);
        assert!(number
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn draft_totals_sum_lines() {
        let draft =
            OrderDraft::from_cart(Uuid::new_v4(), &[line(2, dec!(10)), line(1, dec!(15))], shipping())
                .unwrap();
        assert_eq!(draft.total_amount, dec!(35));
        assert_eq!(draft.lines.len(), 2);
        assert_eq!(draft.lines[0].total_price, dec!(20));
    }

    #[test]
    fn empty_cart_cannot_be_drafted() {
        let result = OrderDraft::from_cart(Uuid::new_v4(), &[], shipping());
        assert_matches!(result, Err(ServiceError::InvalidOperation(_)));
    }

    #[test]
    fn shipping_requires_fields() {
        let blank = ShippingDetails {
            shipping_zip_code: "12345678901".into(),
            ..Default::default()
        };
        let errors = blank.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("shipping_address"));
        assert!(fields.contains_key("shipping_city"));
        assert!(fields.contains_key("shipping_zip_code"));
        assert!(fields.contains_key("shipping_phone"));
        assert!(shipping().validate().is_ok());
    }

    #[test]
    fn whitespace_only_shipping_fields_are_blank() {
        let padded = ShippingDetails {
            shipping_address: "   ".into(),
            shipping_city: "  Split ".into(),
            shipping_zip_code: "\t".into(),
            shipping_phone: " ".into(),
            notes: Some("  ".into()),
        }
        .trimmed();

        assert_eq!(padded.shipping_city, "Split");
        assert_eq!(padded.notes, None);
        let errors = padded.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("shipping_address"));
        assert!(fields.contains_key("shipping_zip_code"));
        assert!(fields.contains_key("shipping_phone"));
        assert!(!fields.contains_key("shipping_city"));
    }
}
