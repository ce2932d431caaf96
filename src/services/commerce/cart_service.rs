use crate::{
    db::with_transaction,
    entities::commerce::{cart, cart_item, Cart, CartItem, Product},
    entities::product,
    errors::{is_unique_violation, ServiceError},
    events::{Event, EventSender},
    services::commerce::pricing_service,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// One cart line priced at the product's current final price.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub item_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_slug: String,
    pub product_image: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    pub stock: i32,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    fn new(item: cart_item::Model, product: &product::Model) -> Self {
        let unit_price = product.final_price();
        Self {
            item_id: item.id,
            product_id: product.id,
            product_name: product.name.clone(),
            product_slug: product.slug.clone(),
            product_image: product.image.clone(),
            unit_price,
            quantity: item.quantity,
            line_total: pricing_service::line_total(unit_price, item.quantity),
            stock: product.stock,
            added_at: item.added_at,
        }
    }
}

/// Derived cart aggregates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    /// Sum of line quantities
    pub total_items: i64,
    /// Sum of line totals
    pub total_price: Decimal,
}

impl CartTotals {
    pub fn from_lines(lines: &[CartLine]) -> Self {
        lines.iter().fold(Self::default(), |acc, line| Self {
            total_items: acc.total_items + i64::from(line.quantity),
            total_price: acc.total_price + line.line_total,
        })
    }
}

/// Cart page model
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub cart_id: Uuid,
    pub items: Vec<CartLine>,
    #[serde(flatten)]
    pub totals: CartTotals,
}

impl CartView {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemAdded {
    pub product_name: String,
    pub product_slug: String,
    /// Quantity of the line after the add
    pub quantity: i32,
    pub totals: CartTotals,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemUpdated {
    pub product_name: String,
    /// True when a non-positive quantity deleted the line
    pub removed: bool,
    pub quantity: i32,
    pub item_total: Decimal,
    pub totals: CartTotals,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemRemoved {
    pub product_name: String,
    pub totals: CartTotals,
}

/// Returns the user's cart, creating it on first use.
///
/// Two requests racing to create the same cart both end up with the row
/// that won the unique index on `user_id`.
pub async fn get_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<cart::Model, ServiceError> {
    if let Some(existing) = find_cart(conn, user_id).await? {
        return Ok(existing);
    }

    let now = Utc::now();
    let created = cart::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await;

    match created {
        Ok(cart) => {
            info!(cart_id = %cart.id, %user_id, "Created cart");
            Ok(cart)
        }
        Err(err) if is_unique_violation(&err) => find_cart(conn, user_id).await?.ok_or_else(|| {
            ServiceError::InternalError(format!("Cart for user {} vanished after conflict", user_id))
        }),
        Err(err) => Err(err.into()),
    }
}

async fn find_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<Option<cart::Model>, ServiceError> {
    Ok(Cart::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?)
}

/// Lines of a cart in the order they were added, joined with their products.
pub async fn load_lines<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
) -> Result<Vec<CartLine>, ServiceError> {
    let rows = CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .order_by_asc(cart_item::Column::AddedAt)
        .order_by_asc(cart_item::Column::Id)
        .find_also_related(Product)
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(item, product)| product.map(|product| CartLine::new(item, &product)))
        .collect())
}

/// Shopping cart service: one cart per user, quantity-tracked lines.
///
/// Line and cart totals are never stored; they are computed from the
/// products' current prices each time the cart is read.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Idempotent keyed lookup of the user's cart.
    #[instrument(skip(self))]
    pub async fn get_or_create_cart(&self, user_id: Uuid) -> Result<cart::Model, ServiceError> {
        get_or_create_cart(&*self.db, user_id).await
    }

    /// The user's cart with priced lines and totals.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = get_or_create_cart(&*self.db, user_id).await?;
        let items = load_lines(&*self.db, cart.id).await?;
        let totals = CartTotals::from_lines(&items);
        Ok(CartView {
            cart_id: cart.id,
            items,
            totals,
        })
    }

    /// Totals only, for badges and AJAX payloads.
    pub async fn totals(&self, user_id: Uuid) -> Result<CartTotals, ServiceError> {
        Ok(self.get_cart(user_id).await?.totals)
    }

    /// Adds one unit of an active product.
    ///
    /// An existing line is incremented by one, otherwise a line with quantity
    /// one is created. The upsert is a single statement, so concurrent adds of
    /// the same product never produce two lines.
    ///
    /// # Errors
    ///
    /// * `ServiceError::NotFound` - product missing or inactive
    #[instrument(skip(self))]
    pub async fn add_item(&self, user_id: Uuid, product_id: Uuid) -> Result<ItemAdded, ServiceError> {
        let product = Product::find_by_id(product_id)
            .filter(product::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let cart = get_or_create_cart(&*self.db, user_id).await?;
        let cart_id = cart.id;

        let (quantity, totals) = with_transaction::<_, _, ServiceError>(&self.db, move |txn| {
            Box::pin(async move {
                let line = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart_id),
                    product_id: Set(product_id),
                    quantity: Set(1),
                    added_at: Set(Utc::now()),
                };

                CartItem::insert(line)
                    .on_conflict(
                        OnConflict::columns([
                            cart_item::Column::CartId,
                            cart_item::Column::ProductId,
                        ])
                        .value(
                            cart_item::Column::Quantity,
                            Expr::col((cart_item::Entity, cart_item::Column::Quantity)).add(1),
                        )
                        .to_owned(),
                    )
                    .exec_without_returning(txn)
                    .await?;

                let lines = load_lines(txn, cart_id).await?;
                let quantity = lines
                    .iter()
                    .find(|line| line.product_id == product_id)
                    .map(|line| line.quantity)
                    .unwrap_or(1);

                cart::Entity::update_many()
                    .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(cart::Column::Id.eq(cart_id))
                    .exec(txn)
                    .await?;

                Ok((quantity, CartTotals::from_lines(&lines)))
            })
        })
        .await?;

        metrics::counter!("terko_cart.items_added", 1);
        self.event_sender
            .send_or_log(Event::CartItemAdded {
                user_id,
                cart_id,
                product_id,
                quantity,
            })
            .await;

        info!(%cart_id, %product_id, quantity, "Added product to cart");
        Ok(ItemAdded {
            product_name: product.name,
            product_slug: product.slug,
            quantity,
            totals,
        })
    }

    /// Sets a line's quantity; zero or less removes the line.
    ///
    /// The item is looked up through the caller's own cart, so another
    /// user's item id is reported as not found and left untouched. The
    /// quantity is not bounded by stock.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<ItemUpdated, ServiceError> {
        let (item, product) = self.owned_item(user_id, item_id).await?;

        let removed = quantity <= 0;
        if removed {
            item.delete(&*self.db).await?;
        } else {
            let mut active: cart_item::ActiveModel = item.into();
            active.quantity = Set(quantity);
            active.update(&*self.db).await?;
        }

        let totals = self.totals(user_id).await?;
        let item_total = if removed {
            Decimal::ZERO
        } else {
            pricing_service::line_total(product.final_price(), quantity)
        };

        metrics::counter!("terko_cart.items_updated", 1);
        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                user_id,
                item_id,
                quantity: quantity.max(0),
            })
            .await;

        info!(%item_id, quantity, removed, "Updated cart line");
        Ok(ItemUpdated {
            product_name: product.name,
            removed,
            quantity: quantity.max(0),
            item_total,
            totals,
        })
    }

    /// Deletes a line from the caller's cart.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<ItemRemoved, ServiceError> {
        let (item, product) = self.owned_item(user_id, item_id).await?;
        let product_id = item.product_id;

        item.delete(&*self.db).await?;
        let totals = self.totals(user_id).await?;

        metrics::counter!("terko_cart.items_removed", 1);
        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                user_id,
                item_id,
                product_id,
            })
            .await;

        info!(%item_id, "Removed cart line");
        Ok(ItemRemoved {
            product_name: product.name,
            totals,
        })
    }

    /// Finds a cart item only if it sits in `user_id`'s cart.
    async fn owned_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
    ) -> Result<(cart_item::Model, product::Model), ServiceError> {
        let not_found = || ServiceError::NotFound(format!("Cart item {} not found", item_id));

        let item = CartItem::find_by_id(item_id)
            .inner_join(Cart)
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(not_found)?;

        let product = Product::find_by_id(item.product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(not_found)?;

        Ok((item, product))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(quantity: i32, unit_price: Decimal) -> CartLine {
        CartLine {
            item_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "Linen apron".into(),
            product_slug: "linen-apron".into(),
            product_image: String::new(),
            unit_price,
            quantity,
            line_total: pricing_service::line_total(unit_price, quantity),
            stock: 10,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn totals_sum_quantities_and_line_totals() {
        let totals = CartTotals::from_lines(&[line(2, dec!(10.00)), line(1, dec!(15.00))]);
        assert_eq!(totals.total_items, 3);
        assert_eq!(totals.total_price, dec!(35.00));
    }

    #[test]
    fn empty_cart_totals_are_zero() {
        assert_eq!(CartTotals::from_lines(&[]), CartTotals::default());
    }
}
