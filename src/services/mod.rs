// Storefront services
pub mod commerce;
pub mod orders;

// Customer accounts
pub mod accounts;

use sea_orm::{ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, Select};
use serde::Serialize;
use validator::ValidationError;

/// Fixed page size of every storefront listing
pub const PAGE_SIZE: u64 = 12;

/// One page of a listing plus enough metadata to render pagination links.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_previous: bool,
    pub has_next: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u64, per_page: u64, total: u64) -> Self {
        let total_pages = if total == 0 {
            1
        } else {
            (total + per_page - 1) / per_page
        };
        Self {
            items,
            page,
            per_page,
            total,
            total_pages,
            has_previous: page > 1,
            has_next: page < total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            total_pages: self.total_pages,
            has_previous: self.has_previous,
            has_next: self.has_next,
        }
    }
}

/// Resolves a raw `?page=` value: anything unparsable or below 1 is page 1,
/// anything past the end is the last page.
pub fn resolve_page(raw: Option<&str>, total_pages: u64) -> u64 {
    let last = total_pages.max(1);
    match raw.and_then(|value| value.trim().parse::<u64>().ok()) {
        None | Some(0) => 1,
        Some(n) if n > last => last,
        Some(n) => n,
    }
}

/// Rejects a text field that holds only whitespace.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some("This field is required".into());
        return Err(err);
    }
    Ok(())
}

/// Runs `select` one page at a time.
pub async fn paginate<'db, C, E>(
    db: &'db C,
    select: Select<E>,
    raw_page: Option<&str>,
    per_page: u64,
) -> Result<Page<E::Model>, DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
    E::Model: Send + Sync + 'db,
{
    let paginator = select.paginate(db, per_page);
    let totals = paginator.num_items_and_pages().await?;
    let page = resolve_page(raw_page, totals.number_of_pages);
    let items = paginator.fetch_page(page - 1).await?;
    Ok(Page::new(items, page, per_page, totals.number_of_items))
}
