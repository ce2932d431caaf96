/// Commerce services module - catalog, cart, checkout and reviews
pub mod cart_service;
pub mod checkout_service;
pub mod pricing_service;
pub mod product_catalog_service;
pub mod review_service;

// Re-export services for convenience
pub use cart_service::{CartLine, CartService, CartTotals, CartView};
pub use checkout_service::{CheckoutService, PlacedOrder, ShippingDetails};
pub use product_catalog_service::{ProductCatalogService, ProductQuery, ProductSort};
pub use review_service::{ReviewInput, ReviewService};
