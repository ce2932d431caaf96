//! Storefront entities: catalog structure, carts and reviews
pub mod cart;
pub mod cart_item;
pub mod category;
pub mod product_image;
pub mod review;

// Re-export entities
pub use super::product::{Entity as Product, Model as ProductModel};
pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use category::{Entity as Category, Model as CategoryModel};
pub use product_image::{Entity as ProductImage, Model as ProductImageModel};
pub use review::{Entity as Review, Model as ReviewModel};
