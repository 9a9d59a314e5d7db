pub mod catalog;
pub mod checkout;
pub mod config;
pub mod domain;
pub mod errors;
pub mod response;

pub use catalog::{Catalog, CatalogError, PurchaseHistories, PurchaseRecord};
pub use domain::cart::{
    AdditionOutcome, Cart, CartLine, CartOperation, RemovalOutcome, UnitPricing,
    MAX_VOLUME_LITERS, UNIT_VOLUME_LITERS,
};
pub use domain::conversation::{CheckoutRef, ConversationId, ConversationState};
pub use domain::product::{Product, ProductId};
pub use domain::zipcode::Zipcode;
pub use errors::{ApplicationError, CommerceError, InterfaceError};
pub use response::{Button, ResponseFragment};
