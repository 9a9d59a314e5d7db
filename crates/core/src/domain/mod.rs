pub mod cart;
pub mod conversation;
pub mod product;
pub mod zipcode;
