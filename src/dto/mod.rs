pub mod admin;
pub mod auth;
pub mod balance;
pub mod coupons;
pub mod orders;
pub mod products;
