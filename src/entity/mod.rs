pub mod audit_logs;
pub mod balances;
pub mod coupons;
pub mod issued_coupons;
pub mod order_items;
pub mod orders;
pub mod products;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use balances::Entity as Balances;
pub use coupons::Entity as Coupons;
pub use issued_coupons::Entity as IssuedCoupons;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use products::Entity as Products;
pub use users::Entity as Users;
