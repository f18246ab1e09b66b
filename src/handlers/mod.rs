pub mod admin;
pub mod analytics;
pub mod auth;
pub mod merchants;
pub mod payment_links;
pub mod payments;
pub mod reports;
pub mod whitelist;
