pub mod admin;
pub mod analytics;
pub mod auth;
pub mod merchant;
pub mod payment;
pub mod payment_link;
pub mod report;
pub mod whitelist;
