pub mod auth;
pub mod merchant;
pub mod payment;
pub mod payment_link;
pub mod user;
