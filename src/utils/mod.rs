pub mod helpers;
pub mod keys;
