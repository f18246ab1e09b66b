pub mod analytics;
pub mod auth;
pub mod bank_statement;
pub mod callback;
pub mod csv_exporter;
pub mod expiry;
pub mod payment_links;
pub mod payment_processor;
pub mod utr_verifier;
