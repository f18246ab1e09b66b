use crate::models::merchant::WhitelistOperation;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WhitelistRequest {
    pub operation: WhitelistOperation,
    pub ip_addresses: Vec<String>,
}
