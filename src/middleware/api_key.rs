use crate::{
    database::connection::DbPool,
    models::merchant::Merchant,
    utils::helpers::ApiError,
};
use actix_web::{FromRequest, HttpRequest, dev::Payload, web};
use futures_util::future::LocalBoxFuture;
use std::net::IpAddr;
use tracing::{error, warn};

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const IP_NOT_WHITELISTED: u16 = 1001;

/// The merchant identified by the `X-API-Key` header.
#[derive(Debug, Clone)]
pub struct ApiMerchant(pub Merchant);

impl std::ops::Deref for ApiMerchant {
    type Target = Merchant;

    fn deref(&self) -> &Merchant {
        &self.0
    }
}

pub fn check_merchant_access(merchant: &Merchant, peer: Option<IpAddr>) -> Result<(), ApiError> {
    if !merchant.is_active {
        return Err(ApiError::forbidden("Merchant account is inactive"));
    }
    if !merchant.allows_ip(peer) {
        warn!(
            "Rejected request for merchant {} from {:?}: not whitelisted",
            merchant.id, peer
        );
        return Err(ApiError::forbidden("IP Address is not whitelisted").with_code(IP_NOT_WHITELISTED));
    }
    Ok(())
}

impl FromRequest for ApiMerchant {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let api_key = req
                .headers()
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ApiError::forbidden("API key missing"))?;

            let pool = req
                .app_data::<web::Data<DbPool>>()
                .ok_or_else(|| ApiError::internal("Database unavailable"))?;
            let merchant = Merchant::find_by_api_key(pool, api_key)
                .await
                .map_err(|e| {
                    error!("Database error looking up API key: {}", e);
                    ApiError::internal("Failed to validate API key")
                })?
                .ok_or_else(|| ApiError::forbidden("Invalid API key"))?;

            check_merchant_access(&merchant, req.peer_addr().map(|addr| addr.ip()))?;
            Ok(ApiMerchant(merchant))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{merchant, merchant_with_whitelist};
    use actix_web::{ResponseError, http::StatusCode};

    #[test]
    fn empty_whitelist_admits_everyone() {
        assert!(check_merchant_access(&merchant(), Some("203.0.113.9".parse().unwrap())).is_ok());
        assert!(check_merchant_access(&merchant(), None).is_ok());
    }

    #[test]
    fn whitelist_is_enforced_with_code() {
        let m = merchant_with_whitelist(vec!["198.51.100.7".into()]);
        assert!(check_merchant_access(&m, Some("198.51.100.7".parse().unwrap())).is_ok());

        let err = check_merchant_access(&m, Some("198.51.100.8".parse().unwrap())).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.message(), "IP Address is not whitelisted");
        assert!(check_merchant_access(&m, None).is_err());
    }

    #[test]
    fn inactive_merchant_is_rejected_first() {
        let mut m = merchant_with_whitelist(vec!["198.51.100.7".into()]);
        m.is_active = false;
        let err = check_merchant_access(&m, Some("10.0.0.1".parse().unwrap())).unwrap_err();
        assert_eq!(err.message(), "Merchant account is inactive");
    }
}
