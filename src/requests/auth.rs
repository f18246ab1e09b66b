use serde::Deserialize;

/// Accepted as JSON or as an OAuth2-style form; `email` is an alias of `username`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "email")]
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub current_password: String,
    pub new_password: String,
}
