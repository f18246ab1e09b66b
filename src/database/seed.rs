use crate::{
    config::Settings,
    database::connection::DbPool,
    models::user::{CreateUser, User, UserError, UserRole},
};
use tracing::{info, warn};

/// Creates the first admin account from `FIRST_ADMIN_EMAIL` / `FIRST_ADMIN_PASSWORD`
/// unless a user with that e-mail already exists.
pub async fn ensure_first_admin(pool: &DbPool, settings: &Settings) -> Result<(), UserError> {
    let (Some(email), Some(password)) = (
        settings.first_admin_email.as_deref(),
        settings.first_admin_password.as_deref(),
    ) else {
        warn!("FIRST_ADMIN_EMAIL/FIRST_ADMIN_PASSWORD not set, skipping admin seeding");
        return Ok(());
    };

    if User::find_by_email(pool, email).await?.is_some() {
        return Ok(());
    }

    User::create(
        pool,
        CreateUser {
            email: email.to_string(),
            password: password.to_string(),
            full_name: Some("Initial Admin".to_string()),
            role: UserRole::Admin,
            is_active: true,
            api_key: None,
        },
    )
    .await?;

    info!("Initial admin {} created", email);
    Ok(())
}
