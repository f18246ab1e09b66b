use actix_web::{HttpResponse, web};

use crate::handlers;

pub fn scoped_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(web::resource("/login/access-token").route(web::post().to(handlers::auth::login)))
            .service(web::resource("/reset-password").route(web::post().to(handlers::auth::reset_password))),
    )
    .service(
        web::scope("/payments")
            .service(web::resource("/request").route(web::post().to(handlers::payments::create_request)))
            .service(web::resource("/check-request").route(web::post().to(handlers::payments::check_request)))
            .service(web::resource("/verify-payment").route(web::post().to(handlers::payments::verify_payment))),
    )
    .service(
        web::scope("/admin")
            .service(
                web::resource("/users")
                    .route(web::get().to(handlers::admin::list_users))
                    .route(web::post().to(handlers::admin::create_user)),
            )
            .service(web::resource("/users/{user_id}").route(web::put().to(handlers::admin::update_user)))
            .service(web::resource("/pending-payments").route(web::get().to(handlers::admin::pending_payments)))
            .service(
                web::resource("/verify-payment/{payment_id}").route(web::post().to(handlers::admin::verify_payment)),
            )
            .service(
                web::resource("/decline-payment/{payment_id}")
                    .route(web::post().to(handlers::admin::decline_payment)),
            )
            .service(web::resource("/export-payments").route(web::get().to(handlers::admin::export_payments)))
            .service(web::resource("/dashboard-stats").route(web::get().to(handlers::admin::dashboard_stats)))
            .service(
                web::resource("/upload-bank-statement")
                    .route(web::post().to(handlers::admin::upload_bank_statement)),
            )
            .service(web::resource("/payments").route(web::get().to(handlers::admin::list_payments)))
            .service(web::resource("/payments/by-utr/{utr}").route(web::get().to(handlers::admin::payments_by_utr))),
    )
    .service(
        web::scope("/merchants")
            .service(
                web::resource("")
                    .route(web::get().to(handlers::merchants::list_merchants))
                    .route(web::post().to(handlers::merchants::create_merchant))
                    .route(web::head().to(HttpResponse::MethodNotAllowed)),
            )
            .service(
                web::resource("/{merchant_id}")
                    .route(web::get().to(handlers::merchants::get_merchant))
                    .route(web::put().to(handlers::merchants::update_merchant)),
            )
            .service(
                web::resource("/{merchant_id}/regenerate-api-key")
                    .route(web::post().to(handlers::merchants::regenerate_api_key)),
            )
            .service(
                web::resource("/{merchant_id}/regenerate-webhook-secret")
                    .route(web::post().to(handlers::merchants::regenerate_webhook_secret)),
            ),
    )
    .service(
        web::scope("/whitelist").service(
            web::resource("/merchant/{merchant_id}/whitelist")
                .route(web::get().to(handlers::whitelist::get_whitelist))
                .route(web::post().to(handlers::whitelist::update_whitelist)),
        ),
    )
    .service(
        web::scope("/payment-links")
            .service(
                web::resource("")
                    .route(web::get().to(handlers::payment_links::list_links))
                    .route(web::post().to(handlers::payment_links::create_link)),
            )
            .service(
                web::resource("/public/submit-utr/{payment_id}")
                    .route(web::post().to(handlers::payment_links::submit_utr)),
            )
            .service(
                web::resource("/public/{unique_code}/pay").route(web::post().to(handlers::payment_links::pay_link)),
            )
            .service(
                web::resource("/public/{unique_code}").route(web::get().to(handlers::payment_links::public_link)),
            )
            .service(
                web::resource("/{payment_link_id}")
                    .route(web::get().to(handlers::payment_links::get_link))
                    .route(web::put().to(handlers::payment_links::update_link))
                    .route(web::delete().to(handlers::payment_links::deactivate_link)),
            ),
    )
    .service(
        web::scope("/analytics")
            .service(
                web::scope("/admin")
                    .service(web::resource("/summary").route(web::get().to(handlers::analytics::admin_summary)))
                    .service(web::resource("/trends").route(web::get().to(handlers::analytics::admin_trends)))
                    .service(
                        web::resource("/payment-methods")
                            .route(web::get().to(handlers::analytics::admin_payment_methods)),
                    )
                    .service(
                        web::resource("/merchant-performance")
                            .route(web::get().to(handlers::analytics::admin_merchant_performance)),
                    )
                    .service(
                        web::resource("/payment-link-performance")
                            .route(web::get().to(handlers::analytics::admin_link_performance)),
                    )
                    .service(
                        web::resource("/verification-metrics")
                            .route(web::get().to(handlers::analytics::admin_verification_metrics)),
                    ),
            )
            .service(
                web::scope("/merchant")
                    .service(web::resource("/summary").route(web::get().to(handlers::analytics::merchant_summary)))
                    .service(web::resource("/trends").route(web::get().to(handlers::analytics::merchant_trends)))
                    .service(
                        web::resource("/payment-methods")
                            .route(web::get().to(handlers::analytics::merchant_payment_methods)),
                    )
                    .service(
                        web::resource("/payment-link-performance")
                            .route(web::get().to(handlers::analytics::merchant_link_performance)),
                    )
                    .service(
                        web::resource("/verification-metrics")
                            .route(web::get().to(handlers::analytics::merchant_verification_metrics)),
                    ),
            ),
    )
    .service(
        web::scope("/reports")
            .service(web::resource("/payments").route(web::get().to(handlers::reports::payments)))
            .service(web::resource("/download-payments").route(web::get().to(handlers::reports::download_payments)))
            .service(web::resource("/admin/payments").route(web::get().to(handlers::admin::list_payments)))
            .service(web::resource("/admin/dashboard-stats").route(web::get().to(handlers::admin::dashboard_stats))),
    );
}
