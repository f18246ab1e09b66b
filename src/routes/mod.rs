pub mod api;

use crate::{config::Settings, utils::helpers::ApiError};
use actix_web::{HttpResponse, error, web};
use serde_json::json;

async fn welcome(settings: web::Data<Settings>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "message": format!("Welcome to {}", settings.project_name) }))
}

/// Malformed JSON bodies and query strings answer with the `ApiResponse` envelope.
fn json_error(err: error::JsonPayloadError, _: &actix_web::HttpRequest) -> actix_web::Error {
    ApiError::unprocessable(format!("Invalid request body: {}", err)).into()
}

fn query_error(err: error::QueryPayloadError, _: &actix_web::HttpRequest) -> actix_web::Error {
    ApiError::unprocessable(format!("Invalid query parameters: {}", err)).into()
}

fn path_error(err: error::PathError, _: &actix_web::HttpRequest) -> actix_web::Error {
    ApiError::unprocessable(format!("Invalid path parameter: {}", err)).into()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error))
        .route("/", web::get().to(welcome))
        .service(web::scope("/api/v1").configure(api::scoped_config));
}
