use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use std::fmt;

#[derive(Serialize, Debug)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<u16>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            message: Some(message),
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            message: None,
            data: None,
            error: Some(message),
            code: None,
        }
    }

    pub fn error_with_code(code: u16, message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            message: None,
            data: None,
            error: Some(message),
            code: Some(code),
        }
    }
}

impl ApiResponse<()> {
    pub fn to_response(&self, status: StatusCode) -> HttpResponse {
        HttpResponse::build(status).json(self)
    }
}

/// Envelope used by the merchant-facing payment endpoints:
/// `{"message": "Success"|"Error", "status": <code>, "response": {...}}`.
#[derive(Serialize, Debug)]
pub struct GatewayResponse<T> {
    pub message: &'static str,
    pub status: u16,
    pub response: T,
}

#[derive(Serialize, Debug)]
pub struct GatewayError {
    pub code: u16,
    pub error: String,
}

impl<T: Serialize> GatewayResponse<T> {
    pub fn success(status: u16, response: T) -> Self {
        Self {
            message: "Success",
            status,
            response,
        }
    }

    pub fn to_response(&self) -> HttpResponse {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        HttpResponse::build(status).json(self)
    }
}

impl GatewayResponse<GatewayError> {
    pub fn error(status: u16, code: u16, error: String) -> Self {
        Self {
            message: "Error",
            status,
            response: GatewayError { code, error },
        }
    }
}

/// Rejection raised by request extractors, rendered with the `ApiResponse` envelope.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: Option<u16>,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self.code {
            Some(code) => ApiResponse::<()>::error_with_code(code, self.message.clone()),
            None => ApiResponse::<()>::error(self.message.clone()),
        };
        body.to_response(self.status)
    }
}
