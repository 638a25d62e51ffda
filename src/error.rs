use std::fmt::Display;

/// Error handling code. Library operations return these, and because they
/// implement actix-web's `ResponseError` the route handlers can use '?' on
/// them directly. Some general info on error handling in actix-web can be
/// found at:
/// https://woile.github.io/actix-website/docs/errors/
use actix_web::{
    error,
    http::{header::ContentType, StatusCode},
    middleware::ErrorHandlerResponse,
    HttpResponse,
};
use serde::Serialize;

use crate::filters::FilterType;

/// Common errors that can be unwrapped in handlers.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    // We can't use #[error] because of special handling for InternalError.
    /// Store or pipeline step failure. Details are hidden in release builds.
    InternalError(#[from] anyhow::Error),
    /// A filter pipeline step refused to let the operation run.
    FilterHalted { filter: FilterType, reason: String },
    InvalidCourseKey(String),
    UnknownRole(String),
    AppError(String),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, Error>;

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // For security reasons, we shouldn't show detailed error
            // messages in production:
            // https://owasp.org/www-community/Improper_Error_Handling
            Error::InternalError(err) => {
                if cfg!(debug_assertions) {
                    write!(f, "Internal error: {:?}", err)
                } else {
                    write!(f, "An internal error occurred.")
                }
            }
            Error::FilterHalted { filter, reason } => {
                write!(f, "Operation halted by {filter}: {reason}")
            }
            Error::InvalidCourseKey(key) => write!(f, "Invalid course key: {key}"),
            Error::UnknownRole(name) => write!(f, "Unknown role: {name}"),
            Error::AppError(err) => write!(f, "{err}"),
        }
    }
}

/// JSON body for every error response.
#[derive(Serialize)]
struct ErrorBody<'a> {
    status: u16,
    message: &'a str,
}

fn json_error(status: StatusCode, message: &str) -> String {
    serde_json::to_string(&ErrorBody {
        status: status.as_u16(),
        message,
    })
    .unwrap_or_else(|_| String::from("{}"))
}

impl error::ResponseError for Error {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        if let Error::InternalError(err) = self {
            log::error!("Request failed: {err:?}");
        }
        HttpResponse::build(status_code)
            .content_type(ContentType::json())
            .body(json_error(status_code, &self.to_string()))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::FilterHalted { .. } => StatusCode::FORBIDDEN,
            Error::InvalidCourseKey(_) | Error::UnknownRole(_) | Error::AppError(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

/// Serve a JSON 404 instead of actix's empty default.
pub fn custom_404<B>(
    res: actix_web::dev::ServiceResponse<B>,
) -> actix_web::Result<ErrorHandlerResponse<B>> {
    // Decompose the existing response, override the body, and reconstruct it.
    let (req, res) = res.into_parts();
    let mut res = res.set_body(json_error(
        StatusCode::NOT_FOUND,
        &format!("The path \"{}\" doesn't exist.", req.path()),
    ));
    res.headers_mut().insert(
        actix_web::http::header::CONTENT_TYPE,
        actix_web::http::header::HeaderValue::from_static("application/json"),
    );

    let res = actix_web::dev::ServiceResponse::new(req, res)
        .map_into_boxed_body()
        .map_into_right_body();

    Ok(ErrorHandlerResponse::Response(res))
}
