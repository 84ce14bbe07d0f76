use actix_web::HttpResponse;
use serde_json::json;
use thiserror::Error;

use crate::domain::errors::CoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Missing or malformed identity headers")]
    Unauthorized,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl actix_web::ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Unauthorized => HttpResponse::Unauthorized().json(json!({
                "error": self.to_string()
            })),
            AppError::Core(core) => match core {
                CoreError::NotFound(_) => HttpResponse::NotFound().json(json!({
                    "error": core.to_string()
                })),
                CoreError::Forbidden => HttpResponse::Forbidden().json(json!({
                    "error": core.to_string()
                })),
                CoreError::InvalidTransition { .. } | CoreError::AlreadyAssigned => {
                    HttpResponse::Conflict().json(json!({
                        "error": core.to_string()
                    }))
                }
                CoreError::StockInsufficient(items) => HttpResponse::Conflict().json(json!({
                    "error": core.to_string(),
                    "items": items
                })),
                CoreError::CrossMerchantCart | CoreError::InvalidInput(_) => {
                    HttpResponse::BadRequest().json(json!({
                        "error": core.to_string()
                    }))
                }
                CoreError::Persistence(detail) => {
                    // Store-level detail stays in the log, never in the response.
                    log::error!("persistence error: {detail}");
                    HttpResponse::InternalServerError().json(json!({
                        "error": "Internal server error"
                    }))
                }
            },
            AppError::Internal(detail) => {
                log::error!("internal error: {detail}");
                HttpResponse::InternalServerError().json(json!({
                    "error": "Internal server error"
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::ResponseError;
    use uuid::Uuid;

    use super::*;
    use crate::domain::errors::StockShortage;
    use crate::domain::state::OrderState;

    fn status(err: AppError) -> StatusCode {
        err.error_response().status()
    }

    #[test]
    fn unauthorized_returns_401() {
        assert_eq!(status(AppError::Unauthorized), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn not_found_returns_404() {
        assert_eq!(
            status(CoreError::NotFound("order").into()),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn forbidden_returns_403() {
        assert_eq!(status(CoreError::Forbidden.into()), StatusCode::FORBIDDEN);
    }

    #[test]
    fn invalid_transition_returns_409() {
        assert_eq!(
            status(
                CoreError::InvalidTransition {
                    from: OrderState::Preparing,
                    to: OrderState::PickedUp,
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn already_assigned_returns_409() {
        assert_eq!(status(CoreError::AlreadyAssigned.into()), StatusCode::CONFLICT);
    }

    #[test]
    fn stock_insufficient_returns_409_with_itemized_body() {
        let err: AppError = CoreError::StockInsufficient(vec![StockShortage {
            product_id: Uuid::new_v4(),
            available: 1,
            requested: 5,
        }])
        .into();
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn bad_input_returns_400() {
        assert_eq!(
            status(CoreError::CrossMerchantCart.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(CoreError::InvalidInput("bad".into()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn persistence_returns_500_without_leaking_detail() {
        let err: AppError = CoreError::Persistence("connection refused at 10.0.0.7".into()).into();
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_returns_500() {
        assert_eq!(
            status(AppError::Internal("oops".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
