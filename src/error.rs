use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::response::{ApiResponse, Meta};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Coupon already claimed")]
    DuplicateClaim,

    #[error("Coupon sold out")]
    CouponSoldOut,

    #[error("Coupon is not active")]
    CouponNotActive,

    #[error("Insufficient stock for product {0}")]
    InsufficientStock(Uuid),

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Balance limit exceeded")]
    BalanceLimitExceeded,

    #[error("Order cannot be cancelled")]
    CannotCancel,

    #[error("Counter store error")]
    Store(#[from] StoreError),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True for business-rule outcomes that no amount of retrying can change.
    /// The issuance worker drops these instead of dead-lettering them.
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            AppError::BadRequest(_)
                | AppError::Forbidden
                | AppError::DuplicateClaim
                | AppError::CouponSoldOut
                | AppError::CouponNotActive
                | AppError::InsufficientStock(_)
                | AppError::InsufficientBalance
                | AppError::BalanceLimitExceeded
                | AppError::CannotCancel
        )
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::DuplicateClaim => (StatusCode::CONFLICT, self.to_string()),
            AppError::CouponSoldOut => (StatusCode::CONFLICT, self.to_string()),
            AppError::CouponNotActive => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::InsufficientStock(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::InsufficientBalance => (StatusCode::PAYMENT_REQUIRED, self.to_string()),
            AppError::BalanceLimitExceeded => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::CannotCancel => (StatusCode::CONFLICT, self.to_string()),
            AppError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::DbError(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::OrmError(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = ApiResponse {
            message,
            data: Some(ErrorData {
                error: self.to_string(),
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rejections_are_not_retryable() {
        assert!(AppError::DuplicateClaim.is_business_rejection());
        assert!(AppError::CouponSoldOut.is_business_rejection());
        assert!(AppError::InsufficientStock(Uuid::new_v4()).is_business_rejection());
        assert!(AppError::BalanceLimitExceeded.is_business_rejection());
        assert!(AppError::CannotCancel.is_business_rejection());
    }

    #[test]
    fn transient_and_integrity_failures_are_not_business_rejections() {
        assert!(!AppError::NotFound.is_business_rejection());
        assert!(!AppError::Store(StoreError::Unavailable("down".into())).is_business_rejection());
        assert!(!AppError::OrmError(sea_orm::DbErr::ConnectionAcquire(
            sea_orm::ConnAcquireErr::Timeout
        ))
        .is_business_rejection());
    }
}
