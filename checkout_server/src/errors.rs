use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use checkout_engine::{traits::InventoryError, CheckoutError, OrderStateError, ReconciliationError};
use log::error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Signature check failed. {0}")]
    InvalidSignature(String),
    #[error("The request conflicts with the current state of the order. {0}")]
    Conflict(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidSignature(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<ReconciliationError> for ServerError {
    fn from(e: ReconciliationError) -> Self {
        match e {
            ReconciliationError::SignatureInvalid(_) => Self::InvalidSignature(e.to_string()),
            ReconciliationError::MalformedNotification(_) => Self::InvalidRequestBody(e.to_string()),
            ReconciliationError::OrderNotFound(_) => Self::NoRecordFound(e.to_string()),
            ReconciliationError::InvalidTransition { .. } => Self::Conflict(e.to_string()),
            ReconciliationError::TenantSecretMissing(_) => {
                error!("🚨️ {e}. Payment notifications for this tenant cannot be verified until it is configured.");
                Self::BackendError(e.to_string())
            },
            ReconciliationError::TransientStoreFailure(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<InventoryError> for ServerError {
    fn from(e: InventoryError) -> Self {
        match e {
            InventoryError::InsufficientStock { .. } => Self::Conflict(e.to_string()),
            InventoryError::ProductNotFound(_) => Self::NoRecordFound(e.to_string()),
            InventoryError::TenantMismatch { .. } | InventoryError::InvalidQuantity(_) => {
                Self::InvalidRequestBody(e.to_string())
            },
            InventoryError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<OrderStateError> for ServerError {
    fn from(e: OrderStateError) -> Self {
        match e {
            OrderStateError::InvalidTransition { .. } => Self::Conflict(e.to_string()),
            OrderStateError::OrderNotFound(_) => Self::NoRecordFound(e.to_string()),
            OrderStateError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<CheckoutError> for ServerError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::OrderAlreadyExists(_) => Self::Conflict(e.to_string()),
            CheckoutError::Inventory(e) => e.into(),
            CheckoutError::OrderState(e) => e.into(),
            CheckoutError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}
