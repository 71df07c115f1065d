//! Mapping between domain errors, wire statuses and HTTP responses.
//!
//! Every [`LedgerError`] becomes exactly one [`Status`]. Storage failures
//! are reported with a generic message and a help link; their raw text is
//! only logged.

use crate::rpc::{Code, HelpLink, PreconditionViolation, Status, StatusDetail};
use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use ledger_rpc_core::{LedgerError, StorageError};
use std::collections::BTreeMap;

/// Domain used in `ErrorInfo` details.
pub const ERROR_DOMAIN: &str = "my-bank-website.com";

/// Operator FAQ linked from internal errors.
pub const HELP_URL: &str = "my-bank-website.com/faq";

const INTERNAL_MESSAGE: &str = "An internal error occurred";

fn help() -> StatusDetail {
    StatusDetail::Help {
        links: vec![HelpLink {
            url: HELP_URL.to_string(),
            description: "Bank FAQ".to_string(),
        }],
    }
}

fn error_info(reason: &str, metadata: &[(&str, &str)]) -> StatusDetail {
    StatusDetail::ErrorInfo {
        domain: ERROR_DOMAIN.to_string(),
        reason: reason.to_string(),
        metadata: metadata
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

fn invalid_account(subject: &str, description: String) -> StatusDetail {
    StatusDetail::PreconditionFailure {
        violations: vec![PreconditionViolation {
            kind: "INVALID_ACCOUNT".to_string(),
            subject: subject.to_string(),
            description,
        }],
    }
}

fn internal(error: &LedgerError) -> Status {
    tracing::error!(error = %error, "Internal error");
    Status::new(Code::Internal, INTERNAL_MESSAGE).with_detail(help())
}

/// Classify a domain error into its wire status.
#[must_use]
pub fn classify(error: &LedgerError) -> Status {
    match error {
        LedgerError::AccountNotFound { account_number } => {
            Status::new(Code::NotFound, error.to_string()).with_detail(error_info(
                "ACCOUNT_NOT_FOUND",
                &[("account_number", account_number.as_str())],
            ))
        },
        LedgerError::SourceAccountNotFound { account_number } => {
            Status::new(Code::NotFound, error.to_string()).with_detail(invalid_account(
                "Source account not found",
                format!("source account (from {account_number}) not found"),
            ))
        },
        LedgerError::DestinationAccountNotFound { account_number } => {
            Status::new(Code::NotFound, error.to_string()).with_detail(invalid_account(
                "Destination account not found",
                format!("destination account (to {account_number}) not found"),
            ))
        },
        LedgerError::RateNotFound { from, to, .. } => {
            Status::new(Code::FailedPrecondition, "failed to get exchange rate").with_detail(
                error_info(
                    "EXCHANGE_RATE_UNAVAILABLE",
                    &[("from_currency", from.as_str()), ("to_currency", to.as_str())],
                ),
            )
        },
        LedgerError::UnknownTransactionType => {
            Status::invalid_field("type", "transaction type must be IN or OUT")
        },
        LedgerError::InvalidAmount { amount } => {
            Status::invalid_field("amount", format!("invalid amount {amount}"))
        },
        LedgerError::InvalidAccountNumber { reason } => {
            Status::invalid_field("account_number", reason.clone())
        },
        LedgerError::InvalidCurrency { reason } => Status::invalid_field("currency", reason.clone()),
        LedgerError::InvalidWindow { .. } => Status::invalid_field("valid_to", error.to_string()),
        LedgerError::EmptyStatusCodeSet => {
            Status::invalid_field("status_codes", "at least one status code is required")
        },
        LedgerError::TransferPairFailed {
            transfer_id,
            from_account_number,
            to_account_number,
            currency,
            amount,
            ..
        } => {
            let transfer_id = transfer_id.to_string();
            let amount = amount.to_string();
            internal(error).with_detail(error_info(
                "TRANSACTION_PAIR_FAILED",
                &[
                    ("transfer_id", transfer_id.as_str()),
                    ("from_account", from_account_number.as_str()),
                    ("to_account", to_account_number.as_str()),
                    ("currency", currency.as_str()),
                    ("amount", amount.as_str()),
                ],
            ))
        },
        LedgerError::Storage(StorageError::Conflict(_)) => {
            tracing::warn!(error = %error, "Unresolved storage conflict");
            Status::new(Code::Unknown, "the operation could not be completed, try again")
        },
        LedgerError::Storage(StorageError::Duplicate(_)) => {
            Status::new(Code::AlreadyExists, "the record already exists")
        },
        LedgerError::TransferRecordFailed(_)
        | LedgerError::Storage(StorageError::Database(_) | StorageError::Corrupt(_)) => {
            internal(error)
        },
    }
}

impl From<LedgerError> for Status {
    fn from(error: LedgerError) -> Self {
        classify(&error)
    }
}

/// HTTP status for a wire code.
#[must_use]
pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => {
            StatusCode::BAD_REQUEST
        },
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists | Code::Aborted => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::Unknown | Code::Internal | Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Header carrying the numeric wire code on unary responses.
pub const GRPC_STATUS_HEADER: &str = "grpc-status";

impl IntoResponse for Status {
    fn into_response(self) -> Response {
        let status = http_status(self.code);
        if status.is_server_error() {
            tracing::error!(code = %self.code, message = %self.message, "RPC failed");
        }
        let code = self.code.as_u32();

        let mut response = (status, Json(self)).into_response();
        response
            .headers_mut()
            .insert(GRPC_STATUS_HEADER, HeaderValue::from(code));
        response
    }
}
