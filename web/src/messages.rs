//! Wire messages of the bank and resiliency services.
//!
//! Interceptors see messages through [`RequestMut`] and [`ResponseMut`],
//! one variant per message kind, so a hook matches on the kinds it cares
//! about and ignores the rest.

use chrono::{DateTime, NaiveDate, Utc};
use ledger_rpc_core::{TransactionType, TransferId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// `GetCurrentBalance` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentBalanceRequest {
    /// Account to look up
    pub account_number: String,
}

/// `GetCurrentBalance` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentBalanceResponse {
    /// Current balance
    pub amount: Decimal,
    /// Server date of the lookup
    pub current_date: NaiveDate,
}

/// `FetchExchangeRates` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRateRequest {
    /// Source currency
    pub from_currency: String,
    /// Target currency
    pub to_currency: String,
}

/// One `FetchExchangeRates` update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRateResponse {
    /// Source currency
    pub from_currency: String,
    /// Target currency
    pub to_currency: String,
    /// Rate valid at `timestamp`
    pub rate: Decimal,
    /// RFC 3339 instant the rate was resolved at
    pub timestamp: String,
}

fn unknown_type() -> TransactionType {
    TransactionType::Unknown
}

/// One `SummarizeTransactions` input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Account the transaction is booked on
    pub account_number: String,
    /// Direction; missing means UNKNOWN
    #[serde(rename = "type", default = "unknown_type")]
    pub transaction_type: TransactionType,
    /// Non-negative magnitude
    pub amount: Decimal,
    /// When it happened; defaults to the server clock
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Free text
    #[serde(default)]
    pub notes: String,
}

/// `SummarizeTransactions` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummaryResponse {
    /// Account of the last transaction in the stream
    pub account_number: String,
    /// Sum of IN amounts
    pub sum_in: Decimal,
    /// Sum of OUT amounts
    pub sum_out: Decimal,
    /// `sum_in - sum_out`
    pub sum_total: Decimal,
    /// Date the summary was produced
    pub date: NaiveDate,
}

/// One `TransferMultiple` input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Source account
    pub from_account_number: String,
    /// Destination account
    pub to_account_number: String,
    /// Currency of the amount
    pub currency: String,
    /// Amount to move
    pub amount: Decimal,
}

/// Outcome of one transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    /// Both legs committed
    Success,
    /// Nothing moved; the attempt is on record
    Failed,
}

/// One `TransferMultiple` output, paired with its request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResponse {
    /// Source account
    pub from_account_number: String,
    /// Destination account
    pub to_account_number: String,
    /// Currency of the amount
    pub currency: String,
    /// Amount requested
    pub amount: Decimal,
    /// Server time of the response
    pub timestamp: DateTime<Utc>,
    /// Outcome
    pub status: TransferStatus,
    /// Header of the attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<TransferId>,
}

/// Input of every resiliency method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResiliencyRequest {
    /// Lower delay bound in seconds; negative is clamped to 0
    #[serde(default)]
    pub min_delay_second: i64,
    /// Upper delay bound in seconds
    #[serde(default)]
    pub max_delay_second: i64,
    /// Candidate status codes; 0 means success
    #[serde(default)]
    pub status_codes: Vec<u32>,
}

/// Output of every resiliency method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResiliencyResponse {
    /// Description of the draw
    pub message: String,
}

/// Mutable view of an inbound message, by kind.
#[derive(Debug)]
pub enum RequestMut<'a> {
    /// `GetCurrentBalance`
    CurrentBalance(&'a mut CurrentBalanceRequest),
    /// `FetchExchangeRates`
    ExchangeRate(&'a mut ExchangeRateRequest),
    /// `SummarizeTransactions`
    Transaction(&'a mut TransactionRequest),
    /// `TransferMultiple`
    Transfer(&'a mut TransferRequest),
    /// Resiliency methods
    Resiliency(&'a mut ResiliencyRequest),
}

impl RequestMut<'_> {
    /// Message kind, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CurrentBalance(_) => "CurrentBalanceRequest",
            Self::ExchangeRate(_) => "ExchangeRateRequest",
            Self::Transaction(_) => "TransactionRequest",
            Self::Transfer(_) => "TransferRequest",
            Self::Resiliency(_) => "ResiliencyRequest",
        }
    }
}

/// Mutable view of an outbound message, by kind.
#[derive(Debug)]
pub enum ResponseMut<'a> {
    /// `GetCurrentBalance`
    CurrentBalance(&'a mut CurrentBalanceResponse),
    /// `FetchExchangeRates`
    ExchangeRate(&'a mut ExchangeRateResponse),
    /// `SummarizeTransactions`
    TransactionSummary(&'a mut TransactionSummaryResponse),
    /// `TransferMultiple`
    Transfer(&'a mut TransferResponse),
    /// Resiliency methods
    Resiliency(&'a mut ResiliencyResponse),
}

impl ResponseMut<'_> {
    /// Message kind, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CurrentBalance(_) => "CurrentBalanceResponse",
            Self::ExchangeRate(_) => "ExchangeRateResponse",
            Self::TransactionSummary(_) => "TransactionSummaryResponse",
            Self::Transfer(_) => "TransferResponse",
            Self::Resiliency(_) => "ResiliencyResponse",
        }
    }
}

/// An inbound message interceptors can rewrite.
pub trait Inbound: Send + 'static {
    /// Borrow as the matching [`RequestMut`] variant.
    fn as_request_mut(&mut self) -> RequestMut<'_>;
}

/// An outbound message interceptors can rewrite.
pub trait Outbound: Serialize + Send + 'static {
    /// Borrow as the matching [`ResponseMut`] variant.
    fn as_response_mut(&mut self) -> ResponseMut<'_>;
}

macro_rules! wire_kind {
    ($trait:ident, $method:ident, $view:ident, $($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl $trait for $ty {
                fn $method(&mut self) -> $view<'_> {
                    $view::$variant(self)
                }
            }
        )+
    };
}

wire_kind!(Inbound, as_request_mut, RequestMut,
    CurrentBalanceRequest => CurrentBalance,
    ExchangeRateRequest => ExchangeRate,
    TransactionRequest => Transaction,
    TransferRequest => Transfer,
    ResiliencyRequest => Resiliency,
);

wire_kind!(Outbound, as_response_mut, ResponseMut,
    CurrentBalanceResponse => CurrentBalance,
    ExchangeRateResponse => ExchangeRate,
    TransactionSummaryResponse => TransactionSummary,
    TransferResponse => Transfer,
    ResiliencyResponse => Resiliency,
);
