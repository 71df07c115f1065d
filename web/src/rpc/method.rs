//! The RPC methods and their call shapes.

use std::fmt;

/// How requests and responses flow in a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallShape {
    /// One request, one response.
    Unary,
    /// One request, many responses.
    ServerStream,
    /// Many requests, one response.
    ClientStream,
    /// Many requests, one response each.
    Bidirectional,
}

impl CallShape {
    /// Metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unary => "unary",
            Self::ServerStream => "server_stream",
            Self::ClientStream => "client_stream",
            Self::Bidirectional => "bidi_stream",
        }
    }

    /// Whether the transport binds this shape to a WebSocket.
    #[must_use]
    pub const fn is_streaming(self) -> bool {
        !matches!(self, Self::Unary)
    }
}

/// Every method exposed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Balance lookup.
    GetCurrentBalance,
    /// Live exchange rate feed.
    FetchExchangeRates,
    /// Record transactions and summarise them.
    SummarizeTransactions,
    /// Transfer, one response per request.
    TransferMultiple,
    /// One fault draw.
    UnaryResiliency,
    /// Fault draws until a non-zero code or cancellation.
    ServerStreamResiliency,
    /// One fault draw per inbound message, one reply at the end.
    ClientStreamResiliency,
    /// One fault draw and reply per inbound message.
    BidirectionalStreamResiliency,
}

/// Fully qualified name of the bank service.
pub const BANK_SERVICE: &str = "bank.BankService";
/// Fully qualified name of the resiliency service.
pub const RESILIENCY_SERVICE: &str = "resiliency.ResiliencyService";

impl Method {
    /// All methods.
    pub const ALL: [Self; 8] = [
        Self::GetCurrentBalance,
        Self::FetchExchangeRates,
        Self::SummarizeTransactions,
        Self::TransferMultiple,
        Self::UnaryResiliency,
        Self::ServerStreamResiliency,
        Self::ClientStreamResiliency,
        Self::BidirectionalStreamResiliency,
    ];

    /// Method name within its service.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GetCurrentBalance => "GetCurrentBalance",
            Self::FetchExchangeRates => "FetchExchangeRates",
            Self::SummarizeTransactions => "SummarizeTransactions",
            Self::TransferMultiple => "TransferMultiple",
            Self::UnaryResiliency => "UnaryResiliency",
            Self::ServerStreamResiliency => "ServerStreamResiliency",
            Self::ClientStreamResiliency => "ClientStreamResiliency",
            Self::BidirectionalStreamResiliency => "BidirectionalStreamResiliency",
        }
    }

    /// Owning service.
    #[must_use]
    pub const fn service(self) -> &'static str {
        match self {
            Self::GetCurrentBalance
            | Self::FetchExchangeRates
            | Self::SummarizeTransactions
            | Self::TransferMultiple => BANK_SERVICE,
            Self::UnaryResiliency
            | Self::ServerStreamResiliency
            | Self::ClientStreamResiliency
            | Self::BidirectionalStreamResiliency => RESILIENCY_SERVICE,
        }
    }

    /// Declared call shape.
    #[must_use]
    pub const fn shape(self) -> CallShape {
        match self {
            Self::GetCurrentBalance | Self::UnaryResiliency => CallShape::Unary,
            Self::FetchExchangeRates | Self::ServerStreamResiliency => CallShape::ServerStream,
            Self::SummarizeTransactions | Self::ClientStreamResiliency => CallShape::ClientStream,
            Self::TransferMultiple | Self::BidirectionalStreamResiliency => {
                CallShape::Bidirectional
            },
        }
    }

    /// Method addressed by `service` and `name`.
    #[must_use]
    pub fn resolve(service: &str, name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|method| method.service() == service && method.name() == name)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.service(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_every_method() {
        for method in Method::ALL {
            assert_eq!(Method::resolve(method.service(), method.name()), Some(method));
        }
        assert_eq!(Method::resolve(BANK_SERVICE, "UnaryResiliency"), None);
    }

    #[test]
    fn test_shapes() {
        assert_eq!(Method::GetCurrentBalance.shape(), CallShape::Unary);
        assert_eq!(Method::FetchExchangeRates.shape(), CallShape::ServerStream);
        assert_eq!(Method::SummarizeTransactions.shape(), CallShape::ClientStream);
        assert_eq!(Method::TransferMultiple.shape(), CallShape::Bidirectional);
        assert_eq!(
            Method::TransferMultiple.to_string(),
            "/bank.BankService/TransferMultiple"
        );
    }
}
