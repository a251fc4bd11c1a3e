/// Failure outcomes of a quote request.
///
/// Every pending request resolves exactly once, either with a quote or with one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuoteError {
    #[error("No route found between the requested tokens")]
    NoRouteFound,
    #[error("No candidate route can be simulated")]
    SimulationInfeasible,
    #[error("On-chain refresh failed: {0}")]
    RefreshFailed(String),
    #[error("Quote request timed out")]
    Timeout,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Quote engine shut down before the request was resolved")]
    Shutdown,
}

impl QuoteError {
    /// Short label used for metrics and the error payload.
    pub fn kind(&self) -> &'static str {
        match self {
            QuoteError::NoRouteFound => "no_route_found",
            QuoteError::SimulationInfeasible => "simulation_infeasible",
            QuoteError::RefreshFailed(_) => "refresh_failed",
            QuoteError::Timeout => "timeout",
            QuoteError::InvalidRequest(_) => "invalid_request",
            QuoteError::Shutdown => "shutdown",
        }
    }

    /// Terminal failures are surfaced immediately and never retried.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, QuoteError::RefreshFailed(_))
    }
}
