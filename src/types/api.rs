// Client-facing request and response shapes.
// Amounts travel as base-10 strings of raw token units; routes as address lists.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::allocation::Quote;
use crate::errors::QuoteError;
use crate::quote_cache::QuoteKey;
use crate::types::conversions::{parse_amount, string_to_address};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub token_in: String,
    pub token_out: String,
    pub amount_in: String,
    pub chain_id: u64,
}

impl QuoteRequest {
    pub fn new(token_in: Address, token_out: Address, amount_in: U256, chain_id: u64) -> Self {
        Self {
            token_in: format!("{:?}", token_in),
            token_out: format!("{:?}", token_out),
            amount_in: amount_in.to_string(),
            chain_id,
        }
    }

    /// Parses and validates the request into its cache/dedup key.
    pub fn to_key(&self) -> Result<QuoteKey, QuoteError> {
        let token_in = string_to_address(&self.token_in)
            .map_err(|e| QuoteError::InvalidRequest(format!("tokenIn: {}", e)))?;
        let token_out = string_to_address(&self.token_out)
            .map_err(|e| QuoteError::InvalidRequest(format!("tokenOut: {}", e)))?;
        let amount_in = parse_amount(&self.amount_in)
            .map_err(|e| QuoteError::InvalidRequest(format!("amountIn: {}", e)))?;

        let key = QuoteKey {
            chain_id: self.chain_id,
            token_in,
            token_out,
            amount_in,
        };
        validate_key(&key)?;
        Ok(key)
    }
}

/// Shape checks that need no state: distinct non-zero tokens and a positive amount.
pub fn validate_key(key: &QuoteKey) -> Result<(), QuoteError> {
    if key.token_in.is_zero() || key.token_out.is_zero() {
        return Err(QuoteError::InvalidRequest("token address is missing".to_string()));
    }
    if key.token_in == key.token_out {
        return Err(QuoteError::InvalidRequest(
            "tokenIn and tokenOut must differ".to_string(),
        ));
    }
    if key.amount_in.is_zero() {
        return Err(QuoteError::InvalidRequest(
            "amountIn must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionEntry {
    pub route: Vec<Address>,
    pub amount: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
}

/// Single-route answer, split answer, or failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QuoteResponse {
    #[serde(rename_all = "camelCase")]
    Single { route: Vec<Address>, amount_out: String },
    #[serde(rename_all = "camelCase")]
    Split {
        distribution: Vec<DistributionEntry>,
        final_amount_out: String,
    },
    Error { error: ErrorPayload },
}

impl From<&Quote> for QuoteResponse {
    fn from(quote: &Quote) -> Self {
        match quote {
            Quote::Single(q) => QuoteResponse::Single {
                route: q.route.tokens().to_vec(),
                amount_out: q.amount_out.to_string(),
            },
            Quote::Split {
                allocations,
                final_amount_out,
            } => QuoteResponse::Split {
                distribution: allocations
                    .iter()
                    .map(|a| DistributionEntry {
                        route: a.route.tokens().to_vec(),
                        amount: a.amount_in.to_string(),
                        output: a.amount_out.to_string(),
                    })
                    .collect(),
                final_amount_out: final_amount_out.to_string(),
            },
        }
    }
}

impl From<&QuoteError> for QuoteResponse {
    fn from(error: &QuoteError) -> Self {
        QuoteResponse::Error {
            error: ErrorPayload {
                kind: error.kind().to_string(),
                message: error.to_string(),
            },
        }
    }
}

impl From<Result<Quote, QuoteError>> for QuoteResponse {
    fn from(result: Result<Quote, QuoteError>) -> Self {
        match &result {
            Ok(quote) => quote.into(),
            Err(error) => error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{Allocation, RouteQuote};
    use crate::router::Route;
    use serde_json::json;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[test]
    fn parses_wire_request() {
        let request: QuoteRequest = serde_json::from_value(json!({
            "tokenIn": format!("{:?}", addr(0xa)),
            "tokenOut": format!("{:?}", addr(0xb)),
            "amountIn": "1000",
            "chainId": 42161
        }))
        .unwrap();

        let key = request.to_key().unwrap();
        assert_eq!(key.token_in, addr(0xa));
        assert_eq!(key.amount_in, U256::from(1000));
        assert_eq!(key.chain_id, 42161);
        assert_eq!(QuoteRequest::new(addr(0xa), addr(0xb), U256::from(1000), 42161), request);
    }

    #[test]
    fn rejects_malformed_requests() {
        let ok = QuoteRequest::new(addr(0xa), addr(0xb), U256::from(1), 1);

        let same = QuoteRequest {
            token_out: ok.token_in.clone(),
            ..ok.clone()
        };
        let zero = QuoteRequest {
            amount_in: "0".to_string(),
            ..ok.clone()
        };
        let bad_addr = QuoteRequest {
            token_in: "0xnothex".to_string(),
            ..ok.clone()
        };
        let missing = QuoteRequest::new(Address::zero(), addr(0xb), U256::from(1), 1);

        for request in [same, zero, bad_addr, missing] {
            assert!(matches!(request.to_key(), Err(QuoteError::InvalidRequest(_))), "{:?}", request);
        }
        assert!(ok.to_key().is_ok());
    }

    #[test]
    fn serializes_single_split_and_error() {
        let route = Route::new(vec![addr(0xa), addr(0xb)]).unwrap();
        let single = Quote::Single(RouteQuote {
            route: route.clone(),
            amount_in: U256::from(1000),
            amount_out: U256::from(996),
        });
        assert_eq!(
            serde_json::to_value(QuoteResponse::from(&single)).unwrap(),
            json!({ "route": [addr(0xa), addr(0xb)], "amountOut": "996" })
        );

        let split = Quote::Split {
            allocations: vec![Allocation {
                route,
                amount_in: U256::from(600),
                amount_out: U256::from(598),
            }],
            final_amount_out: U256::from(598),
        };
        assert_eq!(
            serde_json::to_value(QuoteResponse::from(&split)).unwrap(),
            json!({
                "distribution": [{ "route": [addr(0xa), addr(0xb)], "amount": "600", "output": "598" }],
                "finalAmountOut": "598"
            })
        );

        let error = QuoteResponse::from(Err::<Quote, _>(QuoteError::NoRouteFound));
        assert_eq!(
            serde_json::to_value(error).unwrap()["error"]["kind"],
            json!("no_route_found")
        );
    }
}
