use crate::metrics;
pub use anyhow::Result;
use ethers::abi::{Function, Param, ParamType, StateMutability, Token};
use ethers::prelude::*;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// Multicall3 accepts more, but public RPC providers start rejecting larger payloads.
pub const MAX_BATCH_SIZE: usize = 200;

/// A single RPC call to be batched in a multicall.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Call {
    /// Target contract address
    pub target: Address,
    /// Encoded function call data
    pub call_data: Bytes,
}

/// Multicall3 `aggregate3` executor.
///
/// Identical calls are coalesced, the rest are chunked into batches of at
/// most `batch_size`. Each call is sent with `allowFailure = true`; a call
/// that reverts comes back as `None` instead of failing the whole batch.
#[derive(Clone)]
pub struct Multicall<M: Middleware> {
    pub provider: Arc<M>,
    multicall_address: Address,
    batch_size: usize,
    timeout: Duration,
}

impl<M: Middleware + 'static> Multicall<M> {
    pub fn new(provider: Arc<M>, multicall_address: Address, batch_size: usize) -> Self {
        if batch_size > MAX_BATCH_SIZE {
            warn!(
                "Batch size {} exceeds recommended maximum ({}), capping",
                batch_size, MAX_BATCH_SIZE
            );
        }

        Self {
            provider,
            multicall_address,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            timeout: Duration::from_secs(3),
        }
    }

    /// Per-batch timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Runs a batch of calls, optionally at a specific block.
    ///
    /// The result has one entry per input call, in input order.
    pub async fn run(&self, calls: Vec<Call>, block: Option<BlockId>) -> Result<Vec<Option<Bytes>>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        // Coalesce identical calls to reduce load
        let mut unique_calls = indexmap::IndexSet::new();
        let original_indices: Vec<usize> = calls
            .iter()
            .map(|call| unique_calls.insert_full(call.clone()).0)
            .collect();
        let unique_call_vec: Vec<Call> = unique_calls.into_iter().collect();
        debug!(
            "Multicall coalesced {} calls into {}",
            calls.len(),
            unique_call_vec.len()
        );

        let mut all_results_unique: Vec<Option<Bytes>> = Vec::with_capacity(unique_call_vec.len());
        for call_chunk in unique_call_vec.chunks(self.batch_size) {
            metrics::record_multicall_batch_size(call_chunk.len() as f64);

            let return_data = tokio::time::timeout(self.timeout, self.execute_multicall3(call_chunk, block))
                .await
                .map_err(|_| anyhow::anyhow!("multicall timed out after {:?}", self.timeout))??;

            if return_data.len() != call_chunk.len() {
                anyhow::bail!(
                    "multicall returned {} results for {} calls",
                    return_data.len(),
                    call_chunk.len()
                );
            }
            all_results_unique.extend(return_data);
        }

        // Reconstruct the full result set in the original order
        Ok(original_indices
            .into_iter()
            .map(|index| all_results_unique[index].clone())
            .collect())
    }

    async fn execute_multicall3(&self, calls: &[Call], block: Option<BlockId>) -> Result<Vec<Option<Bytes>>> {
        let calldata = encode_aggregate3(calls)?;

        let tx_request = TransactionRequest::new()
            .to(self.multicall_address)
            .data(calldata);
        let typed_tx: ethers::types::transaction::eip2718::TypedTransaction = tx_request.into();
        let response = self
            .provider
            .call(&typed_tx, block)
            .await
            .map_err(|e| anyhow::anyhow!("aggregate3 call failed: {}", e))?;

        decode_aggregate3(&response)
    }
}

#[allow(deprecated)]
fn aggregate3_function() -> Function {
    // function aggregate3(Call3[] calldata calls) payable returns (Result[] memory returnData)
    Function {
        name: "aggregate3".to_string(),
        inputs: vec![Param {
            name: "calls".to_string(),
            kind: ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Address,
                ParamType::Bool,
                ParamType::Bytes,
            ]))),
            internal_type: None,
        }],
        outputs: vec![Param {
            name: "returnData".to_string(),
            kind: ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Bool,
                ParamType::Bytes,
            ]))),
            internal_type: None,
        }],
        constant: None,
        state_mutability: StateMutability::Payable,
    }
}

fn encode_aggregate3(calls: &[Call]) -> Result<Bytes> {
    // Call3 struct: (address target, bool allowFailure, bytes callData)
    let call_tokens = calls
        .iter()
        .map(|call| {
            Token::Tuple(vec![
                Token::Address(call.target),
                Token::Bool(true),
                Token::Bytes(call.call_data.to_vec()),
            ])
        })
        .collect();

    Ok(aggregate3_function()
        .encode_input(&[Token::Array(call_tokens)])?
        .into())
}

/// Decodes `Result[]`; failed calls map to `None`.
fn decode_aggregate3(response: &[u8]) -> Result<Vec<Option<Bytes>>> {
    let decoded = ethers::abi::decode(
        &[ParamType::Array(Box::new(ParamType::Tuple(vec![
            ParamType::Bool,
            ParamType::Bytes,
        ])))],
        response,
    )?;

    let results_array = decoded
        .into_iter()
        .next()
        .and_then(|t| t.into_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid multicall response format"))?;

    results_array
        .into_iter()
        .map(|result_token| match result_token {
            Token::Tuple(tuple) => match tuple.as_slice() {
                [Token::Bool(true), Token::Bytes(data)] => Ok(Some(Bytes::from(data.clone()))),
                [Token::Bool(false), _] => Ok(None),
                _ => Err(anyhow::anyhow!("Malformed aggregate3 result tuple")),
            },
            _ => Err(anyhow::anyhow!("Malformed aggregate3 result")),
        })
        .collect()
}
