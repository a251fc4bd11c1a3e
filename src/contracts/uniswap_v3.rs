use ethers::abi::AbiDecode;
use ethers::prelude::abigen;
use ethers::types::U256;

// Uses the exact Solidity types: uint160 sqrtPriceX96, int24 tick, uint128 liquidity, uint24 fee.
// The generated `*Return` types decode the raw multicall results, so any deviation corrupts them.
abigen!(
    UniswapV3Pool,
    r#"[
        function slot0() external view returns (uint160 sqrtPriceX96, int24 tick, uint16 observationIndex, uint16 observationCardinality, uint16 observationCardinalityNext, uint8 feeProtocol, bool unlocked)
        function liquidity() external view returns (uint128)
        function token0() external view returns (address)
        function token1() external view returns (address)
        function fee() external view returns (uint24)
    ]"#
);

/// Decodes the `sqrtPriceX96` word of a raw `slot0()` return.
pub fn decode_slot0_sqrt_price(data: &[u8]) -> Option<U256> {
    Slot0Return::decode(data).ok().map(|slot0| slot0.sqrt_price_x96)
}

/// Decodes a raw `liquidity()` return.
pub fn decode_liquidity(data: &[u8]) -> Option<U256> {
    LiquidityReturn::decode(data).ok().map(|liquidity| U256::from(liquidity.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{AbiEncode, Token};

    #[test]
    fn call_selectors() {
        assert_eq!(Slot0Call.encode(), vec![0x38, 0x50, 0xc7, 0xbd]);
        assert_eq!(LiquidityCall.encode(), vec![0x1a, 0x68, 0x65, 0x02]);
    }

    #[test]
    fn decodes_slot0_and_liquidity() {
        let sqrt = U256::one() << 96;
        let slot0 = ethers::abi::encode(&[
            Token::Uint(sqrt),
            Token::Int(U256::zero()),
            Token::Uint(U256::from(1)),
            Token::Uint(U256::from(2)),
            Token::Uint(U256::from(3)),
            Token::Uint(U256::zero()),
            Token::Bool(true),
        ]);
        assert_eq!(decode_slot0_sqrt_price(&slot0), Some(sqrt));

        let liquidity = ethers::abi::encode(&[Token::Uint(U256::from(1_000_000u64))]);
        assert_eq!(decode_liquidity(&liquidity), Some(U256::from(1_000_000u64)));
    }

    #[test]
    fn short_payloads_do_not_decode() {
        assert_eq!(decode_slot0_sqrt_price(&[0u8; 32]), None);
        assert_eq!(decode_liquidity(&[]), None);
    }
}
