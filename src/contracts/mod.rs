// Contracts Module - Public ABIs Only

pub mod uniswap_v3;
pub use uniswap_v3::{
    decode_liquidity, decode_slot0_sqrt_price, LiquidityCall, Slot0Call, UniswapV3Pool,
};
