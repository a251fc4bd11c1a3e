// Sqrt-price reserve derivation and constant-product swap math for the quoting hot path.
//
// All arithmetic is integer and truncating. Intermediates are widened to U512 so
// that products of two 256-bit values never wrap.
use ethers::types::{U256, U512};

use crate::pools::{PoolState, SwapDirection};

/// Fee denominator: fees are expressed in parts per million.
pub const FEE_DENOMINATOR: u32 = 1_000_000;

/// Q96 squared, the scale of `sqrt_price_x96^2`.
fn q192() -> U512 {
    U512::one() << 192
}

fn saturate(value: U512) -> U256 {
    U256::try_from(value).unwrap_or(U256::MAX)
}

/// Virtual reserves `(reserve_in, reserve_out)` for a hop through `pool`.
///
/// `reserve_in = liquidity`. For token0 → token1 the output side is
/// `liquidity * sqrtP^2 / 2^192`, for token1 → token0 it is the reciprocal
/// `liquidity * 2^192 / sqrtP^2`. A zero sqrt price gives a zero output reserve.
/// Reserves beyond 2^256 - 1 saturate.
pub fn hop_reserves(pool: &PoolState, direction: SwapDirection) -> (U256, U256) {
    let liquidity = pool.liquidity;
    if liquidity.is_zero() || pool.sqrt_price_x96.is_zero() {
        return (liquidity, U256::zero());
    }

    let price_sq: U512 = pool.sqrt_price_x96.full_mul(pool.sqrt_price_x96);
    let reserve_out = match direction {
        SwapDirection::ZeroForOne => match U512::from(liquidity).checked_mul(price_sq) {
            Some(product) => product / q192(),
            None => U512::MAX,
        },
        SwapDirection::OneForZero => (U512::from(liquidity) << 192) / price_sq,
    };

    (liquidity, saturate(reserve_out))
}

/// Deducts a proportional fee: `amount * (1_000_000 - fee_ppm) / 1_000_000`.
pub fn apply_fee(amount: U256, fee_ppm: u32) -> U256 {
    if fee_ppm >= FEE_DENOMINATOR {
        return U256::zero();
    }
    let kept = U256::from(FEE_DENOMINATOR - fee_ppm);
    saturate(amount.full_mul(kept) / U512::from(FEE_DENOMINATOR))
}

/// Constant-product output: `reserve_out * amount_in / (reserve_in + amount_in)`.
///
/// Returns zero instead of dividing by zero.
pub fn get_amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256) -> U256 {
    let denominator = U512::from(reserve_in) + U512::from(amount_in);
    if denominator.is_zero() {
        return U256::zero();
    }
    saturate(reserve_out.full_mul(amount_in) / denominator)
}

/// Output of selling `amount_in` of `token_in` into `pool`, fee included.
///
/// `None` when `token_in` is not one of the pool's tokens.
pub fn swap_exact_in(pool: &PoolState, token_in: &ethers::types::Address, amount_in: U256) -> Option<U256> {
    let direction = pool.direction(token_in)?;
    let (reserve_in, reserve_out) = hop_reserves(pool, direction);
    let after_fee = apply_fee(amount_in, pool.fee_ppm);
    Some(get_amount_out(after_fee, reserve_in, reserve_out))
}
