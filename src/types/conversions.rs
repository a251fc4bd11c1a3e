use ethers::types::{Address, U256};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Largest scale `Decimal` can represent.
const MAX_DECIMAL_SCALE: u8 = 28;

/// Raw token units to a human amount, e.g. `996_000_000` with 6 decimals to `996`.
pub fn u256_to_decimal(value: U256, decimals: u8) -> Result<Decimal, ConversionError> {
    if decimals > MAX_DECIMAL_SCALE {
        return Err(ConversionError::Overflow);
    }
    let decimal_value = Decimal::from_str(&value.to_string())
        .map_err(|e| ConversionError::InvalidDecimal(e.to_string()))?;

    let divisor = Decimal::from(10u128.pow(decimals as u32));
    Ok((decimal_value / divisor).normalize())
}

pub fn string_to_address(s: &str) -> Result<Address, ConversionError> {
    Address::from_str(s.trim()).map_err(|e| ConversionError::InvalidAddress(e.to_string()))
}

/// Parses a base-10 integer amount in raw token units.
pub fn parse_amount(s: &str) -> Result<U256, ConversionError> {
    let trimmed = s.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConversionError::InvalidAmount(s.to_string()));
    }
    U256::from_dec_str(trimmed).map_err(|_| ConversionError::Overflow)
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),
    #[error("Overflow in conversion")]
    Overflow,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_token_decimals() {
        let value = u256_to_decimal(U256::from(996_500_000u64), 6).unwrap();
        assert_eq!(value.to_string(), "996.5");
        assert_eq!(u256_to_decimal(U256::from(996), 0).unwrap().to_string(), "996");
        assert!(u256_to_decimal(U256::MAX, 18).is_err());
        assert!(u256_to_decimal(U256::one(), 29).is_err());
    }

    #[test]
    fn parses_amounts() {
        assert_eq!(parse_amount("1000").unwrap(), U256::from(1000));
        assert_eq!(parse_amount(" 42 ").unwrap(), U256::from(42));
        assert!(matches!(parse_amount("-5"), Err(ConversionError::InvalidAmount(_))));
        assert!(matches!(parse_amount("0x10"), Err(ConversionError::InvalidAmount(_))));
        assert!(matches!(parse_amount(""), Err(ConversionError::InvalidAmount(_))));
        assert!(matches!(
            parse_amount(&"9".repeat(80)),
            Err(ConversionError::Overflow)
        ));
    }

    #[test]
    fn addresses_parse_any_case() {
        let addr = string_to_address("0x82aF49447D8a07e3bd95BD0d56f35241523fBab1").unwrap();
        assert_eq!(string_to_address(" 0x82af49447d8a07e3bd95bd0d56f35241523fbab1 ").unwrap(), addr);
        assert!(string_to_address("0x1234").is_err());
    }
}
