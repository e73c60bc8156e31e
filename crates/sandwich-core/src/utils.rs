/*!
 * Sandwich Utils
 *
 * Conversões entre unidades base (inteiros on-chain) e valores decimais
 */

use ethereum_types::{Address, H256, U256};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::{Error, Result};

/// Maior escala representável por `Decimal`
const MAX_SCALE: u32 = 28;

/// Casas decimais de gwei
pub const GWEI_DECIMALS: u32 = 9;

/// Converte unidades base para valor decimal com `decimals` casas.
///
/// Valores acima da mantissa de 96 bits perdem os dígitos menos
/// significativos; só falha quando a parte inteira não cabe.
pub fn to_decimal_units(amount: U256, decimals: u32) -> Result<Decimal> {
    if decimals > MAX_SCALE {
        return Err(Error::DecodeError(format!("unsupported decimals {decimals}")));
    }
    let ten = U256::from(10u8);
    let mut mantissa = amount;
    let mut scale = decimals;
    while mantissa.bits() > 96 {
        if scale == 0 {
            return Err(Error::DecodeError(format!("amount {amount} exceeds decimal range")));
        }
        mantissa /= ten;
        scale -= 1;
    }
    Decimal::try_from_i128_with_scale(mantissa.as_u128() as i128, scale)
        .map_err(|e| Error::DecodeError(format!("invalid amount {amount}: {e}")))
}

/// Converte um valor decimal para unidades base, truncando a fração
pub fn from_decimal_units(value: Decimal, decimals: u32) -> Result<U256> {
    if decimals > MAX_SCALE {
        return Err(Error::DecodeError(format!("unsupported decimals {decimals}")));
    }
    if value.is_sign_negative() && !value.is_zero() {
        return Err(Error::DecodeError(format!("negative amount {value}")));
    }
    let factor = Decimal::from_i128_with_scale(10i128.pow(decimals), 0);
    let scaled = value
        .checked_mul(factor)
        .ok_or_else(|| Error::DecodeError(format!("amount {value} overflows at {decimals} decimals")))?
        .trunc();
    let raw = scaled
        .to_u128()
        .ok_or_else(|| Error::DecodeError(format!("amount {value} is not representable")))?;
    Ok(U256::from(raw))
}

/// Aplica um percentual (ex.: `12.5` para 12,5%) a um valor em unidades base
pub fn apply_percent(amount: U256, percent: Decimal) -> U256 {
    // quatro casas de precisão no percentual
    let basis = (percent * Decimal::from(10_000u32))
        .trunc()
        .to_u128()
        .unwrap_or(0);
    let basis = U256::from(basis);
    let denominator = U256::from(1_000_000u64);
    match amount.checked_mul(basis) {
        Some(product) => product / denominator,
        None => amount / denominator * basis,
    }
}

/// wei -> gwei
pub fn wei_to_gwei(wei: U256) -> Result<Decimal> {
    to_decimal_units(wei, GWEI_DECIMALS)
}

/// gwei -> wei
pub fn gwei_to_wei(gwei: Decimal) -> Result<U256> {
    from_decimal_units(gwei, GWEI_DECIMALS)
}

/// Formata um Address para exibição
pub fn format_address(address: &Address) -> String {
    format!("0x{:x}", address)
}

/// Formata um H256 para exibição
pub fn format_h256(hash: &H256) -> String {
    format!("0x{:x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn usdt_amount_to_decimal() {
        let value = to_decimal_units(U256::from(1_000_000u64), 6).unwrap();
        assert_eq!(value, Decimal::ONE);
    }

    #[test]
    fn decimal_back_to_base_units_truncates() {
        let value = Decimal::from_str("1.2345678").unwrap();
        assert_eq!(from_decimal_units(value, 6).unwrap(), U256::from(1_234_567u64));
    }

    #[test]
    fn eighteen_decimals_roundtrip_value() {
        let wei = U256::from_dec_str("2500000000000000000").unwrap();
        let value = to_decimal_units(wei, 18).unwrap();
        assert_eq!(value, Decimal::from_str("2.5").unwrap());
        assert_eq!(from_decimal_units(value, 18).unwrap(), wei);
    }

    #[test]
    fn large_amounts_drop_low_digits() {
        // 1e11 tokens de 18 casas passam da mantissa de 96 bits
        let wei = U256::exp10(29);
        assert_eq!(to_decimal_units(wei, 18).unwrap(), Decimal::from(100_000_000_000u64));
        let odd = U256::exp10(29) + U256::from(7u8);
        assert_eq!(to_decimal_units(odd, 18).unwrap(), Decimal::from(100_000_000_000u64));
    }

    #[test]
    fn huge_amounts_are_rejected() {
        assert!(to_decimal_units(U256::MAX, 18).is_err());
        assert!(from_decimal_units(Decimal::from(-1), 6).is_err());
    }

    #[test]
    fn percent_of_amount() {
        assert_eq!(apply_percent(U256::from(1_000_000u64), Decimal::from(50)), U256::from(500_000u64));
        assert_eq!(
            apply_percent(U256::from(1_000u64), Decimal::from_str("12.5").unwrap()),
            U256::from(125u64)
        );
        // sem overflow para allowances máximas
        assert!(apply_percent(U256::MAX, Decimal::from(10)) > U256::zero());
    }

    #[test]
    fn gwei_conversion() {
        let wei = gwei_to_wei(Decimal::from(50)).unwrap();
        assert_eq!(wei, U256::from(50_000_000_000u64));
        assert_eq!(wei_to_gwei(wei).unwrap(), Decimal::from(50));
    }
}
