//! U256 helpers for hedge amounts.
//!
//! Contract amounts stay in U256/I256 for everything that reaches a
//! transaction; the f64 conversions here are for logging only.

use alloy::primitives::{I256, U256};

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10000u64, 0, 0, 0]);

/// Power of 10 as U256.
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// Magnitude of a signed contract amount.
#[inline(always)]
pub fn abs_amount(amount: I256) -> U256 {
    amount.unsigned_abs()
}

/// Convert WAD (18 decimals) to f64.
/// Use only for display/logging, not for computation.
#[inline(always)]
pub fn wad_to_f64(wad: U256) -> f64 {
    units_to_f64(wad, 18)
}

/// Raw token amount as a decimal number, for display.
pub fn units_to_f64(amount: U256, decimals: u8) -> f64 {
    let scale = pow10(decimals);
    let whole = amount / scale;
    let frac = amount % scale;
    u256_to_f64(whole) + u256_to_f64(frac) / 10f64.powi(decimals as i32)
}

fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, limb| acc * (u64::MAX as f64 + 1.0) + *limb as f64)
}

/// Slippage in percent from the market's WAD fraction (1e16 = 1%).
pub fn slippage_percent(slippage_wad: U256) -> f64 {
    wad_to_f64(slippage_wad) * 100.0
}

/// Smallest acceptable output: `target * (1 - slippage)`.
/// A slippage of 100% or more accepts anything.
pub fn min_output_after_slippage(target: U256, slippage_wad: U256) -> U256 {
    if slippage_wad >= WAD {
        return U256::ZERO;
    }
    let keep = WAD - slippage_wad;
    match target.checked_mul(keep) {
        Some(product) => product / WAD,
        // Divide first for huge targets, losing only sub-WAD precision
        None => target / WAD * keep,
    }
}

/// Calculate percentage as f64 (for display).
/// Returns: (value * 100) / total as percentage
#[inline(always)]
pub fn pct_f64(value: U256, total: U256) -> f64 {
    if total.is_zero() {
        return 0.0;
    }
    let bps = (value.saturating_mul(BPS_DENOMINATOR)) / total;
    u256_to_f64(bps) / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abs_amount() {
        let negative = I256::try_from(-1_500i64).unwrap();
        assert_eq!(abs_amount(negative), U256::from(1_500u64));
        assert_eq!(abs_amount(I256::try_from(42i64).unwrap()), U256::from(42u64));
        assert_eq!(abs_amount(I256::ZERO), U256::ZERO);
    }

    #[test]
    fn test_wad_to_f64() {
        let wad = U256::from(1000u64) * WAD;
        assert!((wad_to_f64(wad) - 1000.0).abs() < 0.001);
        // Larger than u128
        let huge = U256::from(u128::MAX) * U256::from(4u64);
        assert!(wad_to_f64(huge) > 1e20);
    }

    #[test]
    fn test_units_to_f64() {
        // 1.5 USDC
        assert!((units_to_f64(U256::from(1_500_000u64), 6) - 1.5).abs() < 1e-9);
        // 0.25 WETH
        assert!((units_to_f64(U256::from(250_000_000_000_000_000u128), 18) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_slippage_percent() {
        // 0.01 WAD = 1%
        let one_percent = WAD / U256::from(100u64);
        assert!((slippage_percent(one_percent) - 1.0).abs() < 1e-9);
        assert_eq!(slippage_percent(U256::ZERO), 0.0);
    }

    #[test]
    fn test_min_output_after_slippage() {
        let target = U256::from(1_000_000u64);
        let two_percent = WAD / U256::from(50u64);
        assert_eq!(min_output_after_slippage(target, two_percent), U256::from(980_000u64));
        assert_eq!(min_output_after_slippage(target, U256::ZERO), target);
        assert_eq!(min_output_after_slippage(target, WAD), U256::ZERO);
    }

    #[test]
    fn test_min_output_after_slippage_huge_target() {
        let two_percent = WAD / U256::from(50u64);
        let keep = WAD - two_percent;
        let min = min_output_after_slippage(U256::MAX, two_percent);
        assert_eq!(min, U256::MAX / WAD * keep);
        assert!(min < U256::MAX);

        // Largest I256 magnitude overflows the plain product as well
        let max_signed = abs_amount(I256::MIN);
        assert_eq!(
            min_output_after_slippage(max_signed, two_percent),
            max_signed / WAD * keep
        );
    }

    #[test]
    fn test_pct_f64() {
        assert_eq!(pct_f64(U256::from(990u64), U256::from(1000u64)), 99.0);
        assert_eq!(pct_f64(U256::from(1u64), U256::ZERO), 0.0);
    }

    #[test]
    fn test_pow10() {
        assert_eq!(pow10(0), U256::from(1u64));
        assert_eq!(pow10(6), U256::from(1_000_000u64));
        assert_eq!(pow10(18), WAD);
    }
}
