//! Exact U256 arithmetic for liquidation sizing.
//!
//! All values are integers and every division floors. USD values are in the
//! protocol's 18-decimal base currency, prices are 18-decimal WAD.
//! Never round up: a request must not exceed what is available.

use alloy::primitives::U256;

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10000u64, 0, 0, 0]);

/// Decimals of the base currency.
const BASE_DECIMALS: u8 = 18;

/// Power of 10, saturating at `U256::MAX` past 10^77.
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    U256::from(10u64)
        .checked_pow(U256::from(exp))
        .unwrap_or(U256::MAX)
}

/// Value of `amount` token units in the base currency.
///
/// Formula: amount * price / 10^decimals
#[inline(always)]
pub fn to_usd(amount: U256, price_wad: U256, decimals: u8) -> U256 {
    if amount.is_zero() || price_wad.is_zero() {
        return U256::ZERO;
    }
    amount.saturating_mul(price_wad) / pow10(decimals)
}

/// Token units worth `usd` in the base currency. Zero price yields zero.
///
/// Formula: usd * 10^decimals / price
#[inline(always)]
pub fn usd_to_token_amount(usd: U256, price_wad: U256, decimals: u8) -> U256 {
    if price_wad.is_zero() {
        return U256::ZERO;
    }
    usd.saturating_mul(pow10(decimals)) / price_wad
}

/// Scale a token amount to 18 decimals.
#[inline(always)]
fn to_base_units(amount: U256, decimals: u8) -> U256 {
    if decimals <= BASE_DECIMALS {
        amount.saturating_mul(pow10(BASE_DECIMALS - decimals))
    } else {
        amount / pow10(decimals - BASE_DECIMALS)
    }
}

/// Scale an 18-decimal amount back to token decimals.
#[inline(always)]
fn from_base_units(amount: U256, decimals: u8) -> U256 {
    if decimals <= BASE_DECIMALS {
        amount / pow10(BASE_DECIMALS - decimals)
    } else {
        amount.saturating_mul(pow10(decimals - BASE_DECIMALS))
    }
}

/// Convert `amount_a` of token A into the equivalent amount of token B at oracle prices.
///
/// Both amounts go through 18-decimal intermediates; each step floors.
/// Zero price of B yields zero.
pub fn convert_token_amount(
    amount_a: U256,
    decimals_a: u8,
    price_a: U256,
    decimals_b: u8,
    price_b: U256,
) -> U256 {
    if price_b.is_zero() {
        return U256::ZERO;
    }
    let base_a = to_base_units(amount_a, decimals_a);
    let value = base_a.saturating_mul(price_a) / WAD;
    let base_b = value.saturating_mul(WAD) / price_b;
    from_base_units(base_b, decimals_b)
}

/// `value / 100 * pct`, flooring before the multiplication.
#[inline(always)]
pub fn percent_of(value: U256, pct: u64) -> U256 {
    (value / U256::from(100u64)).saturating_mul(U256::from(pct))
}

/// Convert WAD (18 decimals) to f64.
/// Use only for display/logging, not for computation.
#[inline(always)]
pub fn wad_to_f64(wad: U256) -> f64 {
    if wad <= U256::from(u128::MAX) {
        let value: u128 = wad.to();
        value as f64 / 1e18
    } else {
        let limbs = wad.as_limbs();
        let high = limbs[1] as f64 * (u64::MAX as f64 + 1.0);
        let low = limbs[0] as f64;
        (high + low) / 1e18
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wad(n: u64) -> U256 {
        U256::from(n) * WAD
    }

    #[test]
    fn test_to_usd() {
        // 1000 USDC (6 decimals) at 0.0005 ETH
        let amount = U256::from(1_000_000_000u64);
        let price = U256::from(500_000_000_000_000u64);
        assert_eq!(to_usd(amount, price, 6), U256::from(500_000_000_000_000_000u64));

        // 2 WETH at 1.0
        assert_eq!(to_usd(wad(2), WAD, 18), wad(2));

        assert_eq!(to_usd(U256::ZERO, WAD, 18), U256::ZERO);
        assert_eq!(to_usd(wad(1), U256::ZERO, 18), U256::ZERO);
    }

    #[test]
    fn test_usd_to_token_amount_floors() {
        // 1 ETH of value in a token priced at 3 ETH with 6 decimals = 333333.33 -> 333333
        let amount = usd_to_token_amount(WAD, wad(3), 6);
        assert_eq!(amount, U256::from(333_333u64));

        assert_eq!(usd_to_token_amount(WAD, U256::ZERO, 6), U256::ZERO);
    }

    #[test]
    fn test_convert_token_amount_known_values() {
        // 1 WBTC (8 decimals, 20 ETH) -> WETH (18 decimals, 1 ETH) = 20 WETH
        let one_btc = U256::from(100_000_000u64);
        let converted = convert_token_amount(one_btc, 8, wad(20), 18, WAD);
        assert_eq!(converted, wad(20));

        // 20 WETH -> USDC (6 decimals, 0.0005 ETH) = 40000 USDC
        let usdc_price = U256::from(500_000_000_000_000u64);
        let converted = convert_token_amount(wad(20), 18, WAD, 6, usdc_price);
        assert_eq!(converted, U256::from(40_000_000_000u64));

        // Same token is identity
        assert_eq!(
            convert_token_amount(U256::from(12345u64), 6, usdc_price, 6, usdc_price),
            U256::from(12345u64)
        );
    }

    #[test]
    fn test_convert_roundtrip_within_one_unit() {
        let tokens: [(u8, U256); 5] = [
            (18, WAD),
            (6, U256::from(500_000_000_000_000u64)),
            (8, wad(20)),
            (0, U256::from(7u64)),
            (12, U256::from(3_141_592_653_589_793_238u64)),
        ];
        let amounts = [1u64, 999, 1_000_000, 123_456_789_012_345_678];

        for (dec_a, price_a) in tokens {
            for (dec_b, price_b) in tokens {
                for amount in amounts {
                    let amount = U256::from(amount);
                    let b = convert_token_amount(amount, dec_a, price_a, dec_b, price_b);
                    let back = convert_token_amount(b, dec_b, price_b, dec_a, price_a);

                    // One unit of B in A units, plus the floors of the intermediate steps
                    let unit_of_b =
                        convert_token_amount(U256::from(1u8), dec_b, price_b, dec_a, price_a);
                    let tolerance = unit_of_b + U256::from(3u8);

                    assert!(back <= amount, "roundtrip must never round up");
                    assert!(
                        amount - back <= tolerance,
                        "amount={amount} back={back} dec_a={dec_a} dec_b={dec_b}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_percent_of_floors_first() {
        // 199 / 100 = 1, * 15 = 15 (not 29)
        assert_eq!(percent_of(U256::from(199u64), 15), U256::from(15u64));
        assert_eq!(percent_of(wad(100), 15), wad(15));
    }

    #[test]
    fn test_pow10_saturates() {
        assert_eq!(pow10(0), U256::from(1u64));
        assert_eq!(pow10(18), WAD);
        assert!(pow10(77) > pow10(76));
        assert_eq!(pow10(78), U256::MAX);
        assert_eq!(pow10(u8::MAX), U256::MAX);
        // Oversized decimals value a balance at nothing instead of wrapping
        assert_eq!(to_usd(wad(1), WAD, 80), U256::ZERO);
    }

    #[test]
    fn test_wad_to_f64() {
        assert!((wad_to_f64(wad(3) / U256::from(2u64)) - 1.5).abs() < 1e-12);
    }
}
