use alloy::primitives::U256;
use bigdecimal::BigDecimal;
use eyre::Context as _;
use std::str::FromStr as _;

/// Largest `decimals` for which `10^decimals` still fits in a `U256`.
pub const MAX_DECIMALS: u8 = 77;

/// Format a base-unit integer amount into a decimal string without using floats.
///
/// The remainder is left-padded with zeros to exactly `decimals` digits, so
/// base=1500000, decimals=6 => "1.500000" and base=1, decimals=6 => "0.000001".
pub fn format_base_units(raw: U256, decimals: u8) -> eyre::Result<String> {
    if decimals == 0 {
        return Ok(raw.to_string());
    }
    if decimals > MAX_DECIMALS {
        eyre::bail!("decimals too large: {decimals}");
    }
    let scale = U256::from(10_u8)
        .checked_pow(U256::from(decimals))
        .ok_or_else(|| eyre::eyre!("decimals too large: {decimals}"))?;
    let whole = raw / scale;
    let frac = (raw % scale).to_string();
    Ok(format!("{whole}.{frac:0>width$}", width = usize::from(decimals)))
}

/// Convert a raw on-chain balance into a human-readable decimal amount.
pub fn base_units_to_decimal(raw: U256, decimals: u8) -> eyre::Result<BigDecimal> {
    let s = format_base_units(raw, decimals)?;
    BigDecimal::from_str(&s).with_context(|| format!("parse converted amount {s}"))
}

/// Parse a usable price: finite and strictly positive. Anything else is "no price".
///
/// Finiteness is judged as an `f64`, so exponents outside its range (`1e400`, `1e-400`) are
/// rejected before they can be expanded into huge plain strings.
pub fn parse_usable_price(s: &str) -> Option<BigDecimal> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    let approx: f64 = t.parse().ok()?;
    if !approx.is_finite() || approx <= 0.0 {
        return None;
    }
    let v = BigDecimal::from_str(t).ok()?;
    if v > BigDecimal::from(0_u8) {
        Some(v)
    } else {
        None
    }
}
