//! Conversion between human-readable decimal amounts and base units
//!
//! "1.5" with 18 decimals = 1500000000000000000. Pure string arithmetic,
//! never floating point.

use ethers::types::U256;

pub fn to_base_units(amount: &str, decimals: u8) -> Result<U256, String> {
    let amount = amount.trim();

    let (integer_part, decimal_part) = if let Some(dot_pos) = amount.find('.') {
        let int_str = &amount[..dot_pos];
        let dec_str = &amount[dot_pos + 1..];

        if !int_str.is_empty() && !int_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("Invalid integer part: '{}'", int_str));
        }
        if !dec_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("Invalid decimal part: '{}'", dec_str));
        }
        if int_str.is_empty() && dec_str.is_empty() {
            return Err(format!("Invalid amount: '{}'", amount));
        }

        (if int_str.is_empty() { "0" } else { int_str }, dec_str)
    } else {
        if amount.is_empty() || !amount.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("Invalid amount: '{}'. Must be a number.", amount));
        }
        (amount, "")
    };

    let decimals = decimals as usize;
    // Trailing zeros past the precision carry no value
    let decimal_part = if decimal_part.len() > decimals {
        decimal_part.trim_end_matches('0')
    } else {
        decimal_part
    };
    if decimal_part.len() > decimals {
        return Err(format!(
            "Amount '{}' has {} decimal places but only {} are supported",
            amount,
            decimal_part.len(),
            decimals
        ));
    }

    let raw = format!("{}{}{}", integer_part, decimal_part, "0".repeat(decimals - decimal_part.len()));
    U256::from_dec_str(&raw).map_err(|e| format!("Amount '{}' out of range: {}", amount, e))
}

pub fn from_base_units(raw: U256, decimals: u8) -> String {
    let raw = raw.to_string();
    let decimals = decimals as usize;

    if decimals == 0 {
        return raw;
    }

    if raw.len() <= decimals {
        let decimal_part = format!("{}{}", "0".repeat(decimals - raw.len()), raw);
        let trimmed = decimal_part.trim_end_matches('0');
        if trimmed.is_empty() {
            "0".to_string()
        } else {
            format!("0.{}", trimmed)
        }
    } else {
        let split_pos = raw.len() - decimals;
        let integer_part = &raw[..split_pos];
        let decimal_part = raw[split_pos..].trim_end_matches('0');
        if decimal_part.is_empty() {
            integer_part.to_string()
        } else {
            format!("{}.{}", integer_part, decimal_part)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_base_units() {
        assert_eq!(to_base_units("1", 18).unwrap(), U256::exp10(18));
        assert_eq!(to_base_units("1.5", 6).unwrap(), U256::from(1_500_000u64));
        assert_eq!(to_base_units(".25", 2).unwrap(), U256::from(25u64));
        assert_eq!(to_base_units("0.100", 1).unwrap(), U256::from(1u64));
    }

    #[test]
    fn test_to_base_units_rejects_bad_input() {
        assert!(to_base_units("1.234", 2).is_err());
        assert!(to_base_units("-1", 18).is_err());
        assert!(to_base_units("1e18", 0).is_err());
        assert!(to_base_units("", 6).is_err());
        assert!(to_base_units(".", 6).is_err());
    }

    #[test]
    fn test_from_base_units() {
        assert_eq!(from_base_units(U256::from(871_043_093u64), 6), "871.043093");
        assert_eq!(from_base_units(U256::exp10(18), 18), "1");
        assert_eq!(from_base_units(U256::from(5u64), 3), "0.005");
        assert_eq!(from_base_units(U256::zero(), 18), "0");
        assert_eq!(from_base_units(U256::from(42u64), 0), "42");
    }
}
