use rust_decimal::{Decimal, RoundingStrategy};

fn two_places(val: Decimal) -> String {
    let mut rounded = val.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.abs().to_string()
}

/// Rouble amount with space-grouped thousands and a decimal comma: 1 234,56
pub fn money(val: Decimal) -> String {
    let digits = two_places(val);
    let (int_part, dec_part) = digits.split_once('.').unwrap_or((&digits, "00"));

    let mut grouped = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(c);
    }
    let grouped: String = grouped.chars().rev().collect();

    if val.is_sign_negative() && !val.is_zero() {
        format!("-{grouped},{dec_part}")
    } else {
        format!("{grouped},{dec_part}")
    }
}

/// Two decimals with a decimal comma and no grouping, for spreadsheet export.
pub fn plain_amount(val: Decimal) -> String {
    let digits = two_places(val).replace('.', ",");
    if val.is_sign_negative() && !val.is_zero() {
        format!("-{digits}")
    } else {
        digits
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
