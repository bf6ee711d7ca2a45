use once_cell::sync::Lazy;
use regex::Regex;

static AMOUNT_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,\s฿]").expect("amount noise"));

// Strips grouping commas, whitespace and the baht sign; anything still
// unparsable counts as zero.
pub fn parse_amount(raw: &str) -> f64 {
    let cleaned = AMOUNT_NOISE.replace_all(raw.trim(), "");
    cleaned.parse::<f64>().unwrap_or(0.0)
}

// Two decimals, half-away-from-zero. Rounding happens here and only here;
// upstream sums stay unrounded.
pub fn format_money(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!("{sign}{}.{:02}", group_thousands(cents / 100), cents % 100)
}

fn group_thousands(value: i64) -> String {
    let digits = value.to_string();
    let bytes = digits.as_bytes();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 && (bytes.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(*b as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_two_decimals_with_grouping() {
        assert_eq!(format_money(1234.5), "1,234.50");
        assert_eq!(format_money(107.0), "107.00");
        assert_eq!(format_money(1_000_000.0), "1,000,000.00");
        assert_eq!(format_money(0.0), "0.00");
    }

    #[test]
    fn rounds_half_away_from_zero_at_the_boundary() {
        assert_eq!(format_money(0.005), "0.01");
        assert_eq!(format_money(52.336448), "52.34");
        assert_eq!(format_money(747.663551), "747.66");
    }

    #[test]
    fn keeps_the_sign_outside_the_grouping() {
        assert_eq!(format_money(-1234.567), "-1,234.57");
        assert_eq!(format_money(-0.005), "-0.01");
        assert_eq!(format_money(-0.004), "0.00");
    }

    #[test]
    fn parse_tolerates_grouping_and_noise() {
        assert_eq!(parse_amount("1,234.50"), 1234.5);
        assert_eq!(parse_amount("  980 "), 980.0);
        assert_eq!(parse_amount("฿1,000"), 1000.0);
        assert_eq!(parse_amount("-50"), -50.0);
    }

    #[test]
    fn parse_treats_garbage_as_zero() {
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_amount("   "), 0.0);
        assert_eq!(parse_amount("สองร้อย"), 0.0);
    }
}
