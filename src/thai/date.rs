use chrono::{Datelike, NaiveDate};

const THAI_MONTHS: [&str; 12] = [
    "มกราคม",
    "กุมภาพันธ์",
    "มีนาคม",
    "เมษายน",
    "พฤษภาคม",
    "มิถุนายน",
    "กรกฎาคม",
    "สิงหาคม",
    "กันยายน",
    "ตุลาคม",
    "พฤศจิกายน",
    "ธันวาคม",
];

// "2024-05-01" becomes "1 พฤษภาคม 2567"; empty or unparsable input yields
// an empty string.
pub fn thai_long_date(iso: &str) -> String {
    let trimmed = iso.trim();
    let date_part = trimmed.split('T').next().unwrap_or(trimmed);
    if date_part.is_empty() {
        return String::new();
    }
    match NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        Ok(date) => format!(
            "{} {} {}",
            date.day(),
            THAI_MONTHS[date.month0() as usize],
            date.year() + 543
        ),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_buddhist_era_long_form() {
        assert_eq!(thai_long_date("2024-05-01"), "1 พฤษภาคม 2567");
        assert_eq!(thai_long_date("1993-12-31"), "31 ธันวาคม 2536");
        assert_eq!(thai_long_date("2026-01-09"), "9 มกราคม 2569");
    }

    #[test]
    fn tolerates_surrounding_noise() {
        assert_eq!(thai_long_date("  2024-05-01  "), "1 พฤษภาคม 2567");
        assert_eq!(thai_long_date("2024-05-01T10:30:00"), "1 พฤษภาคม 2567");
    }

    #[test]
    fn invalid_input_yields_empty_string() {
        assert_eq!(thai_long_date(""), "");
        assert_eq!(thai_long_date("   "), "");
        assert_eq!(thai_long_date("not-a-date"), "");
        assert_eq!(thai_long_date("2024-02-30"), "");
        assert_eq!(thai_long_date("01/05/2024"), "");
    }
}
