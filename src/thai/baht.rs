const DIGIT_WORDS: [&str; 10] = [
    "ศูนย์", "หนึ่ง", "สอง", "สาม", "สี่", "ห้า", "หก", "เจ็ด", "แปด", "เก้า",
];

// position words inside one six-digit group, units first
const POSITION_WORDS: [&str; 6] = ["", "สิบ", "ร้อย", "พัน", "หมื่น", "แสน"];

// Satang come from half-away-from-zero rounding to two decimals, same as
// the money formatter, so the words always match the printed figure.
pub fn baht_text(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let negative = cents < 0;
    let cents = cents.abs();
    let baht = cents / 100;
    let satang = cents % 100;

    let mut out = String::new();
    if negative {
        out.push_str("ลบ");
    }
    out.push_str(&read_integer(baht));
    out.push_str("บาท");
    if satang == 0 {
        out.push_str("ถ้วน");
    } else {
        out.push_str(&read_group(satang, false));
        out.push_str("สตางค์");
    }
    out
}

fn read_integer(value: i64) -> String {
    if value == 0 {
        return DIGIT_WORDS[0].to_string();
    }
    let mut groups = Vec::new();
    let mut rest = value;
    while rest > 0 {
        groups.push(rest % 1_000_000);
        rest /= 1_000_000;
    }
    groups.reverse();

    let mut out = String::new();
    for (i, group) in groups.iter().enumerate() {
        if *group > 0 {
            out.push_str(&read_group(*group, i > 0));
        }
        if i < groups.len() - 1 {
            out.push_str("ล้าน");
        }
    }
    out
}

// continues_larger: higher groups precede this one, which makes a lone
// trailing 1 read เอ็ด (1,000,001 ends ...ล้านเอ็ด).
fn read_group(value: i64, continues_larger: bool) -> String {
    let digits = value.to_string();
    let len = digits.len();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        let d = c.to_digit(10).unwrap_or(0) as usize;
        let pos = len - 1 - i;
        if d == 0 {
            continue;
        }
        match pos {
            0 => {
                if d == 1 && (value > 10 || continues_larger) {
                    out.push_str("เอ็ด");
                } else {
                    out.push_str(DIGIT_WORDS[d]);
                }
            }
            1 => {
                match d {
                    1 => {}
                    2 => out.push_str("ยี่"),
                    _ => out.push_str(DIGIT_WORDS[d]),
                }
                out.push_str(POSITION_WORDS[1]);
            }
            _ => {
                out.push_str(DIGIT_WORDS[d]);
                out.push_str(POSITION_WORDS[pos]);
            }
        }
    }
    out
}
