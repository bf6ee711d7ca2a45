use serde::{Deserialize, Serialize};

// Absent or unrecognized mode strings resolve to None.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VatMode {
    Included,
    Excluded,
    None,
}

impl VatMode {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("included") => VatMode::Included,
            Some("excluded") => VatMode::Excluded,
            _ => VatMode::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VatMode::Included => "included",
            VatMode::Excluded => "excluded",
            VatMode::None => "none",
        }
    }
}

// base is always the VAT-excluded figure.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VatBreakdown {
    pub base: f64,
    pub vat: f64,
    pub total: f64,
}

// amount is VAT-inclusive for Included, net for Excluded and None. Never
// rounds; callers format at the boundary.
pub fn vat_breakdown(amount: f64, mode: VatMode, rate: f64) -> VatBreakdown {
    match mode {
        VatMode::Included => {
            let base = amount / (1.0 + rate / 100.0);
            VatBreakdown {
                base,
                vat: amount - base,
                total: amount,
            }
        }
        VatMode::Excluded => {
            let vat = amount * rate / 100.0;
            VatBreakdown {
                base: amount,
                vat,
                total: amount + vat,
            }
        }
        VatMode::None => VatBreakdown {
            base: amount,
            vat: 0.0,
            total: amount,
        },
    }
}
