use std::collections::BTreeMap;

use crate::payload::{BudgetSource, GeneratePayload, NumberOrText};
use crate::thai::{baht_text, format_money, thai_long_date, vat_breakdown, VatMode};

/// The computed field set the merge engine consumes: flat string fields
/// plus named row lists for repeated sections.
#[derive(Clone, Debug, Default)]
pub struct TemplateData {
    pub fields: BTreeMap<String, String>,
    pub lists: BTreeMap<String, Vec<BTreeMap<String, String>>>,
}

impl TemplateData {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn list(&self, key: &str) -> Option<&[BTreeMap<String, String>]> {
        self.lists.get(key).map(Vec::as_slice)
    }

    fn set(&mut self, key: &str, value: impl Into<String>) {
        self.fields.insert(key.to_string(), value.into());
    }
}

// First present, non-empty source wins; values come back trimmed.
pub fn first_non_empty(sources: &[Option<&str>]) -> String {
    sources
        .iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_default()
}

// Every canonical key is always present; absent inputs become empty
// strings, never missing fields.
pub fn build_template_data(payload: &GeneratePayload) -> TemplateData {
    let mut data = TemplateData::default();
    let mode = VatMode::parse(payload.vat_mode.as_deref());
    let rate = payload.vat_rate.unwrap_or(7.0);

    let department = first_non_empty(&[payload.department.as_deref()]);
    data.set("department.assistant_head", assistant_head_label(&department));
    data.set("department", department);
    data.set("subject", first_non_empty(&[payload.subject.as_deref()]));
    data.set("purpose", first_non_empty(&[payload.purpose.as_deref()]));
    data.set("doc_number", first_non_empty(&[payload.doc_number.as_deref()]));

    let request_date = first_non_empty(&[payload.request_date.as_deref()]);
    data.set("request.date_text", thai_long_date(&request_date));
    data.set("request.date", request_date);

    // Nested vendor object wins over the legacy flat fields.
    let vendor = payload.vendor.clone().unwrap_or_default();
    data.set(
        "vendor.name",
        first_non_empty(&[vendor.name.as_deref(), payload.vendor_name.as_deref()]),
    );
    data.set(
        "vendor.tax_id",
        first_non_empty(&[vendor.tax_id.as_deref(), payload.vendor_tax_id.as_deref()]),
    );
    data.set(
        "vendor.address",
        first_non_empty(&[vendor.address.as_deref(), payload.vendor_address.as_deref()]),
    );

    let receipt = payload.receipt.clone().unwrap_or_default();
    data.set("receipt.number", first_non_empty(&[receipt.number.as_deref()]));
    let receipt_date = first_non_empty(&[receipt.date.as_deref()]);
    data.set("receipt.date_text", thai_long_date(&receipt_date));
    data.set("receipt.date", receipt_date);

    data.set("budget.doc_text", budget_doc_text(payload.budget.as_ref()));

    let mut rows = Vec::with_capacity(payload.items.len());
    let mut subtotal = 0.0;
    let mut grand_total = 0.0;
    let mut subtotal_net = 0.0;
    for (i, item) in payload.items.iter().enumerate() {
        let qty = amount_of(&item.quantity);
        let price = amount_of(&item.price);
        // Unrounded line amount; rounding only happens when formatting.
        let raw = qty * price;
        let b = vat_breakdown(raw, mode, rate);
        subtotal += raw;
        grand_total += b.total;
        subtotal_net += b.base;

        let mut row = BTreeMap::new();
        row.insert("no".to_string(), (i + 1).to_string());
        row.insert("name".to_string(), first_non_empty(&[item.name.as_deref()]));
        row.insert("qty".to_string(), format_number(qty));
        row.insert("unit".to_string(), first_non_empty(&[item.unit.as_deref()]));
        row.insert("price".to_string(), format_money(price));
        row.insert("total".to_string(), format_money(b.total));
        row.insert("net".to_string(), format_money(b.base));
        row.insert("spec".to_string(), first_non_empty(&[item.spec.as_deref()]));
        rows.push(row);
    }
    data.lists.insert("items".to_string(), rows);

    // grand_total is the sum of per-item totals in the active mode; the
    // VAT figure is the grand/net difference so the three always agree.
    let vat_amount = grand_total - subtotal_net;
    data.set("vat.mode", mode.as_str());
    data.set("vat.rate", format_number(rate));
    data.set("subtotal", format_money(subtotal));
    data.set("subtotal_net", format_money(subtotal_net));
    data.set("vat_amount", format_money(vat_amount));
    data.set("grand_total", format_money(grand_total));
    data.set("grand_total_text", baht_text(grand_total));

    data
}

fn amount_of(value: &Option<NumberOrText>) -> f64 {
    value.as_ref().map(NumberOrText::as_amount).unwrap_or(0.0)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

// ผช.หน. = assistant head of department; already-prefixed labels pass
// through unchanged.
pub fn assistant_head_label(department: &str) -> String {
    let label = department.trim();
    if label.is_empty() {
        return String::new();
    }
    if label.starts_with("ผช.หน.") {
        return label.to_string();
    }
    if label.starts_with("หน.") {
        return format!("ผช.{label}");
    }
    format!("ผช.หน.{label}")
}

// Each routing kind has a minimum field set; anything less yields empty
// text rather than a partial sentence.
pub fn budget_doc_text(budget: Option<&BudgetSource>) -> String {
    match budget {
        None => String::new(),
        Some(BudgetSource::Operating {
            org,
            cost_center,
            year,
        }) => {
            let org = first_non_empty(&[org.as_deref()]);
            if org.is_empty() {
                return String::new();
            }
            // Cost center falls back to the org label.
            let cost_center = first_non_empty(&[cost_center.as_deref(), Some(&org)]);
            let year = first_non_empty(&[year.as_deref()]);
            if year.is_empty() {
                format!("เบิกจ่ายจากเงินงบดำเนินงานของ {org} ศูนย์ต้นทุน {cost_center}")
            } else {
                format!(
                    "เบิกจ่ายจากเงินงบดำเนินงานของ {org} ศูนย์ต้นทุน {cost_center} ประจำปีงบประมาณ {year}"
                )
            }
        }
        Some(BudgetSource::PurchaseOrder { po_number, po_date }) => {
            let number = first_non_empty(&[po_number.as_deref()]);
            let date = first_non_empty(&[po_date.as_deref()]);
            if number.is_empty() || date.is_empty() {
                return String::new();
            }
            let date_text = thai_long_date(&date);
            let shown = if date_text.is_empty() { date } else { date_text };
            format!("เบิกจ่ายตามใบสั่งซื้อเลขที่ {number} ลงวันที่ {shown}")
        }
        Some(BudgetSource::NetworkProject {
            project_name,
            project_code,
            contract_number,
        }) => {
            let name = first_non_empty(&[project_name.as_deref()]);
            let code = first_non_empty(&[project_code.as_deref()]);
            if name.is_empty() || code.is_empty() {
                return String::new();
            }
            let contract = first_non_empty(&[contract_number.as_deref()]);
            if contract.is_empty() {
                format!("เบิกจ่ายจากโครงการ {name} รหัสโครงการ {code}")
            } else {
                format!("เบิกจ่ายจากโครงการ {name} รหัสโครงการ {code} ตามสัญญาเลขที่ {contract}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::parse_payload;
    use serde_json::json;

    fn build(value: serde_json::Value) -> TemplateData {
        build_template_data(&parse_payload(&value).unwrap())
    }

    #[test]
    fn included_mode_keeps_totals_and_backs_out_vat() {
        let data = build(json!({
            "vat_mode": "included",
            "vat_rate": 7,
            "items": [
                { "name": "ก", "quantity": 2, "price": 100 },
                { "name": "ข", "quantity": 3, "price": 200 }
            ]
        }));
        assert_eq!(data.field("grand_total"), Some("800.00"));
        assert_eq!(data.field("subtotal"), Some("800.00"));
        assert_eq!(data.field("vat_amount"), Some("52.34"));
        assert_eq!(data.field("subtotal_net"), Some("747.66"));
        assert_eq!(data.field("grand_total_text"), Some("แปดร้อยบาทถ้วน"));
        let rows = data.list("items").unwrap();
        assert_eq!(rows[0]["total"], "200.00");
        assert_eq!(rows[0]["net"], "186.92");
        assert_eq!(rows[1]["net"], "560.75");
    }

    #[test]
    fn excluded_mode_grand_total_is_exact() {
        let data = build(json!({
            "vat_mode": "excluded",
            "items": [{ "quantity": 1, "price": 100 }]
        }));
        assert_eq!(data.field("grand_total"), Some("107.00"));
        assert_eq!(data.field("vat_amount"), Some("7.00"));
        assert_eq!(data.field("subtotal"), Some("100.00"));
        assert_eq!(data.field("subtotal_net"), Some("100.00"));
        let rows = data.list("items").unwrap();
        assert_eq!(rows[0]["total"], "107.00");
        assert_eq!(rows[0]["net"], "100.00");
    }

    #[test]
    fn none_and_unrecognized_modes_have_zero_vat() {
        for mode in [json!("none"), json!("weird"), json!(null)] {
            let data = build(json!({
                "vat_mode": mode,
                "items": [
                    { "quantity": 2, "price": 99.99 },
                    { "quantity": 1, "price": 1234.56 }
                ]
            }));
            assert_eq!(data.field("vat_amount"), Some("0.00"));
            assert_eq!(data.field("vat.mode"), Some("none"));
            assert_eq!(data.field("grand_total"), data.field("subtotal"));
        }
    }

    #[test]
    fn item_rows_are_numbered_and_leniently_parsed() {
        let data = build(json!({
            "items": [
                { "name": "กระดาษ A4", "quantity": "2", "unit": "รีม", "price": "1,000" },
                { "name": "หมึก", "quantity": "ไม่ทราบ", "price": 500 }
            ]
        }));
        let rows = data.list("items").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["no"], "1");
        assert_eq!(rows[0]["qty"], "2");
        assert_eq!(rows[0]["total"], "2,000.00");
        assert_eq!(rows[1]["no"], "2");
        assert_eq!(rows[1]["qty"], "0");
        assert_eq!(rows[1]["total"], "0.00");
        assert_eq!(rows[1]["spec"], "");
    }

    #[test]
    fn vendor_resolution_prefers_the_nested_object() {
        let data = build(json!({
            "vendor": { "name": "บริษัท ใหม่ จำกัด" },
            "vendor_name": "ห้างเก่า",
            "vendor_tax_id": "0105536000000"
        }));
        assert_eq!(data.field("vendor.name"), Some("บริษัท ใหม่ จำกัด"));
        assert_eq!(data.field("vendor.tax_id"), Some("0105536000000"));
        assert_eq!(data.field("vendor.address"), Some(""));
    }

    #[test]
    fn blank_nested_vendor_falls_back_to_legacy_fields() {
        let data = build(json!({
            "vendor": { "name": "  " },
            "vendor_name": "ห้างเก่า"
        }));
        assert_eq!(data.field("vendor.name"), Some("ห้างเก่า"));
    }

    #[test]
    fn dates_gain_buddhist_era_text_fields() {
        let data = build(json!({
            "request_date": "2024-05-01",
            "receipt": { "number": "RC-001", "date": "ไม่ใช่วันที่" }
        }));
        assert_eq!(data.field("request.date"), Some("2024-05-01"));
        assert_eq!(data.field("request.date_text"), Some("1 พฤษภาคม 2567"));
        assert_eq!(data.field("receipt.number"), Some("RC-001"));
        assert_eq!(data.field("receipt.date_text"), Some(""));
    }

    #[test]
    fn operating_budget_requires_the_org_label() {
        let empty = build(json!({ "budget": { "kind": "operating" } }));
        assert_eq!(empty.field("budget.doc_text"), Some(""));

        let data = build(json!({
            "budget": { "kind": "operating", "org": "กองคลัง" }
        }));
        let text = data.field("budget.doc_text").unwrap();
        assert!(!text.is_empty());
        assert!(text.contains("กองคลัง"));
        assert!(text.contains("ศูนย์ต้นทุน"));
    }

    #[test]
    fn operating_budget_keeps_an_explicit_cost_center() {
        let data = build(json!({
            "budget": {
                "kind": "operating",
                "org": "กองคลัง",
                "cost_center": "CC-1234",
                "year": "2567"
            }
        }));
        let text = data.field("budget.doc_text").unwrap();
        assert!(text.contains("กองคลัง"));
        assert!(text.contains("CC-1234"));
        assert!(text.contains("2567"));
    }

    #[test]
    fn purchase_order_budget_needs_number_and_date() {
        let partial = build(json!({
            "budget": { "kind": "purchase_order", "po_number": "PO-66-0042" }
        }));
        assert_eq!(partial.field("budget.doc_text"), Some(""));

        let data = build(json!({
            "budget": {
                "kind": "purchase_order",
                "po_number": "PO-66-0042",
                "po_date": "2024-05-01"
            }
        }));
        let text = data.field("budget.doc_text").unwrap();
        assert!(text.contains("PO-66-0042"));
        assert!(text.contains("1 พฤษภาคม 2567"));
    }

    #[test]
    fn network_project_budget_needs_name_and_code() {
        let partial = build(json!({
            "budget": { "kind": "network_project", "project_name": "เครือข่ายสุขภาพ" }
        }));
        assert_eq!(partial.field("budget.doc_text"), Some(""));

        let data = build(json!({
            "budget": {
                "kind": "network_project",
                "project_name": "เครือข่ายสุขภาพ",
                "project_code": "NP-12",
                "contract_number": "สธ 42/2567"
            }
        }));
        let text = data.field("budget.doc_text").unwrap();
        assert!(text.contains("เครือข่ายสุขภาพ"));
        assert!(text.contains("NP-12"));
        assert!(text.contains("สธ 42/2567"));
    }

    #[test]
    fn assistant_head_label_prefix_rules() {
        assert_eq!(assistant_head_label(""), "");
        assert_eq!(assistant_head_label("  "), "");
        assert_eq!(assistant_head_label("กองคลัง"), "ผช.หน.กองคลัง");
        assert_eq!(assistant_head_label("หน.กองคลัง"), "ผช.หน.กองคลัง");
        assert_eq!(assistant_head_label("ผช.หน.กองคลัง"), "ผช.หน.กองคลัง");
    }

    #[test]
    fn every_canonical_field_is_always_present() {
        let data = build(json!({}));
        for key in [
            "department",
            "department.assistant_head",
            "subject",
            "purpose",
            "doc_number",
            "request.date",
            "request.date_text",
            "vendor.name",
            "vendor.tax_id",
            "vendor.address",
            "receipt.number",
            "receipt.date",
            "receipt.date_text",
            "budget.doc_text",
            "vat.mode",
            "vat.rate",
            "subtotal",
            "subtotal_net",
            "vat_amount",
            "grand_total",
            "grand_total_text",
        ] {
            assert!(data.field(key).is_some(), "missing field {key}");
        }
        assert_eq!(data.field("vat.rate"), Some("7"));
        assert_eq!(data.field("grand_total"), Some("0.00"));
        assert_eq!(data.field("grand_total_text"), Some("ศูนย์บาทถ้วน"));
        assert_eq!(data.list("items").unwrap().len(), 0);
    }
}
