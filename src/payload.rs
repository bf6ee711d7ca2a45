use serde::Deserialize;
use serde_json::Value;

use crate::error::TemplateError;
use crate::thai::parse_amount;

// Some clients post quantities and prices as free text, others as numbers.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(f64),
    Text(String),
}

impl NumberOrText {
    pub fn as_amount(&self) -> f64 {
        match self {
            NumberOrText::Number(n) => *n,
            NumberOrText::Text(s) => parse_amount(s),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct VendorInfo {
    pub name: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReceiptInfo {
    pub number: Option<String>,
    pub date: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct LineItemInput {
    pub name: Option<String>,
    pub quantity: Option<NumberOrText>,
    pub unit: Option<String>,
    pub price: Option<NumberOrText>,
    pub spec: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BudgetSource {
    Operating {
        org: Option<String>,
        cost_center: Option<String>,
        year: Option<String>,
    },
    PurchaseOrder {
        po_number: Option<String>,
        po_date: Option<String>,
    },
    NetworkProject {
        project_name: Option<String>,
        project_code: Option<String>,
        contract_number: Option<String>,
    },
}

// Every field is optional. Legacy clients send vendor identity as flat
// top-level fields, newer ones as a nested object; the builder resolves
// both.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct GeneratePayload {
    pub department: Option<String>,
    pub subject: Option<String>,
    pub purpose: Option<String>,
    pub doc_number: Option<String>,
    pub request_date: Option<String>,
    pub vendor: Option<VendorInfo>,
    pub vendor_name: Option<String>,
    pub vendor_tax_id: Option<String>,
    pub vendor_address: Option<String>,
    pub receipt: Option<ReceiptInfo>,
    pub vat_mode: Option<String>,
    pub vat_rate: Option<f64>,
    pub items: Vec<LineItemInput>,
    pub budget: Option<BudgetSource>,
}

// Structural problems fail (not an object, items not a list, a malformed
// budget union); missing fields never do.
pub fn parse_payload(value: &Value) -> Result<GeneratePayload, TemplateError> {
    if !value.is_object() {
        return Err(TemplateError::MalformedPayload(
            "payload must be a JSON object".to_string(),
        ));
    }
    if let Some(items) = value.get("items") {
        if !items.is_array() {
            return Err(TemplateError::MalformedPayload(
                "\"items\" must be a list".to_string(),
            ));
        }
    }
    serde_json::from_value(value.clone())
        .map_err(|e| TemplateError::MalformedPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_full_record() {
        let payload = parse_payload(&json!({
            "department": "งานพัสดุ",
            "subject": "ขออนุมัติจัดซื้อ",
            "vendor": { "name": "บริษัท ก", "tax_id": "0105536000000" },
            "vat_mode": "included",
            "vat_rate": 7,
            "items": [
                { "name": "กระดาษ A4", "quantity": "2", "unit": "รีม", "price": 100 },
                { "name": "หมึกพิมพ์", "quantity": 3, "price": "1,200.50" }
            ],
            "budget": { "kind": "operating", "org": "กองคลัง" }
        }))
        .unwrap();
        assert_eq!(payload.department.as_deref(), Some("งานพัสดุ"));
        assert_eq!(payload.items.len(), 2);
        let qty = payload.items[0].quantity.as_ref().unwrap().as_amount();
        assert_eq!(qty, 2.0);
        let price = payload.items[1].price.as_ref().unwrap().as_amount();
        assert_eq!(price, 1200.5);
        assert!(matches!(payload.budget, Some(BudgetSource::Operating { .. })));
    }

    #[test]
    fn empty_object_is_a_valid_payload() {
        let payload = parse_payload(&json!({})).unwrap();
        assert!(payload.items.is_empty());
        assert!(payload.vendor.is_none());
        assert!(payload.vat_rate.is_none());
    }

    #[test]
    fn rejects_non_object_payloads() {
        for bad in [json!([1, 2]), json!("text"), json!(42), json!(null)] {
            let err = parse_payload(&bad).unwrap_err();
            assert!(matches!(err, TemplateError::MalformedPayload(_)));
        }
    }

    #[test]
    fn rejects_items_that_are_not_a_list() {
        let err = parse_payload(&json!({ "items": { "name": "x" } })).unwrap_err();
        match err {
            TemplateError::MalformedPayload(msg) => assert!(msg.contains("items")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn budget_union_is_tag_discriminated() {
        let payload = parse_payload(&json!({
            "budget": { "kind": "purchase_order", "po_number": "PO-66-0042", "po_date": "2024-05-01" }
        }))
        .unwrap();
        match payload.budget {
            Some(BudgetSource::PurchaseOrder { po_number, po_date }) => {
                assert_eq!(po_number.as_deref(), Some("PO-66-0042"));
                assert_eq!(po_date.as_deref(), Some("2024-05-01"));
            }
            other => panic!("unexpected budget: {other:?}"),
        }
        let err = parse_payload(&json!({ "budget": { "kind": "mystery" } })).unwrap_err();
        assert!(matches!(err, TemplateError::MalformedPayload(_)));
    }

    #[test]
    fn ignores_unknown_fields() {
        let payload = parse_payload(&json!({
            "subject": "x",
            "session_token": "not ours",
            "ui_state": { "tab": 2 }
        }))
        .unwrap();
        assert_eq!(payload.subject.as_deref(), Some("x"));
    }
}
