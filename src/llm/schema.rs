//! Fixed prompt and structured-output schema for receipt classification.

use serde_json::{Value, json};

/// Schema name sent with `response_format`.
pub const SCHEMA_NAME: &str = "classification";

/// System instruction for the classifier.
pub fn system_prompt() -> &'static str {
    "You process emails forwarded to an expense inbox. Decide whether the email \
     and its attachments describe a completed purchase (a receipt or a paid invoice).\n\n\
     If it is NOT a receipt, set isReceipt to false and receipt to null.\n\n\
     If it IS a receipt, set isReceipt to true and fill receipt:\n\
     - dateYYYYMMDD: purchase date as eight digits, e.g. 20240131\n\
     - nameOfCompany: the merchant\n\
     - totalAmount: total paid as a plain decimal string without symbols, e.g. \"42.00\"\n\
     - currency: \"USD\" or \"JPY\"; use \"unknown\" for anything else or if unsure\n\
     - invoiceOrReceiptFullAttachmentFileName: the full filename of the attachment \
       that contains the receipt, or an empty string if the receipt is in the body\n\
     - category: one of Travel, Equipment, Services, SAAS\n\
     - lineItems: every purchased item with nameOfProduct, amount (decimal string, \
       unit price) and integer quantity\n\n\
     Only use information present in the email or attachments."
}

/// Strict JSON schema mirroring `ClassificationResponse`.
///
/// Strict mode requires every property to be listed in `required` and
/// `additionalProperties: false` on every object; optional values are
/// expressed as a union with `null`.
pub fn classification_schema() -> Value {
    let line_item = json!({
        "type": "object",
        "properties": {
            "nameOfProduct": {"type": "string"},
            "amount": {"type": "string"},
            "quantity": {"type": "integer"}
        },
        "required": ["nameOfProduct", "amount", "quantity"],
        "additionalProperties": false
    });

    let receipt = json!({
        "type": "object",
        "properties": {
            "dateYYYYMMDD": {"type": "string"},
            "nameOfCompany": {"type": "string"},
            "totalAmount": {"type": "string"},
            "currency": {"type": "string", "enum": ["USD", "JPY", "unknown"]},
            "invoiceOrReceiptFullAttachmentFileName": {"type": "string"},
            "category": {"type": "string", "enum": ["Travel", "Equipment", "Services", "SAAS"]},
            "lineItems": {"type": "array", "items": line_item}
        },
        "required": [
            "dateYYYYMMDD",
            "nameOfCompany",
            "totalAmount",
            "currency",
            "invoiceOrReceiptFullAttachmentFileName",
            "category",
            "lineItems"
        ],
        "additionalProperties": false
    });

    json!({
        "type": "object",
        "properties": {
            "isReceipt": {"type": "boolean"},
            "receipt": {"anyOf": [receipt, {"type": "null"}]}
        },
        "required": ["isReceipt", "receipt"],
        "additionalProperties": false
    })
}

/// `response_format` value for chat completions.
pub fn response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": SCHEMA_NAME,
            "strict": true,
            "schema": classification_schema()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every object in a strict schema must require all of its properties.
    fn assert_strict(node: &Value) {
        if let Some(props) = node.get("properties").and_then(Value::as_object) {
            let required: Vec<&str> = node["required"]
                .as_array()
                .unwrap()
                .iter()
                .filter_map(Value::as_str)
                .collect();
            for key in props.keys() {
                assert!(required.contains(&key.as_str()), "{key} not required");
            }
            assert_eq!(node["additionalProperties"], false);
            props.values().for_each(assert_strict);
        }
        if let Some(items) = node.get("items") {
            assert_strict(items);
        }
        if let Some(variants) = node.get("anyOf").and_then(Value::as_array) {
            variants.iter().for_each(assert_strict);
        }
    }

    #[test]
    fn schema_is_strict_throughout() {
        assert_strict(&classification_schema());
    }

    #[test]
    fn schema_enumerates_currency_and_category() {
        let schema = classification_schema();
        let receipt = &schema["properties"]["receipt"]["anyOf"][0];
        assert_eq!(
            receipt["properties"]["currency"]["enum"],
            json!(["USD", "JPY", "unknown"])
        );
        assert_eq!(
            receipt["properties"]["category"]["enum"],
            json!(["Travel", "Equipment", "Services", "SAAS"])
        );
    }

    #[test]
    fn response_format_wraps_schema() {
        let format = response_format();
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["name"], SCHEMA_NAME);
        assert_eq!(format["json_schema"]["strict"], true);
    }

    #[test]
    fn prompt_mentions_every_field() {
        let prompt = system_prompt();
        for field in [
            "isReceipt",
            "dateYYYYMMDD",
            "nameOfCompany",
            "totalAmount",
            "invoiceOrReceiptFullAttachmentFileName",
            "lineItems",
        ] {
            assert!(prompt.contains(field), "prompt missing {field}");
        }
    }
}
