//! Turns untyped JSON payloads into typed drafts.
//!
//! Messages keep the wording existing clients match on, e.g.
//! `This field is required.`. Foreign keys are checked against the store
//! with read-only lookups; nothing here writes.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde_json::{Map, Value as Json};

use crate::{
    error::{ApiError, FieldErrors},
    models::{Draft, EntitySchema, Field, FieldType, Record, Value, STATUS_CHOICES},
    store::Store,
};

const EMAIL_MAX_LEN: usize = 254;

const REQUIRED: &str = "This field is required.";
const NOT_NULL: &str = "This field may not be null.";
const NOT_BLANK: &str = "This field may not be blank.";
const INVALID_STRING: &str = "Not a valid string.";
const INVALID_EMAIL: &str = "Enter a valid email address.";
const INVALID_INTEGER: &str = "A valid integer is required.";
const INVALID_NUMBER: &str = "A valid number is required.";
const INVALID_DATE: &str = "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.";

/// Parse a request body into a JSON object. An empty body counts as `{}`.
pub fn parse_payload(body: &[u8]) -> Result<Map<String, Json>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Json>(body) {
        Ok(Json::Object(map)) => Ok(map),
        Ok(other) => Err(ApiError::field(
            "non_field_errors",
            format!(
                "Invalid data. Expected a dictionary, but got {}.",
                json_type_name(&other)
            ),
        )),
        Err(err) => Err(ApiError::field("detail", format!("JSON parse error - {}", err))),
    }
}

/// Validate `payload` against `schema`.
///
/// With `existing` set this is an update: required fields must still be
/// supplied, omitted optional fields keep the stored value. Without it,
/// omitted optional fields take their default or null.
pub async fn validate(
    schema: &EntitySchema,
    payload: &Map<String, Json>,
    existing: Option<&Record>,
    store: &dyn Store,
) -> Result<Draft, ApiError> {
    let mut errors = FieldErrors::new();
    let mut draft = Draft {
        kind: schema.kind,
        values: Default::default(),
    };
    let mut references = Vec::new();

    for field in schema.fields {
        let result = match payload.get(field.name) {
            None if field.is_required() => Err(REQUIRED.to_string()),
            None => match (existing, field.default) {
                (Some(record), _) => Ok(record.get(field.name).clone()),
                (None, Some(default)) => coerce(field, &Json::String(default.to_string())),
                (None, None) => Ok(Value::Null),
            },
            Some(Json::Null) if field.nullable => Ok(Value::Null),
            Some(Json::Null) => Err(NOT_NULL.to_string()),
            Some(raw) => coerce(field, raw),
        };

        match result {
            Ok(value) => {
                if let (FieldType::ForeignKey(target), Some(id), true) =
                    (field.ty, value.as_int(), payload.contains_key(field.name))
                {
                    references.push((field.name, target, id));
                }
                draft.values.insert(field.name, value);
            }
            Err(message) => {
                errors.insert(field.name.to_string(), vec![message]);
            }
        }
    }

    for (name, target, id) in references {
        if !store.exists(target, id).await? {
            errors.insert(
                name.to_string(),
                vec![format!("Invalid pk \"{}\" - object does not exist.", id)],
            );
        }
    }

    if errors.is_empty() {
        Ok(draft)
    } else {
        Err(ApiError::Validation(errors))
    }
}

fn coerce(field: &Field, raw: &Json) -> Result<Value, String> {
    match field.ty {
        FieldType::Text { max_len } => coerce_text(field, raw, max_len),
        FieldType::Email => {
            let value = coerce_text(field, raw, Some(EMAIL_MAX_LEN))?;
            match &value {
                Value::Text(s) if !s.is_empty() && !validator::validate_email(s.as_str()) => {
                    Err(INVALID_EMAIL.to_string())
                }
                _ => Ok(value),
            }
        }
        FieldType::Status => {
            let choice = match raw {
                Json::String(s) => s.clone(),
                other => other.to_string(),
            };
            if STATUS_CHOICES.contains(&choice.as_str()) {
                Ok(Value::Text(choice))
            } else {
                Err(format!("\"{}\" is not a valid choice.", choice))
            }
        }
        FieldType::Integer => coerce_integer(field, raw),
        FieldType::Decimal {
            max_digits,
            decimal_places,
        } => coerce_decimal(field, raw, max_digits, decimal_places),
        FieldType::Date => coerce_date(field, raw),
        FieldType::ForeignKey(_) => coerce_pk(raw),
    }
}

fn coerce_text(field: &Field, raw: &Json, max_len: Option<usize>) -> Result<Value, String> {
    let text = match raw {
        Json::String(s) => s.trim().to_string(),
        Json::Number(n) => n.to_string(),
        _ => return Err(INVALID_STRING.to_string()),
    };
    if text.is_empty() && !field.nullable {
        return Err(NOT_BLANK.to_string());
    }
    if let Some(max) = max_len {
        if text.chars().count() > max {
            return Err(format!(
                "Ensure this field has no more than {} characters.",
                max
            ));
        }
    }
    Ok(Value::Text(text))
}

/// `""` on a nullable non-text field means "no value".
fn is_blank(field: &Field, raw: &Json) -> bool {
    field.nullable && matches!(raw, Json::String(s) if s.trim().is_empty())
}

fn coerce_integer(field: &Field, raw: &Json) -> Result<Value, String> {
    if is_blank(field, raw) {
        return Ok(Value::Null);
    }
    let parsed = match raw {
        Json::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Json::String(s) => {
            let s = s.trim();
            let s = s
                .split_once('.')
                .filter(|(_, frac)| frac.chars().all(|c| c == '0'))
                .map_or(s, |(whole, _)| whole);
            s.parse::<i64>().ok()
        }
        _ => None,
    };
    let value = parsed.ok_or_else(|| INVALID_INTEGER.to_string())?;
    if value > i64::from(i32::MAX) {
        return Err(format!(
            "Ensure this value is less than or equal to {}.",
            i32::MAX
        ));
    }
    if value < i64::from(i32::MIN) {
        return Err(format!(
            "Ensure this value is greater than or equal to {}.",
            i32::MIN
        ));
    }
    Ok(Value::Int(value))
}

fn coerce_decimal(
    field: &Field,
    raw: &Json,
    max_digits: u64,
    decimal_places: i64,
) -> Result<Value, String> {
    if is_blank(field, raw) {
        return Ok(Value::Null);
    }
    let text = match raw {
        Json::Number(n) => n.to_string(),
        Json::String(s) => s.trim().to_string(),
        _ => return Err(INVALID_NUMBER.to_string()),
    };
    let value = BigDecimal::from_str(&text).map_err(|_| INVALID_NUMBER.to_string())?;

    let (digits, scale) = value.as_bigint_and_exponent();
    let digit_count = digits.magnitude().to_string().len() as u64;
    let (total, decimals) = if scale <= 0 {
        (digit_count + scale.unsigned_abs(), 0)
    } else if digit_count > scale as u64 {
        (digit_count, scale as u64)
    } else {
        (scale as u64, scale as u64)
    };
    let whole = total - decimals;
    let max_whole = max_digits - decimal_places as u64;

    if total > max_digits {
        return Err(format!(
            "Ensure that there are no more than {} digits in total.",
            max_digits
        ));
    }
    if decimals > decimal_places as u64 {
        return Err(format!(
            "Ensure that there are no more than {} decimal places.",
            decimal_places
        ));
    }
    if whole > max_whole {
        return Err(format!(
            "Ensure that there are no more than {} digits before the decimal point.",
            max_whole
        ));
    }
    Ok(Value::Decimal(value.with_scale(decimal_places)))
}

fn coerce_date(field: &Field, raw: &Json) -> Result<Value, String> {
    if is_blank(field, raw) {
        return Ok(Value::Null);
    }
    match raw {
        Json::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|_| INVALID_DATE.to_string()),
        _ => Err(INVALID_DATE.to_string()),
    }
}

fn coerce_pk(raw: &Json) -> Result<Value, String> {
    let id = match raw {
        Json::Number(n) => n.as_i64(),
        Json::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    id.map(Value::Int).ok_or_else(|| {
        format!(
            "Incorrect type. Expected pk value, received {}.",
            python_type_name(raw)
        )
    })
}

fn json_type_name(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "str",
        Json::Array(_) => "list",
        Json::Object(_) => "dict",
    }
}

fn python_type_name(value: &Json) -> &'static str {
    match value {
        Json::Number(n) if n.is_f64() => "float",
        Json::Number(_) => "int",
        other => json_type_name(other),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        models::{COMPANY, FINANCIAL_YEAR, TAX, TRANSACTION},
        store::MemoryStore,
    };

    fn object(value: Json) -> Map<String, Json> {
        match value {
            Json::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn field_errors(result: Result<Draft, ApiError>) -> FieldErrors {
        match result {
            Err(ApiError::Validation(errors)) => errors,
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    async fn seeded_company(store: &MemoryStore) -> Record {
        let draft = validate(
            &COMPANY,
            &object(json!({"name": "Acme", "phone": "1234567890"})),
            None,
            store,
        )
        .await
        .unwrap();
        store.create(draft).await.unwrap()
    }

    #[tokio::test]
    async fn create_applies_defaults_and_nulls() {
        let store = MemoryStore::new();
        let draft = validate(
            &COMPANY,
            &object(json!({"name": "  Acme ", "phone": 1234567890})),
            None,
            &store,
        )
        .await
        .unwrap();

        assert_eq!(draft.values["name"], Value::Text("Acme".into()));
        assert_eq!(draft.values["phone"], Value::Text("1234567890".into()));
        assert_eq!(draft.values["status"], Value::Text("active".into()));
        assert_eq!(draft.values["email"], Value::Null);
    }

    #[tokio::test]
    async fn missing_and_invalid_fields_are_reported_per_field() {
        let store = MemoryStore::new();
        let errors = field_errors(
            validate(
                &COMPANY,
                &object(json!({"phone": null, "email": "nope", "status": "closed"})),
                None,
                &store,
            )
            .await,
        );

        assert_eq!(errors["name"], vec![REQUIRED.to_string()]);
        assert_eq!(errors["phone"], vec![NOT_NULL.to_string()]);
        assert_eq!(errors["email"], vec![INVALID_EMAIL.to_string()]);
        assert_eq!(
            errors["status"],
            vec!["\"closed\" is not a valid choice.".to_string()]
        );
    }

    #[tokio::test]
    async fn text_length_and_blank_rules() {
        let store = MemoryStore::new();
        let errors = field_errors(
            validate(
                &COMPANY,
                &object(json!({"name": "", "phone": "1234567890123456"})),
                None,
                &store,
            )
            .await,
        );
        assert_eq!(errors["name"], vec![NOT_BLANK.to_string()]);
        assert_eq!(
            errors["phone"],
            vec!["Ensure this field has no more than 15 characters.".to_string()]
        );
    }

    #[tokio::test]
    async fn decimals_respect_precision() {
        let store = MemoryStore::new();
        let draft = validate(&TAX, &object(json!({"tax_percentage": "18.5"})), None, &store)
            .await
            .unwrap();
        assert_eq!(
            draft.values["tax_percentage"],
            Value::Decimal(BigDecimal::from_str("18.50").unwrap())
        );
        assert_eq!(
            draft.values["default_tax"],
            Value::Decimal(BigDecimal::from_str("5.00").unwrap())
        );

        let errors = field_errors(
            validate(
                &TAX,
                &object(json!({"tax_percentage": 1.234, "default_tax": "1000"})),
                None,
                &store,
            )
            .await,
        );
        assert_eq!(
            errors["tax_percentage"],
            vec!["Ensure that there are no more than 2 decimal places.".to_string()]
        );
        assert_eq!(
            errors["default_tax"],
            vec!["Ensure that there are no more than 3 digits before the decimal point.".to_string()]
        );

        let errors = field_errors(
            validate(&TAX, &object(json!({"tax_percentage": "abc"})), None, &store).await,
        );
        assert_eq!(errors["tax_percentage"], vec![INVALID_NUMBER.to_string()]);
    }

    #[tokio::test]
    async fn foreign_keys_must_resolve() {
        let store = MemoryStore::new();
        let company = seeded_company(&store).await;

        let draft = validate(
            &FINANCIAL_YEAR,
            &object(json!({"company": company.id, "from_date": "2024-04-01", "to_date": ""})),
            None,
            &store,
        )
        .await
        .unwrap();
        assert_eq!(
            draft.values["from_date"],
            Value::Date(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap())
        );
        assert_eq!(draft.values["to_date"], Value::Null);

        let errors = field_errors(
            validate(&FINANCIAL_YEAR, &object(json!({"company": 99})), None, &store).await,
        );
        assert_eq!(
            errors["company"],
            vec!["Invalid pk \"99\" - object does not exist.".to_string()]
        );

        let errors = field_errors(
            validate(&FINANCIAL_YEAR, &object(json!({"company": "x"})), None, &store).await,
        );
        assert_eq!(
            errors["company"],
            vec!["Incorrect type. Expected pk value, received str.".to_string()]
        );
    }

    #[tokio::test]
    async fn transaction_reports_every_dangling_reference() {
        let store = MemoryStore::new();
        let errors = field_errors(
            validate(
                &TRANSACTION,
                &object(json!({
                    "party": 1, "seller_party": 1, "product": 1, "quantity": "10",
                    "rate": "12.50", "amount": "125.00", "brokerage_percentage": "1",
                    "brokerage_amount": "1.25", "brokerage_gst": "0.23", "tax": 4,
                    "tax_amount": "6.25", "remark": 1, "company": 1,
                    "company_financial_year": 1
                })),
                None,
                &store,
            )
            .await,
        );
        for name in [
            "party",
            "seller_party",
            "product",
            "tax",
            "remark",
            "company",
            "company_financial_year",
        ] {
            assert!(errors.contains_key(name), "no error for {}", name);
        }
        assert!(!errors.contains_key("quantity"));
        assert_eq!(
            errors["tax"],
            vec!["Invalid pk \"4\" - object does not exist.".to_string()]
        );
    }

    #[tokio::test]
    async fn update_keeps_omitted_optional_fields() {
        let store = MemoryStore::new();
        let draft = validate(
            &COMPANY,
            &object(json!({"name": "Acme", "phone": "123", "city": "Pune", "status": "inactive"})),
            None,
            &store,
        )
        .await
        .unwrap();
        let stored = store.create(draft).await.unwrap();

        let draft = validate(
            &COMPANY,
            &object(json!({"name": "Acme Ltd", "phone": "123"})),
            Some(&stored),
            &store,
        )
        .await
        .unwrap();
        assert_eq!(draft.values["city"], Value::Text("Pune".into()));
        assert_eq!(draft.values["status"], Value::Text("inactive".into()));

        let errors = field_errors(
            validate(&COMPANY, &object(json!({"city": "Goa"})), Some(&stored), &store).await,
        );
        assert_eq!(errors["name"], vec![REQUIRED.to_string()]);
    }

    #[test]
    fn integers_are_range_checked() {
        let field = TRANSACTION.field("quantity").unwrap();
        assert_eq!(coerce(field, &json!("7.0")), Ok(Value::Int(7)));
        assert_eq!(coerce(field, &json!(1.5)), Err(INVALID_INTEGER.to_string()));
        assert_eq!(
            coerce(field, &json!(3_000_000_000i64)),
            Err("Ensure this value is less than or equal to 2147483647.".to_string())
        );
    }

    #[test]
    fn payload_must_be_an_object() {
        assert!(parse_payload(b"").unwrap().is_empty());
        match parse_payload(b"[1, 2]") {
            Err(ApiError::Validation(errors)) => assert_eq!(
                errors["non_field_errors"],
                vec!["Invalid data. Expected a dictionary, but got list.".to_string()]
            ),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            parse_payload(b"{\"name\": "),
            Err(ApiError::Validation(errors)) if errors.contains_key("detail")
        ));
    }
}
