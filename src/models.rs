use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{ser::SerializeMap, Serialize, Serializer};

pub const STATUS_CHOICES: [&str; 2] = ["active", "inactive"];

/// Every entity kind known to the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    Company,
    FinancialYear,
    Party,
    Item,
    Remark,
    Tax,
    GstDetail,
    CompanyPartyInvoice,
    Transaction,
}

impl Kind {
    pub const ALL: [Kind; 9] = [
        Kind::Company,
        Kind::FinancialYear,
        Kind::Party,
        Kind::Item,
        Kind::Remark,
        Kind::Tax,
        Kind::GstDetail,
        Kind::CompanyPartyInvoice,
        Kind::Transaction,
    ];

    pub fn schema(self) -> &'static EntitySchema {
        match self {
            Kind::Company => &COMPANY,
            Kind::FinancialYear => &FINANCIAL_YEAR,
            Kind::Party => &PARTY,
            Kind::Item => &ITEM,
            Kind::Remark => &REMARK,
            Kind::Tax => &TAX,
            Kind::GstDetail => &GST_DETAIL,
            Kind::CompanyPartyInvoice => &COMPANY_PARTY_INVOICE,
            Kind::Transaction => &TRANSACTION,
        }
    }

    /// Human readable name used in envelope messages and logs.
    pub fn label(self) -> &'static str {
        match self {
            Kind::Company => "Company",
            Kind::FinancialYear => "Financial Year",
            Kind::Party => "Party",
            Kind::Item => "Item",
            Kind::Remark => "Remark",
            Kind::Tax => "Tax",
            Kind::GstDetail => "GST Detail",
            Kind::CompanyPartyInvoice => "Company Party Invoice",
            Kind::Transaction => "Transaction",
        }
    }

    /// Path segment the kind is served under. The invoice join table has none.
    pub fn route(self) -> Option<&'static str> {
        match self {
            Kind::Company => Some("companies"),
            Kind::FinancialYear => Some("financial-years"),
            Kind::Party => Some("parties"),
            Kind::Item => Some("items"),
            Kind::Remark => Some("remark"),
            Kind::Tax => Some("tax"),
            Kind::GstDetail => Some("gst"),
            Kind::Transaction => Some("transaction"),
            Kind::CompanyPartyInvoice => None,
        }
    }

    pub fn from_route(segment: &str) -> Option<Kind> {
        Kind::ALL
            .into_iter()
            .find(|k| k.route() == Some(segment))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text { max_len: Option<usize> },
    Email,
    Integer,
    Decimal { max_digits: u64, decimal_places: i64 },
    Date,
    Status,
    ForeignKey(Kind),
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    /// Name used in JSON payloads.
    pub name: &'static str,
    /// Storage column.
    pub column: &'static str,
    pub ty: FieldType,
    pub nullable: bool,
    /// Raw default, coerced through the field's own validation.
    pub default: Option<&'static str>,
}

impl Field {
    const fn new(name: &'static str, column: &'static str, ty: FieldType) -> Self {
        Field {
            name,
            column,
            ty,
            nullable: false,
            default: None,
        }
    }

    const fn text(name: &'static str, max_len: usize) -> Self {
        Self::new(name, name, FieldType::Text { max_len: Some(max_len) })
    }

    const fn long_text(name: &'static str) -> Self {
        Self::new(name, name, FieldType::Text { max_len: None })
    }

    const fn email(name: &'static str) -> Self {
        Self::new(name, name, FieldType::Email)
    }

    const fn integer(name: &'static str) -> Self {
        Self::new(name, name, FieldType::Integer)
    }

    const fn decimal(name: &'static str, max_digits: u64, decimal_places: i64) -> Self {
        Self::new(
            name,
            name,
            FieldType::Decimal {
                max_digits,
                decimal_places,
            },
        )
    }

    const fn date(name: &'static str) -> Self {
        Self::new(name, name, FieldType::Date)
    }

    const fn status() -> Self {
        Self::new("status", "status", FieldType::Status).with_default("active")
    }

    const fn foreign_key(name: &'static str, column: &'static str, target: Kind) -> Self {
        Self::new(name, column, FieldType::ForeignKey(target))
    }

    const fn optional(mut self) -> Self {
        self.nullable = true;
        self
    }

    const fn with_default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    /// A field the client must always send: not nullable and without default.
    pub fn is_required(&self) -> bool {
        !self.nullable && self.default.is_none()
    }
}

#[derive(Debug)]
pub struct EntitySchema {
    pub kind: Kind,
    pub table: &'static str,
    pub pk: &'static str,
    pub order_by: &'static str,
    pub fields: &'static [Field],
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Foreign-key fields of this schema pointing at `target`.
    pub fn references_to(&self, target: Kind) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(move |f| f.ty == FieldType::ForeignKey(target))
    }
}

pub static COMPANY: EntitySchema = EntitySchema {
    kind: Kind::Company,
    table: "company",
    pk: "company_id",
    order_by: "name",
    fields: &[
        Field::text("name", 255),
        Field::text("address1", 255).optional(),
        Field::text("address2", 255).optional(),
        Field::text("city", 100).optional(),
        Field::text("state", 100).optional(),
        Field::text("pincode", 10).optional(),
        Field::text("phone", 15),
        Field::text("fax", 50).optional(),
        Field::email("email").optional(),
        Field::text("password", 255).optional(),
        Field::text("pan", 20).optional(),
        Field::text("gst", 20).optional(),
        Field::text("bank_name", 150).optional(),
        Field::text("bank_account_no", 20).optional(),
        Field::text("bank_branch", 50).optional(),
        Field::text("bank_ifsc", 20).optional(),
        Field::text("short_name", 20).optional(),
        Field::text("cst_no", 20).optional(),
        Field::text("invoice_head", 20).optional(),
        Field::status(),
    ],
};

pub static FINANCIAL_YEAR: EntitySchema = EntitySchema {
    kind: Kind::FinancialYear,
    table: "financial_year",
    pk: "financial_year_id",
    order_by: "financial_year_id",
    fields: &[
        Field::foreign_key("company", "company_id", Kind::Company),
        Field::date("from_date").optional(),
        Field::date("to_date").optional(),
        Field::long_text("description").optional(),
        Field::status(),
    ],
};

pub static PARTY: EntitySchema = EntitySchema {
    kind: Kind::Party,
    table: "party",
    pk: "party_id",
    order_by: "party_id",
    fields: &[
        Field::text("name", 255),
        Field::text("address1", 255).optional(),
        Field::text("address2", 255).optional(),
        Field::text("city", 100).optional(),
        Field::text("state", 100).optional(),
        Field::text("pincode", 10).optional(),
        Field::text("phone", 15),
        Field::text("fax", 50).optional(),
        Field::email("email").optional(),
        Field::text("contact_person", 50).optional(),
        Field::text("type", 20).optional(),
        Field::text("gst", 20).optional(),
        Field::text("invoice_number", 50).optional(),
        Field::date("invoice_date").optional(),
    ],
};

pub static ITEM: EntitySchema = EntitySchema {
    kind: Kind::Item,
    table: "items",
    pk: "item_id",
    order_by: "item_id",
    fields: &[Field::text("item_name", 255)],
};

pub static REMARK: EntitySchema = EntitySchema {
    kind: Kind::Remark,
    table: "remarks",
    pk: "remark_id",
    order_by: "remark_id",
    fields: &[Field::text("remark", 255)],
};

pub static TAX: EntitySchema = EntitySchema {
    kind: Kind::Tax,
    table: "tax",
    pk: "tax_id",
    order_by: "tax_id",
    fields: &[
        Field::decimal("tax_percentage", 5, 2),
        Field::decimal("default_tax", 5, 2).with_default("5"),
        Field::long_text("description").optional(),
    ],
};

pub static GST_DETAIL: EntitySchema = EntitySchema {
    kind: Kind::GstDetail,
    table: "gst_details",
    pk: "gst_id",
    order_by: "gst_id",
    fields: &[
        Field::foreign_key("company", "company_id", Kind::Company),
        Field::foreign_key("financial_year", "financial_year_id", Kind::FinancialYear),
        Field::text("gst", 20).optional(),
    ],
};

/// Join table with no HTTP surface; present so cascades reach it.
pub static COMPANY_PARTY_INVOICE: EntitySchema = EntitySchema {
    kind: Kind::CompanyPartyInvoice,
    table: "company_party_invoice_details",
    pk: "id",
    order_by: "id",
    fields: &[
        Field::foreign_key("company", "company_id", Kind::Company),
        Field::foreign_key("financial_year", "financial_year_id", Kind::FinancialYear),
        Field::foreign_key("party", "party_id", Kind::Party),
        Field::text("invoice_number", 50).optional(),
        Field::date("invoice_date").optional(),
    ],
};

pub static TRANSACTION: EntitySchema = EntitySchema {
    kind: Kind::Transaction,
    table: "transactions",
    pk: "transaction_id",
    order_by: "transaction_id",
    fields: &[
        Field::text("bill_no", 100).optional(),
        Field::date("bill_date").optional(),
        Field::foreign_key("party", "party_id", Kind::Party),
        Field::text("party_bill_no", 100).optional(),
        Field::foreign_key("seller_party", "seller_party_id", Kind::Party),
        Field::foreign_key("product", "product_id", Kind::Item),
        Field::integer("quantity"),
        Field::decimal("rate", 8, 2),
        Field::decimal("amount", 12, 2),
        Field::decimal("brokerage_percentage", 5, 2),
        Field::decimal("brokerage_amount", 12, 2),
        Field::decimal("brokerage_gst", 12, 2),
        Field::foreign_key("tax", "tax_id", Kind::Tax),
        Field::decimal("tax_amount", 12, 2),
        Field::foreign_key("remark", "remark_id", Kind::Remark),
        Field::status(),
        Field::foreign_key("company", "company_id", Kind::Company),
        Field::foreign_key(
            "company_financial_year",
            "company_financial_year_id",
            Kind::FinancialYear,
        ),
    ],
};

/// A typed column value. Foreign keys and integers share `Int`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Decimal(BigDecimal),
    Date(NaiveDate),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

/// Field values keyed by json name, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub kind: Kind,
    pub values: BTreeMap<&'static str, Value>,
}

impl Draft {
    pub fn into_record(self, id: i64) -> Record {
        Record {
            kind: self.kind,
            id,
            values: self.values,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: Kind,
    pub id: i64,
    pub values: BTreeMap<&'static str, Value>,
}

impl Record {
    pub fn get(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&Value::Null)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let schema = self.kind.schema();
        let mut map = serializer.serialize_map(Some(schema.fields.len() + 1))?;
        map.serialize_entry(schema.pk, &self.id)?;
        for field in schema.fields {
            match (self.get(field.name), field.ty) {
                (Value::Null, _) => map.serialize_entry(field.name, &())?,
                (Value::Text(s), _) => map.serialize_entry(field.name, s)?,
                (Value::Int(i), _) => map.serialize_entry(field.name, i)?,
                // fixed-scale strings, e.g. "18.00"
                (Value::Decimal(d), FieldType::Decimal { decimal_places, .. }) => {
                    map.serialize_entry(field.name, &d.with_scale(decimal_places).to_string())?
                }
                (Value::Decimal(d), _) => map.serialize_entry(field.name, &d.to_string())?,
                (Value::Date(d), _) => {
                    map.serialize_entry(field.name, &d.format("%Y-%m-%d").to_string())?
                }
            }
        }
        map.end()
    }
}
