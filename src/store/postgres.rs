use anyhow::Context;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use sqlx::{
    postgres::{PgArguments, PgPoolOptions, PgRow},
    query::Query,
    Pool, Postgres, Row,
};

use super::Store;
use crate::models::{Draft, EntitySchema, Field, FieldType, Kind, Record, Value};

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Postgres backed store. Cascading deletes are left to the
/// `ON DELETE CASCADE` constraints created by the migrations.
#[derive(Clone)]
pub struct PgStore {
    p: Pool<Postgres>,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let p = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .context("cannot connect to postgres")?;
        Ok(Self { p })
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.p
    }
}

fn quoted(ident: &str) -> String {
    format!("\"{}\"", ident)
}

fn column_list(schema: &EntitySchema) -> String {
    std::iter::once(schema.pk)
        .chain(schema.fields.iter().map(|f| f.column))
        .map(quoted)
        .collect::<Vec<_>>()
        .join(", ")
}

fn select_sql(schema: &EntitySchema) -> String {
    let mut order = quoted(schema.order_by);
    if schema.order_by != schema.pk {
        order = format!("{}, {}", order, quoted(schema.pk));
    }
    format!(
        "SELECT {} FROM {} ORDER BY {}",
        column_list(schema),
        quoted(schema.table),
        order
    )
}

fn select_one_sql(schema: &EntitySchema) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = $1",
        column_list(schema),
        quoted(schema.table),
        quoted(schema.pk)
    )
}

fn insert_sql(schema: &EntitySchema) -> String {
    let columns: Vec<String> = schema.fields.iter().map(|f| quoted(f.column)).collect();
    let params: Vec<String> = (1..=schema.fields.len()).map(|i| format!("${}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        quoted(schema.table),
        columns.join(", "),
        params.join(", "),
        column_list(schema)
    )
}

fn update_sql(schema: &EntitySchema) -> String {
    let assignments: Vec<String> = schema
        .fields
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{} = ${}", quoted(f.column), i + 1))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = ${} RETURNING {}",
        quoted(schema.table),
        assignments.join(", "),
        quoted(schema.pk),
        schema.fields.len() + 1,
        column_list(schema)
    )
}

fn delete_sql(schema: &EntitySchema) -> String {
    format!(
        "DELETE FROM {} WHERE {} = $1",
        quoted(schema.table),
        quoted(schema.pk)
    )
}

fn bind_value<'q>(query: PgQuery<'q>, field: &Field, value: Value) -> anyhow::Result<PgQuery<'q>> {
    let query = match (field.ty, value) {
        (_, Value::Text(s)) => query.bind(s),
        (FieldType::Integer, Value::Int(i)) => query.bind(
            i32::try_from(i).with_context(|| format!("{} out of range: {}", field.name, i))?,
        ),
        (_, Value::Int(i)) => query.bind(i),
        (_, Value::Decimal(d)) => query.bind(d),
        (_, Value::Date(d)) => query.bind(d),
        (FieldType::Text { .. } | FieldType::Email | FieldType::Status, Value::Null) => {
            query.bind(None::<String>)
        }
        (FieldType::Integer, Value::Null) => query.bind(None::<i32>),
        (FieldType::Decimal { .. }, Value::Null) => query.bind(None::<BigDecimal>),
        (FieldType::Date, Value::Null) => query.bind(None::<NaiveDate>),
        (FieldType::ForeignKey(_), Value::Null) => query.bind(None::<i64>),
    };
    Ok(query)
}

fn bind_draft<'q>(mut query: PgQuery<'q>, schema: &EntitySchema, draft: &Draft) -> anyhow::Result<PgQuery<'q>> {
    for field in schema.fields {
        let value = draft.values.get(field.name).cloned().unwrap_or(Value::Null);
        query = bind_value(query, field, value)?;
    }
    Ok(query)
}

fn decode_row(schema: &EntitySchema, row: &PgRow) -> anyhow::Result<Record> {
    let id: i64 = row.try_get(schema.pk)?;
    let mut values = std::collections::BTreeMap::new();
    for field in schema.fields {
        let c = field.column;
        let value = match field.ty {
            FieldType::Text { .. } | FieldType::Email | FieldType::Status => {
                row.try_get::<Option<String>, _>(c)?.map(Value::Text)
            }
            FieldType::Integer => row.try_get::<Option<i32>, _>(c)?.map(|i| Value::Int(i.into())),
            FieldType::Decimal { .. } => row.try_get::<Option<BigDecimal>, _>(c)?.map(Value::Decimal),
            FieldType::Date => row.try_get::<Option<NaiveDate>, _>(c)?.map(Value::Date),
            FieldType::ForeignKey(_) => row.try_get::<Option<i64>, _>(c)?.map(Value::Int),
        };
        values.insert(field.name, value.unwrap_or(Value::Null));
    }
    Ok(Record {
        kind: schema.kind,
        id,
        values,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn get(&self, kind: Kind, id: i64) -> anyhow::Result<Option<Record>> {
        let schema = kind.schema();
        let row = sqlx::query(&select_one_sql(schema))
            .bind(id)
            .fetch_optional(&self.p)
            .await?;
        row.map(|r| decode_row(schema, &r)).transpose()
    }

    async fn list(&self, kind: Kind) -> anyhow::Result<Vec<Record>> {
        let schema = kind.schema();
        sqlx::query(&select_sql(schema))
            .fetch_all(&self.p)
            .await?
            .iter()
            .map(|r| decode_row(schema, r))
            .collect()
    }

    async fn create(&self, draft: Draft) -> anyhow::Result<Record> {
        let schema = draft.kind.schema();
        let sql = insert_sql(schema);
        let row = bind_draft(sqlx::query(&sql), schema, &draft)?
            .fetch_one(&self.p)
            .await
            .with_context(|| format!("cannot insert into {}", schema.table))?;
        decode_row(schema, &row)
    }

    async fn update(&self, id: i64, draft: Draft) -> anyhow::Result<Option<Record>> {
        let schema = draft.kind.schema();
        let sql = update_sql(schema);
        let row = bind_draft(sqlx::query(&sql), schema, &draft)?
            .bind(id)
            .fetch_optional(&self.p)
            .await
            .with_context(|| format!("cannot update {} {}", schema.table, id))?;
        row.map(|r| decode_row(schema, &r)).transpose()
    }

    async fn delete(&self, kind: Kind, id: i64) -> anyhow::Result<bool> {
        let schema = kind.schema();
        let res = sqlx::query(&delete_sql(schema))
            .bind(id)
            .execute(&self.p)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn exists(&self, kind: Kind, id: i64) -> anyhow::Result<bool> {
        let schema = kind.schema();
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = $1)",
            quoted(schema.table),
            quoted(schema.pk)
        );
        let found: bool = sqlx::query(&sql)
            .bind(id)
            .fetch_one(&self.p)
            .await?
            .try_get(0)?;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{COMPANY, ITEM, TRANSACTION};

    #[test]
    fn select_orders_by_schema_column() {
        assert_eq!(
            select_sql(&ITEM),
            r#"SELECT "item_id", "item_name" FROM "items" ORDER BY "item_id""#
        );
        assert!(select_sql(&COMPANY).contains(r#"ORDER BY "name", "company_id""#));
    }

    #[test]
    fn insert_binds_every_field_and_returns_the_row() {
        assert_eq!(
            insert_sql(&ITEM),
            r#"INSERT INTO "items" ("item_name") VALUES ($1) RETURNING "item_id", "item_name""#
        );
        let sql = insert_sql(&TRANSACTION);
        assert!(sql.contains(r#""company_financial_year_id""#));
        assert!(sql.contains(&format!("${})", TRANSACTION.fields.len())));
    }

    #[test]
    fn update_puts_the_key_after_the_fields() {
        assert_eq!(
            update_sql(&ITEM),
            r#"UPDATE "items" SET "item_name" = $1 WHERE "item_id" = $2 RETURNING "item_id", "item_name""#
        );
    }

    #[test]
    fn delete_targets_the_primary_key() {
        assert_eq!(
            delete_sql(&COMPANY),
            r#"DELETE FROM "company" WHERE "company_id" = $1"#
        );
    }
}
