use std::{
    collections::{BTreeMap, HashMap},
    sync::RwLock,
};

use anyhow::anyhow;
use async_trait::async_trait;

use super::Store;
use crate::models::{Draft, FieldType, Kind, Record, Value};

#[derive(Default)]
struct Tables {
    rows: HashMap<Kind, BTreeMap<i64, Record>>,
    next_id: HashMap<Kind, i64>,
}

impl Tables {
    fn assign_id(&mut self, kind: Kind) -> i64 {
        let next = self.next_id.entry(kind).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    /// Foreign keys must resolve at the moment of the write, not only when
    /// the payload was validated.
    fn check_references(&self, draft: &Draft) -> anyhow::Result<()> {
        for field in draft.kind.schema().fields {
            let FieldType::ForeignKey(target) = field.ty else {
                continue;
            };
            let Some(id) = draft.values.get(field.name).and_then(Value::as_int) else {
                continue;
            };
            if !self.rows.get(&target).is_some_and(|t| t.contains_key(&id)) {
                return Err(anyhow!(
                    "{}.{} references missing {} {}",
                    draft.kind.schema().table,
                    field.column,
                    target.label(),
                    id
                ));
            }
        }
        Ok(())
    }

    fn remove_cascading(&mut self, kind: Kind, id: i64) -> bool {
        let removed = self
            .rows
            .get_mut(&kind)
            .and_then(|t| t.remove(&id))
            .is_some();
        if !removed {
            return false;
        }

        let mut pending = vec![(kind, id)];
        while let Some((parent, parent_id)) = pending.pop() {
            for child in Kind::ALL {
                let schema = child.schema();
                let columns: Vec<&str> = schema.references_to(parent).map(|f| f.name).collect();
                if columns.is_empty() {
                    continue;
                }
                let Some(table) = self.rows.get_mut(&child) else {
                    continue;
                };
                let doomed: Vec<i64> = table
                    .values()
                    .filter(|r| columns.iter().any(|c| r.get(c) == &Value::Int(parent_id)))
                    .map(|r| r.id)
                    .collect();
                for child_id in doomed {
                    table.remove(&child_id);
                    pending.push((child, child_id));
                }
            }
        }
        true
    }
}

/// Keeps every table in process memory. Used when no database is configured.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> anyhow::Result<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    fn write(&self) -> anyhow::Result<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, kind: Kind, id: i64) -> anyhow::Result<Option<Record>> {
        Ok(self
            .read()?
            .rows
            .get(&kind)
            .and_then(|t| t.get(&id))
            .cloned())
    }

    async fn list(&self, kind: Kind) -> anyhow::Result<Vec<Record>> {
        let mut records: Vec<Record> = self
            .read()?
            .rows
            .get(&kind)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default();

        let schema = kind.schema();
        if schema.order_by != schema.pk {
            records.sort_by(|a, b| {
                let key = |r: &Record| match r.get(schema.order_by) {
                    Value::Text(s) => s.clone(),
                    _ => String::new(),
                };
                key(a).cmp(&key(b)).then(a.id.cmp(&b.id))
            });
        }
        Ok(records)
    }

    async fn create(&self, draft: Draft) -> anyhow::Result<Record> {
        let mut tables = self.write()?;
        tables.check_references(&draft)?;
        let id = tables.assign_id(draft.kind);
        let record = draft.into_record(id);
        tables
            .rows
            .entry(record.kind)
            .or_default()
            .insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: i64, draft: Draft) -> anyhow::Result<Option<Record>> {
        let mut tables = self.write()?;
        tables.check_references(&draft)?;
        let Some(slot) = tables.rows.get_mut(&draft.kind).and_then(|t| t.get_mut(&id)) else {
            return Ok(None);
        };
        *slot = draft.into_record(id);
        Ok(Some(slot.clone()))
    }

    async fn delete(&self, kind: Kind, id: i64) -> anyhow::Result<bool> {
        Ok(self.write()?.remove_cascading(kind, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(kind: Kind, values: &[(&'static str, Value)]) -> Draft {
        Draft {
            kind,
            values: values.iter().cloned().collect(),
        }
    }

    fn company(name: &str) -> Draft {
        draft(
            Kind::Company,
            &[
                ("name", Value::Text(name.to_string())),
                ("phone", Value::Text("1234567890".to_string())),
            ],
        )
    }

    #[tokio::test]
    async fn ids_are_assigned_per_kind() {
        let store = MemoryStore::new();
        let a = store.create(company("Acme")).await.unwrap();
        let b = store.create(company("Bolt")).await.unwrap();
        let item = store
            .create(draft(Kind::Item, &[("item_name", Value::Text("Rice".into()))]))
            .await
            .unwrap();

        assert_eq!((a.id, b.id, item.id), (1, 2, 1));
        assert_eq!(store.get(Kind::Company, 2).await.unwrap(), Some(b));
        assert_eq!(store.get(Kind::Item, 2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn companies_list_by_name() {
        let store = MemoryStore::new();
        store.create(company("Zeta")).await.unwrap();
        store.create(company("Acme")).await.unwrap();

        let names: Vec<Value> = store
            .list(Kind::Company)
            .await
            .unwrap()
            .iter()
            .map(|r| r.get("name").clone())
            .collect();
        assert_eq!(
            names,
            vec![Value::Text("Acme".into()), Value::Text("Zeta".into())]
        );
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_rows() {
        let store = MemoryStore::new();
        assert_eq!(store.update(7, company("Ghost")).await.unwrap(), None);
        assert!(!store.delete(Kind::Company, 7).await.unwrap());

        let created = store.create(company("Acme")).await.unwrap();
        let updated = store
            .update(created.id, company("Acme Ltd"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.get("name"), &Value::Text("Acme Ltd".into()));
        assert!(store.delete(Kind::Company, created.id).await.unwrap());
        assert!(store.list(Kind::Company).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_company_cascades_to_dependents() {
        let store = MemoryStore::new();
        let acme = store.create(company("Acme")).await.unwrap();
        let other = store.create(company("Other")).await.unwrap();
        let year = store
            .create(draft(Kind::FinancialYear, &[("company", Value::Int(acme.id))]))
            .await
            .unwrap();
        let other_year = store
            .create(draft(Kind::FinancialYear, &[("company", Value::Int(other.id))]))
            .await
            .unwrap();
        // references the surviving company but the doomed year
        store
            .create(draft(
                Kind::GstDetail,
                &[
                    ("company", Value::Int(other.id)),
                    ("financial_year", Value::Int(year.id)),
                ],
            ))
            .await
            .unwrap();
        store
            .create(draft(
                Kind::GstDetail,
                &[
                    ("company", Value::Int(other.id)),
                    ("financial_year", Value::Int(other_year.id)),
                ],
            ))
            .await
            .unwrap();

        assert!(store.delete(Kind::Company, acme.id).await.unwrap());

        assert_eq!(store.list(Kind::FinancialYear).await.unwrap(), vec![other_year.clone()]);
        let gst = store.list(Kind::GstDetail).await.unwrap();
        assert_eq!(gst.len(), 1);
        assert_eq!(gst[0].get("financial_year"), &Value::Int(other_year.id));
    }

    #[tokio::test]
    async fn writes_recheck_references_under_the_lock() {
        let store = MemoryStore::new();
        let acme = store.create(company("Acme")).await.unwrap();
        let year = draft(Kind::FinancialYear, &[("company", Value::Int(acme.id))]);
        store.create(year.clone()).await.unwrap();

        assert!(store.delete(Kind::Company, acme.id).await.unwrap());

        let err = store.create(year.clone()).await.unwrap_err();
        assert!(err.to_string().contains("references missing Company"), "{}", err);
        assert!(store.list(Kind::FinancialYear).await.unwrap().is_empty());

        let bolt = store.create(company("Bolt")).await.unwrap();
        let moved = store
            .create(draft(Kind::FinancialYear, &[("company", Value::Int(bolt.id))]))
            .await
            .unwrap();
        assert!(store.update(moved.id, year).await.is_err());
        assert_eq!(
            store.get(Kind::FinancialYear, moved.id).await.unwrap(),
            Some(moved)
        );
    }
}
