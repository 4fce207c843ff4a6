pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::models::{Draft, Kind, Record};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Single-row persistence for every entity kind.
///
/// Lookups that miss are reported as `None` / `false`; `Err` is reserved for
/// failures of the backend itself. Deleting a row removes every row that
/// references it.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, kind: Kind, id: i64) -> anyhow::Result<Option<Record>>;

    async fn list(&self, kind: Kind) -> anyhow::Result<Vec<Record>>;

    async fn create(&self, draft: Draft) -> anyhow::Result<Record>;

    async fn update(&self, id: i64, draft: Draft) -> anyhow::Result<Option<Record>>;

    async fn delete(&self, kind: Kind, id: i64) -> anyhow::Result<bool>;

    async fn exists(&self, kind: Kind, id: i64) -> anyhow::Result<bool> {
        Ok(self.get(kind, id).await?.is_some())
    }
}
