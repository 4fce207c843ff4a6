use super::{envelope::AppMessage, AppState};
use crate::{
    error::ApiError,
    models::{EntitySchema, Kind},
    validation,
};

/// CRUD over one entity kind. Per-kind behaviour lives in the schema; this
/// type holds no state of its own beyond borrowed request context.
pub struct ResourceController<'a> {
    schema: &'static EntitySchema,
    s: &'a AppState,
}

impl<'a> ResourceController<'a> {
    /// Resolve the controller for a path segment such as `companies`.
    pub fn for_route(route: &str, s: &'a AppState) -> Result<Self, ApiError> {
        let kind = Kind::from_route(route).ok_or_else(|| ApiError::UnknownResource(route.to_string()))?;
        Ok(Self {
            schema: kind.schema(),
            s,
        })
    }

    fn kind(&self) -> Kind {
        self.schema.kind
    }

    /// Only plain digit runs name a row; `+1` or `-1` do not.
    pub fn parse_id(&self, raw: &str) -> Result<i64, ApiError> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ApiError::NotFound(self.kind()));
        }
        raw.parse().map_err(|_| ApiError::NotFound(self.kind()))
    }

    pub async fn list(&self) -> Result<AppMessage, ApiError> {
        let records = self.s.store.list(self.kind()).await?;
        if records.is_empty() && self.s.settings.empty_list_as_error {
            return Err(ApiError::EmptyCollection(self.kind()));
        }
        log::info!("Fetched all {} rows ({})", self.schema.table, records.len());
        Ok(AppMessage::listed(records))
    }

    pub async fn get(&self, id: i64) -> Result<AppMessage, ApiError> {
        let record = self
            .s
            .store
            .get(self.kind(), id)
            .await?
            .ok_or(ApiError::NotFound(self.kind()))?;
        log::info!("Fetched {}: {}", self.kind().label(), id);
        Ok(AppMessage::found(record))
    }

    pub async fn create(&self, body: &[u8]) -> Result<AppMessage, ApiError> {
        let payload = validation::parse_payload(body)?;
        let draft = validation::validate(self.schema, &payload, None, self.s.store.as_ref()).await?;
        let record = self.s.store.create(draft).await?;
        log::info!("Created {}: {}", self.kind().label(), record.id);
        Ok(AppMessage::created(record))
    }

    pub async fn update(&self, id: i64, body: &[u8]) -> Result<AppMessage, ApiError> {
        let existing = self
            .s
            .store
            .get(self.kind(), id)
            .await?
            .ok_or(ApiError::NotFound(self.kind()))?;
        let payload = validation::parse_payload(body)?;
        let draft =
            validation::validate(self.schema, &payload, Some(&existing), self.s.store.as_ref()).await?;
        // the row may have been deleted since it was read
        let record = self
            .s
            .store
            .update(id, draft)
            .await?
            .ok_or(ApiError::NotFound(self.kind()))?;
        log::info!("Updated {}: {}", self.kind().label(), id);
        Ok(AppMessage::updated(record))
    }

    pub async fn delete(&self, id: i64) -> Result<AppMessage, ApiError> {
        if !self.s.store.delete(self.kind(), id).await? {
            return Err(ApiError::NotFound(self.kind()));
        }
        log::info!("Deleted {}: {}", self.kind().label(), id);
        Ok(AppMessage::deleted(self.kind()))
    }

    /// `PUT` and `DELETE` on a collection name no row.
    pub fn missing_id(&self) -> ApiError {
        ApiError::NotFound(self.kind())
    }
}
