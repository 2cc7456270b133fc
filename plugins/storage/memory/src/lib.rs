use bindery_api::storage::same_value;
use bindery_api::{
    Context, Entity, InternalValue, ListFilter, QueryDriver, QueryError, QueryFuture, SortOrder,
    Value,
};
use tokio::sync::RwLock;

// ═══════════════════════════════════════════════════════════════
//  MemoryDriverConfig
// ═══════════════════════════════════════════════════════════════

fn default_resource() -> String {
    "row".to_string()
}

fn default_id_field() -> String {
    "id".to_string()
}

fn default_max_rows() -> usize {
    100_000
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MemoryDriverConfig {
    /// Name used in not-found and conflict messages.
    #[serde(default = "default_resource")]
    pub resource: String,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

impl Default for MemoryDriverConfig {
    fn default() -> Self {
        Self {
            resource: default_resource(),
            id_field: default_id_field(),
            max_rows: default_max_rows(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Table
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct Table {
    rows: Vec<InternalValue>,
    last_id: u64,
}

impl Table {
    fn position(&self, id_field: &str, id: &Value) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.get(id_field).is_some_and(|v| same_value(v, id)))
    }

    /// Insert `row`, generating a numeric id when it has none.
    fn insert(
        &mut self,
        config: &MemoryDriverConfig,
        mut row: InternalValue,
    ) -> Result<InternalValue, QueryError> {
        if self.rows.len() >= config.max_rows {
            return Err(QueryError::backend(format!(
                "{} table is full ({} rows)",
                config.resource, config.max_rows
            )));
        }

        match row.get(&config.id_field) {
            None | Some(Value::Null) => {
                let id = self.next_id(config)?;
                row.insert(config.id_field.as_str(), Value::UInt(id));
            }
            Some(id) => {
                if self.position(&config.id_field, id).is_some() {
                    return Err(QueryError::Conflict(format!(
                        "{} with id `{}` already exists",
                        config.resource,
                        key_of(id)
                    )));
                }
                if let Some(n) = id.as_u64() {
                    self.last_id = self.last_id.max(n);
                }
            }
        }

        self.rows.push(row.clone());
        Ok(row)
    }

    /// Next free numeric id above every numeric id seen so far.
    fn next_id(&mut self, config: &MemoryDriverConfig) -> Result<u64, QueryError> {
        loop {
            self.last_id = self.last_id.checked_add(1).ok_or_else(|| {
                QueryError::backend(format!("{} id space exhausted", config.resource))
            })?;
            if self
                .position(&config.id_field, &Value::UInt(self.last_id))
                .is_none()
            {
                return Ok(self.last_id);
            }
        }
    }
}

fn key_of(id: &Value) -> String {
    id.as_key().unwrap_or_else(|| id.to_string())
}

// ═══════════════════════════════════════════════════════════════
//  MemoryDriver
// ═══════════════════════════════════════════════════════════════

/// In-memory table of internal values. Rows keep insertion order.
///
/// Numeric ids are generated for rows created without one; ids given by the
/// caller are kept and compared by their canonical key.
pub struct MemoryDriver {
    table: RwLock<Table>,
    config: MemoryDriverConfig,
}

impl MemoryDriver {
    pub fn new(config: MemoryDriverConfig) -> Self {
        Self {
            table: RwLock::new(Table::default()),
            config,
        }
    }

    /// Config from JSON; `{}` or an empty string gives the defaults.
    pub fn from_json(config_json: &str) -> Result<Self, QueryError> {
        let config = match config_json.trim() {
            "" | "{}" => MemoryDriverConfig::default(),
            json => serde_json::from_str(json).map_err(QueryError::backend)?,
        };
        Ok(Self::new(config))
    }

    /// Driver pre-filled with `entities`, in order.
    pub fn seeded<E, I>(config: MemoryDriverConfig, entities: I) -> Result<Self, QueryError>
    where
        E: Entity,
        I: IntoIterator<Item = E>,
    {
        let mut table = Table::default();
        for entity in entities {
            table.insert(&config, entity.to_internal_value())?;
        }
        tracing::debug!(
            resource = %config.resource,
            rows = table.rows.len(),
            entity = E::NAME,
            "memory driver seeded"
        );
        Ok(Self {
            table: RwLock::new(table),
            config,
        })
    }

    pub fn config(&self) -> &MemoryDriverConfig {
        &self.config
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn not_found(&self, id: &Value) -> QueryError {
        QueryError::NotFound {
            resource: self.config.resource.clone(),
            id: key_of(id),
        }
    }
}

impl QueryDriver for MemoryDriver {
    fn create(&self, ctx: &Context, value: InternalValue) -> QueryFuture<'_, InternalValue> {
        let request_id = ctx.request_id().map(str::to_string);
        Box::pin(async move {
            let mut table = self.table.write().await;
            let row = table.insert(&self.config, value)?;
            tracing::debug!(
                resource = %self.config.resource,
                id = %row.get(&self.config.id_field).map(key_of).unwrap_or_default(),
                request_id = request_id.as_deref(),
                "row created"
            );
            Ok(row)
        })
    }

    fn retrieve(&self, _ctx: &Context, id: &Value) -> QueryFuture<'_, InternalValue> {
        let id = id.clone();
        Box::pin(async move {
            let table = self.table.read().await;
            table
                .position(&self.config.id_field, &id)
                .map(|idx| table.rows[idx].clone())
                .ok_or_else(|| self.not_found(&id))
        })
    }

    fn update(
        &self,
        ctx: &Context,
        id: &Value,
        partial: InternalValue,
    ) -> QueryFuture<'_, InternalValue> {
        let id = id.clone();
        let request_id = ctx.request_id().map(str::to_string);
        Box::pin(async move {
            let mut table = self.table.write().await;
            let idx = table
                .position(&self.config.id_field, &id)
                .ok_or_else(|| self.not_found(&id))?;

            if let Some(new_id) = partial.get(&self.config.id_field) {
                if !same_value(new_id, &id) {
                    return Err(QueryError::Conflict(format!(
                        "{} id `{}` cannot be changed to `{}`",
                        self.config.resource,
                        key_of(&id),
                        key_of(new_id)
                    )));
                }
            }

            let row = &mut table.rows[idx];
            row.extend(partial);
            tracing::debug!(
                resource = %self.config.resource,
                id = %key_of(&id),
                request_id = request_id.as_deref(),
                "row updated"
            );
            Ok(row.clone())
        })
    }

    fn delete(&self, ctx: &Context, id: &Value) -> QueryFuture<'_, ()> {
        let id = id.clone();
        let request_id = ctx.request_id().map(str::to_string);
        Box::pin(async move {
            let mut table = self.table.write().await;
            let idx = table
                .position(&self.config.id_field, &id)
                .ok_or_else(|| self.not_found(&id))?;
            table.rows.remove(idx);
            tracing::debug!(
                resource = %self.config.resource,
                id = %key_of(&id),
                request_id = request_id.as_deref(),
                "row deleted"
            );
            Ok(())
        })
    }

    fn list(&self, _ctx: &Context, filter: &ListFilter) -> QueryFuture<'_, Vec<InternalValue>> {
        let filter = filter.clone();
        Box::pin(async move {
            let table = self.table.read().await;
            let mut result: Vec<InternalValue> = table
                .rows
                .iter()
                .filter(|row| filter.matches(row))
                .cloned()
                .collect();

            match filter.order {
                SortOrder::Desc => result.reverse(),
                SortOrder::Asc => {}
            }

            let offset = filter.offset.unwrap_or(0);
            if offset >= result.len() {
                result.clear();
            } else if offset > 0 {
                result = result.split_off(offset);
            }

            if let Some(limit) = filter.limit {
                result.truncate(limit);
            }

            Ok(result)
        })
    }
}
