use std::marker::PhantomData;
use std::sync::Arc;

use bindery_api::{Context, Entity, InternalValue, ListFilter, QueryDriver, Value, WireMap};
use bindery_engine::{MissingSerializer, Serializer};

use crate::error::ViewError;

/// CRUD actions for one entity type over a [`QueryDriver`].
///
/// Every action runs the same pipeline: wire input through the serializer,
/// the storage call on the internal value, the stored row back through the
/// serializer to wire output.
pub struct ModelView<E> {
    path: String,
    serializer: Arc<dyn Serializer>,
    create_serializer: Option<Arc<dyn Serializer>>,
    update_serializer: Option<Arc<dyn Serializer>>,
    driver: Arc<dyn QueryDriver>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> ModelView<E> {
    /// View without a serializer; every action fails until one is set.
    pub fn new(path: impl Into<String>, driver: Arc<dyn QueryDriver>) -> Self {
        Self {
            path: path.into(),
            serializer: Arc::new(MissingSerializer::<E>::new()),
            create_serializer: None,
            update_serializer: None,
            driver,
            _entity: PhantomData,
        }
    }

    /// Serializer for output and for any action without its own.
    pub fn with_serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }

    /// Input serializer for `create`.
    pub fn with_create_serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        self.create_serializer = Some(Arc::new(serializer));
        self
    }

    /// Input serializer for `update`.
    pub fn with_update_serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        self.update_serializer = Some(Arc::new(serializer));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn entity(&self) -> &'static str {
        E::NAME
    }

    pub async fn create(&self, ctx: &Context, raw: &WireMap) -> Result<WireMap, ViewError> {
        let input = self.create_serializer.as_ref().unwrap_or(&self.serializer);
        let value = input.to_internal_value(raw, ctx)?;
        input.validate(&value, ctx)?;
        let row = self.driver.create(ctx, value).await?;
        self.render(&row, ctx)
    }

    pub async fn retrieve(&self, ctx: &Context, id: &Value) -> Result<WireMap, ViewError> {
        let row = self.driver.retrieve(ctx, id).await?;
        self.render(&row, ctx)
    }

    /// Full (`partial = false`) or partial update. For a partial update the
    /// serializer and validators see a partial [`Context`].
    pub async fn update(
        &self,
        ctx: &Context,
        id: &Value,
        raw: &WireMap,
        partial: bool,
    ) -> Result<WireMap, ViewError> {
        let ctx = ctx.clone().with_partial(partial);
        let input = self.update_serializer.as_ref().unwrap_or(&self.serializer);
        let value = input.to_internal_value(raw, &ctx)?;
        input.validate(&value, &ctx)?;
        let row = self.driver.update(&ctx, id, value).await?;
        self.render(&row, &ctx)
    }

    pub async fn destroy(&self, ctx: &Context, id: &Value) -> Result<(), ViewError> {
        self.driver.delete(ctx, id).await?;
        Ok(())
    }

    pub async fn list(&self, ctx: &Context, filter: &ListFilter) -> Result<Vec<WireMap>, ViewError> {
        let rows = self.driver.list(ctx, filter).await?;
        rows.iter().map(|row| self.render(row, ctx)).collect()
    }

    fn render(&self, row: &InternalValue, ctx: &Context) -> Result<WireMap, ViewError> {
        let stored = self.serializer.from_db(row, ctx)?;
        Ok(self.serializer.to_representation(&stored, ctx)?)
    }
}
