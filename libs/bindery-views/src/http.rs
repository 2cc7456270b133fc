use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bindery_api::{Context, Entity, ListFilter, SortOrder, Value, WireMap};

use crate::error::ViewError;
use crate::view::ModelView;

const REQUEST_ID_HEADER: &str = "x-request-id";

impl IntoResponse for ViewError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, status = status.as_u16(), "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

/// Routes for `view`:
///
/// - `GET /{path}`: list (`limit`, `offset`, `order=asc|desc`, any other
///   query key filters on equality)
/// - `POST /{path}`: create
/// - `GET /{path}/{id}`: retrieve
/// - `PUT /{path}/{id}`, `PATCH /{path}/{id}`: full and partial update
/// - `DELETE /{path}/{id}`: destroy
pub fn router<E: Entity>(view: Arc<ModelView<E>>) -> Router {
    let collection = format!("/{}", view.path().trim_matches('/'));
    let item = format!("{collection}/{{id}}");
    Router::new()
        .route(&collection, get(list::<E>).post(create::<E>))
        .route(
            &item,
            get(retrieve::<E>)
                .put(update::<E>)
                .patch(partial_update::<E>)
                .delete(destroy::<E>),
        )
        .with_state(view)
}

fn context(headers: &HeaderMap) -> Context {
    match headers.get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok()) {
        Some(id) => Context::new().with_request_id(id),
        None => Context::new(),
    }
}

fn object(body: serde_json::Value) -> Result<WireMap, ViewError> {
    match body {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(ViewError::bad_request(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

fn list_filter(params: HashMap<String, String>) -> Result<ListFilter, ViewError> {
    let mut filter = ListFilter::new();
    for (key, value) in params {
        match key.as_str() {
            "limit" => {
                let limit = value
                    .parse()
                    .map_err(|_| ViewError::bad_request(format!("invalid limit `{value}`")))?;
                filter.limit = Some(limit);
            }
            "offset" => {
                let offset = value
                    .parse()
                    .map_err(|_| ViewError::bad_request(format!("invalid offset `{value}`")))?;
                filter.offset = Some(offset);
            }
            "order" => {
                filter.order = match value.as_str() {
                    "asc" => SortOrder::Asc,
                    "desc" => SortOrder::Desc,
                    _ => {
                        return Err(ViewError::bad_request(format!(
                            "invalid order `{value}` (expected asc or desc)"
                        )));
                    }
                };
            }
            _ => {
                filter.equals.insert(key, Value::String(value));
            }
        }
    }
    Ok(filter)
}

// --- GET /{path} ---

async fn list<E: Entity>(
    State(view): State<Arc<ModelView<E>>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<WireMap>>, ViewError> {
    let filter = list_filter(params)?;
    let rows = view.list(&context(&headers), &filter).await?;
    Ok(Json(rows))
}

// --- POST /{path} ---

async fn create<E: Entity>(
    State(view): State<Arc<ModelView<E>>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<WireMap>), ViewError> {
    let raw = object(body)?;
    let created = view.create(&context(&headers), &raw).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

// --- GET /{path}/{id} ---

async fn retrieve<E: Entity>(
    State(view): State<Arc<ModelView<E>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<WireMap>, ViewError> {
    let row = view.retrieve(&context(&headers), &Value::String(id)).await?;
    Ok(Json(row))
}

// --- PUT /{path}/{id} ---

async fn update<E: Entity>(
    State(view): State<Arc<ModelView<E>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<WireMap>, ViewError> {
    let raw = object(body)?;
    let row = view
        .update(&context(&headers), &Value::String(id), &raw, false)
        .await?;
    Ok(Json(row))
}

// --- PATCH /{path}/{id} ---

async fn partial_update<E: Entity>(
    State(view): State<Arc<ModelView<E>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<WireMap>, ViewError> {
    let raw = object(body)?;
    let row = view
        .update(&context(&headers), &Value::String(id), &raw, true)
        .await?;
    Ok(Json(row))
}

// --- DELETE /{path}/{id} ---

async fn destroy<E: Entity>(
    State(view): State<Arc<ModelView<E>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ViewError> {
    view.destroy(&context(&headers), &Value::String(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use bindery_engine::{Field, ModelSerializer};
    use bindery_storage_memory::{MemoryDriver, MemoryDriverConfig};
    use serde_json::json;

    use super::*;

    #[derive(Debug, Clone, Default, PartialEq, bindery_api::Entity)]
    #[entity(name = "Person")]
    struct Person {
        #[field(name = "id")]
        id: u64,

        #[field(name = "name")]
        name: String,
    }

    fn view() -> Arc<ModelView<Person>> {
        let driver = MemoryDriver::seeded(
            MemoryDriverConfig::default(),
            [Person {
                id: 1,
                name: "John".into(),
            }],
        )
        .unwrap();
        let serializer = ModelSerializer::<Person>::builder()
            .with_field("id", Field::read_only)
            .build()
            .unwrap();
        Arc::new(ModelView::new("people", Arc::new(driver)).with_serializer(serializer))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_returns_201() {
        let response = create(State(view()), HeaderMap::new(), Json(json!({"name": "Jane"})))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await, json!({"id": 2, "name": "Jane"}));
    }

    #[tokio::test]
    async fn non_object_bodies_are_rejected() {
        let response = create(State(view()), HeaderMap::new(), Json(json!(["Jane"])))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"message": "bad request: expected a JSON object, got an array"})
        );
    }

    #[tokio::test]
    async fn validation_errors_are_400_with_the_field_map() {
        let response = create(
            State(view()),
            HeaderMap::new(),
            Json(json!({"name": "Jane", "extra": 1})),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"extra": ["Field `extra` is not accepted by this endpoint, accepted fields: id, name"]})
        );
    }

    #[tokio::test]
    async fn missing_rows_are_404() {
        let response = retrieve(State(view()), HeaderMap::new(), Path("7".to_string()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn patch_then_delete() {
        let view = view();
        let response = partial_update(
            State(view.clone()),
            HeaderMap::new(),
            Path("1".to_string()),
            Json(json!({"name": "Johnny"})),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"id": 1, "name": "Johnny"}));

        let response = destroy(State(view.clone()), HeaderMap::new(), Path("1".to_string()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = list(State(view), HeaderMap::new(), Query(HashMap::new()))
            .await
            .into_response();
        assert_eq!(body_json(response).await, json!([]));
    }

    #[test]
    fn query_parameters_become_a_filter() {
        let params = HashMap::from([
            ("limit".to_string(), "5".to_string()),
            ("order".to_string(), "desc".to_string()),
            ("name".to_string(), "John".to_string()),
        ]);
        let filter = list_filter(params).unwrap();
        assert_eq!(filter.limit, Some(5));
        assert_eq!(filter.order, SortOrder::Desc);
        assert_eq!(filter.equals.get("name"), Some(&Value::from("John")));

        let bad = HashMap::from([("order".to_string(), "sideways".to_string())]);
        assert!(list_filter(bad).is_err());
    }

    #[test]
    fn request_id_comes_from_the_header() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, "abc-123".parse().unwrap());
        assert_eq!(context(&headers).request_id(), Some("abc-123"));
        assert_eq!(context(&HeaderMap::new()).request_id(), None);
    }
}
