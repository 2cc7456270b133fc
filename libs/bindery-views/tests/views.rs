use std::net::Ipv4Addr;
use std::sync::Arc;

use bindery_api::{Context, Entity, ListFilter, QueryError, SortOrder, Value, WireMap};
use bindery_engine::{
    Field, ModelSerializer, RuleValidator, Serializer, SerializerError, ValidatingSerializer,
};
use bindery_storage_memory::{MemoryDriver, MemoryDriverConfig};
use bindery_views::{ModelView, ViewError};
use serde_json::json;

#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(name = "Person")]
struct Person {
    #[field(name = "id")]
    id: u64,

    #[field(name = "name")]
    name: String,
}

fn wire(value: serde_json::Value) -> WireMap {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn serializer() -> impl Serializer {
    let model = ModelSerializer::<Person>::builder()
        .with_field("id", Field::read_only)
        .build()
        .unwrap();
    let rules = RuleValidator::for_serializer([("name", "required,min=2")], &model).unwrap();
    ValidatingSerializer::new(model, rules)
}

fn people(driver: MemoryDriver) -> ModelView<Person> {
    ModelView::new("people", Arc::new(driver)).with_serializer(serializer())
}

fn empty_people() -> ModelView<Person> {
    let config = MemoryDriverConfig {
        resource: "person".to_string(),
        ..MemoryDriverConfig::default()
    };
    people(MemoryDriver::new(config))
}

#[tokio::test]
async fn create_assigns_an_id_and_renders_the_stored_row() {
    let view = empty_people();
    let created = view
        .create(&Context::new(), &wire(json!({"name": "John"})))
        .await
        .unwrap();
    assert_eq!(created, wire(json!({"id": 1, "name": "John"})));

    let fetched = view.retrieve(&Context::new(), &Value::UInt(1)).await.unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn read_only_ids_in_the_input_are_ignored() {
    let view = empty_people();
    let created = view
        .create(&Context::new(), &wire(json!({"id": 99, "name": "John"})))
        .await
        .unwrap();
    assert_eq!(created["id"], json!(1));
}

#[tokio::test]
async fn rule_and_key_errors_are_reported_together() {
    let view = empty_people();
    let err = view
        .create(&Context::new(), &wire(json!({"name": "J", "extra": "x"})))
        .await
        .unwrap_err();
    assert_eq!(err.status().as_u16(), 400);
    assert_eq!(
        err.body(),
        json!({
            "extra": ["Field `extra` is not accepted by this endpoint, accepted fields: id, name"],
            "name": ["Ensure this field has at least 2 characters"],
        })
    );
}

#[tokio::test]
async fn required_fields_are_enforced_on_create_only() {
    let driver = MemoryDriver::seeded(
        MemoryDriverConfig::default(),
        [Person {
            id: 1,
            name: "John".into(),
        }],
    )
    .unwrap();
    let view = people(driver);
    let ctx = Context::new();

    let err = view.create(&ctx, &WireMap::new()).await.unwrap_err();
    assert!(matches!(
        err,
        ViewError::Serializer(SerializerError::Validation(_))
    ));

    // partial update without the name keeps the stored one
    let row = view
        .update(&ctx, &Value::from("1"), &WireMap::new(), true)
        .await
        .unwrap();
    assert_eq!(row, wire(json!({"id": 1, "name": "John"})));

    // full update without the name is rejected
    let err = view
        .update(&ctx, &Value::from("1"), &WireMap::new(), false)
        .await
        .unwrap_err();
    assert_eq!(err.body(), json!({"name": ["This field is required"]}));
}

#[tokio::test]
async fn missing_rows_and_destroy() {
    let view = empty_people();
    let ctx = Context::new();
    view.create(&ctx, &wire(json!({"name": "John"}))).await.unwrap();

    view.destroy(&ctx, &Value::UInt(1)).await.unwrap();
    let err = view.retrieve(&ctx, &Value::UInt(1)).await.unwrap_err();
    assert_eq!(err.status().as_u16(), 404);
    assert_eq!(err.body(), json!({"message": "person with id `1` not found"}));
    assert!(matches!(
        view.destroy(&ctx, &Value::UInt(1)).await,
        Err(ViewError::Query(QueryError::NotFound { .. }))
    ));
}

#[tokio::test]
async fn list_renders_every_row() {
    let view = empty_people();
    let ctx = Context::new();
    for name in ["John", "Jane", "John"] {
        view.create(&ctx, &wire(json!({ "name": name }))).await.unwrap();
    }

    let johns = view
        .list(&ctx, &ListFilter::new().with_equals("name", "John"))
        .await
        .unwrap();
    assert_eq!(
        johns,
        vec![
            wire(json!({"id": 1, "name": "John"})),
            wire(json!({"id": 3, "name": "John"})),
        ]
    );

    let newest = ListFilter {
        order: SortOrder::Desc,
        limit: Some(1),
        ..ListFilter::default()
    };
    let rows = view.list(&ctx, &newest).await.unwrap();
    assert_eq!(rows, vec![wire(json!({"id": 3, "name": "John"}))]);
}

#[tokio::test]
async fn per_action_serializers() {
    // creation accepts the id, updates do not
    let create = ModelSerializer::<Person>::new().unwrap();
    let view = empty_people().with_create_serializer(create);
    let ctx = Context::new();

    let created = view
        .create(&ctx, &wire(json!({"id": 7, "name": "Max"})))
        .await
        .unwrap();
    assert_eq!(created, wire(json!({"id": 7, "name": "Max"})));

    let updated = view
        .update(&ctx, &Value::UInt(7), &wire(json!({"id": 8, "name": "Maxim"})), true)
        .await
        .unwrap();
    assert_eq!(updated, wire(json!({"id": 7, "name": "Maxim"})));
}

#[tokio::test]
async fn a_view_without_a_serializer_fails_every_action() {
    let view = ModelView::<Person>::new("people", Arc::new(MemoryDriver::new(MemoryDriverConfig::default())));
    let err = view
        .create(&Context::new(), &wire(json!({"name": "John"})))
        .await
        .unwrap_err();
    assert_eq!(err.status().as_u16(), 500);
    assert_eq!(
        err.body(),
        json!({"message": "serializer for entity `Person` is not configured"})
    );
    assert_eq!(view.path(), "people");
    assert_eq!(view.entity(), Person::NAME);
}

#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(name = "Host")]
struct Host {
    #[field(name = "id")]
    id: u64,

    #[field(name = "address", text)]
    address: Option<Ipv4Addr>,
}

#[tokio::test]
async fn badly_typed_input_never_reaches_storage() {
    let view = ModelView::<Host>::new("hosts", Arc::new(MemoryDriver::new(MemoryDriverConfig::default())))
        .with_serializer(ModelSerializer::<Host>::new().unwrap());
    let ctx = Context::new();

    let err = view
        .create(&ctx, &wire(json!({"address": 5})))
        .await
        .unwrap_err();
    assert_eq!(err.status().as_u16(), 400);
    let message = err.body()["address"][0].as_str().unwrap_or_default().to_string();
    assert!(message.contains("Ipv4Addr"), "{message}");
    assert!(message.ends_with("got int"), "{message}");
    assert!(view.list(&ctx, &ListFilter::default()).await.unwrap().is_empty());

    let created = view
        .create(&ctx, &wire(json!({"address": "10.0.0.1"})))
        .await
        .unwrap();
    assert_eq!(created, wire(json!({"id": 1, "address": "10.0.0.1"})));

    let err = view
        .update(&ctx, &Value::UInt(1), &wire(json!({"address": true})), true)
        .await
        .unwrap_err();
    assert_eq!(err.status().as_u16(), 400);
    assert_eq!(
        view.list(&ctx, &ListFilter::default()).await.unwrap(),
        vec![created]
    );
}
