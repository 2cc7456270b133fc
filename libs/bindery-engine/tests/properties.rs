use std::collections::BTreeMap;

use bindery_api::{Context, Entity, WireMap};
use bindery_engine::{Field, ModelSerializer, Serializer, SerializerError};
use proptest::prelude::*;
use serde_json::json;

#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(name = "Profile")]
struct Profile {
    #[field(name = "name")]
    name: String,

    #[field(name = "nickname")]
    nickname: Option<String>,

    #[field(name = "age")]
    age: i64,

    #[field(name = "active")]
    active: bool,
}

const FIELDS: [&str; 4] = ["name", "nickname", "age", "active"];

fn field_value(field: &'static str) -> BoxedStrategy<serde_json::Value> {
    match field {
        "name" => any::<String>().prop_map(serde_json::Value::from).boxed(),
        "nickname" => prop_oneof![
            Just(serde_json::Value::Null),
            "[a-zA-Z ]{0,12}".prop_map(serde_json::Value::from),
        ]
        .boxed(),
        "age" => any::<i64>().prop_map(serde_json::Value::from).boxed(),
        _ => any::<bool>().prop_map(serde_json::Value::from).boxed(),
    }
}

/// Wire map over a random subset of the known fields, each with a value of
/// the right shape.
fn known_input() -> impl Strategy<Value = WireMap> {
    let entries: Vec<_> = FIELDS
        .iter()
        .map(|&field| proptest::option::of(field_value(field)).prop_map(move |v| (field, v)))
        .collect();
    entries.prop_map(|entries| {
        entries
            .into_iter()
            .filter_map(|(field, value)| value.map(|v| (field.to_string(), v)))
            .collect()
    })
}

fn unknown_keys() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::btree_set("x_[a-z]{1,8}", 1..5).prop_map(|keys| keys.into_iter().collect())
}

proptest! {
    #[test]
    fn pass_through_fields_round_trip(input in known_input()) {
        let serializer = ModelSerializer::<Profile>::new().unwrap();
        let ctx = Context::new();
        let iv = serializer.to_internal_value(&input, &ctx).unwrap();
        let out = serializer.to_representation(&iv, &ctx).unwrap();
        for (key, value) in &input {
            prop_assert_eq!(&out[key], value);
        }
    }

    #[test]
    fn unknown_keys_are_all_reported(input in known_input(), extra in unknown_keys()) {
        let serializer = ModelSerializer::<Profile>::new().unwrap();
        let mut raw = input.clone();
        for key in &extra {
            raw.insert(key.clone(), json!("x"));
        }
        let err = serializer.to_internal_value(&raw, &Context::new()).unwrap_err();
        let SerializerError::Validation(err) = err else {
            return Err(TestCaseError::fail("expected a validation error"));
        };
        for key in &extra {
            let messages = err.messages(key);
            prop_assert_eq!(messages.len(), 1);
            prop_assert!(messages[0].ends_with("accepted fields: name, nickname, age, active"));
        }
        prop_assert_eq!(err.field_errors().len(), extra.len());
    }

    #[test]
    fn read_only_fields_never_reach_the_internal_value(
        input in known_input(),
        read_only in proptest::sample::subsequence(FIELDS.to_vec(), 0..=4),
    ) {
        let mut builder = ModelSerializer::<Profile>::builder();
        for name in &read_only {
            builder = builder.with_field(*name, Field::read_only);
        }
        let serializer = builder.build().unwrap();
        let iv = serializer.to_internal_value(&input, &Context::new()).unwrap();
        for name in &read_only {
            prop_assert!(!iv.contains_key(name));
        }
    }

    #[test]
    fn write_only_fields_never_reach_the_representation(
        input in known_input(),
        write_only in proptest::sample::subsequence(FIELDS.to_vec(), 0..=4),
    ) {
        let mut builder = ModelSerializer::<Profile>::builder();
        for name in &write_only {
            builder = builder.with_field(*name, Field::write_only);
        }
        let serializer = builder.build().unwrap();
        let ctx = Context::new();
        let iv = serializer.to_internal_value(&input, &ctx).unwrap();
        let out = serializer.to_representation(&iv, &ctx).unwrap();
        for name in &write_only {
            prop_assert!(!out.contains_key(*name));
        }
        prop_assert_eq!(out.len(), FIELDS.len() - write_only.len());
    }

    #[test]
    fn updating_an_unknown_field_never_builds(name in "[a-z]{1,10}") {
        prop_assume!(!FIELDS.contains(&name.as_str()));
        let result = ModelSerializer::<Profile>::builder()
            .with_field(name, Field::read_only)
            .build();
        prop_assert!(result.is_err());
    }
}

#[test]
fn entity_values_survive_the_serializer() {
    let serializer = ModelSerializer::<Profile>::new().unwrap();
    let ctx = Context::new();
    let profile = Profile {
        name: "John".into(),
        nickname: None,
        age: 42,
        active: true,
    };
    let out = serializer
        .to_representation(&profile.to_internal_value(), &ctx)
        .unwrap();
    let iv = serializer.to_internal_value(&out, &ctx).unwrap();
    assert_eq!(Profile::from_internal_value(&iv).unwrap(), profile);

    let expected: BTreeMap<&str, serde_json::Value> = [
        ("name", json!("John")),
        ("nickname", json!(null)),
        ("age", json!(42)),
        ("active", json!(true)),
    ]
    .into_iter()
    .collect();
    for (key, value) in expected {
        assert_eq!(out[key], value);
    }
}
