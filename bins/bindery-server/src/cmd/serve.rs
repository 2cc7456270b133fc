use std::sync::Arc;

use bindery_engine::{Field, ModelSerializer, RuleValidator, ValidatingSerializer};
use bindery_storage_memory::{MemoryDriver, MemoryDriverConfig};
use bindery_views::ModelView;
use tokio_util::sync::CancellationToken;

use crate::config::{ResourceConfig, ServeArgs, ServerConfig};
use crate::error::ServerError;
use crate::model::Person;

/// `people` view: serializer from the resource config, memory storage
/// seeded with one person.
pub fn people_view(config: &ResourceConfig) -> Result<ModelView<Person>, ServerError> {
    let mut builder = ModelSerializer::<Person>::builder();
    for name in &config.read_only {
        builder = builder.with_field(name.clone(), Field::read_only);
    }
    let model = builder.build()?;
    let rules = RuleValidator::for_serializer(&config.validation, &model)?;
    tracing::info!(
        fields = ?model.fields().names(),
        read_only = ?config.read_only,
        rules = config.validation.len(),
        "people serializer ready"
    );

    let driver = MemoryDriver::seeded(
        MemoryDriverConfig {
            resource: "person".to_string(),
            max_rows: config.max_rows,
            ..MemoryDriverConfig::default()
        },
        [Person {
            id: 1,
            name: "John".to_string(),
        }],
    )?;

    Ok(ModelView::new("people", Arc::new(driver)).with_serializer(ValidatingSerializer::new(model, rules)))
}

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("bindery-server starting");

    // --- Load config ---
    let config = ServerConfig::load(&args.config)?;
    tracing::info!(config = %args.config, "loaded config");

    // --- Build views; a bad field setup stops startup here ---
    let people = Arc::new(people_view(&config.people)?);
    let app = bindery_views::router(people);

    // --- API server ---
    let token = CancellationToken::new();
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.api_port)).await?;
    let api_token = token.clone();
    let api_handle = tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(api_token.cancelled_owned())
            .await;
        if let Err(e) = served {
            tracing::error!(error = %e, "api server error");
        }
    });
    tracing::info!(port = config.api_port, "api server listening");
    tracing::info!("server ready");

    // --- Wait for shutdown ---
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    token.cancel();
    if let Err(e) = api_handle.await {
        tracing::warn!(error = %e, "api server task failed");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bindery_api::{Context, Value};

    use super::*;

    fn resource(read_only: &[&str], validation: &[(&str, &str)]) -> ResourceConfig {
        ResourceConfig {
            validation: validation
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            read_only: read_only.iter().map(|s| s.to_string()).collect(),
            max_rows: 10,
        }
    }

    #[tokio::test]
    async fn seeded_person_is_served() {
        let view = people_view(&resource(&["id"], &[("name", "required")])).unwrap();
        let john = view.retrieve(&Context::new(), &Value::from("1")).await.unwrap();
        assert_eq!(john.get("name").and_then(|v| v.as_str()), Some("John"));
    }

    #[test]
    fn unknown_fields_in_the_config_fail_startup() {
        let err = people_view(&resource(&["id", "email"], &[])).err().unwrap();
        assert!(matches!(err, ServerError::Registration(_)));
        assert!(err.to_string().contains("could not find field `email` on entity `Person`"));

        let err = people_view(&resource(&["id"], &[("name", "shiny")])).err().unwrap();
        assert!(matches!(err, ServerError::Registration(_)));
    }
}
