//! Schema Fragments
//!
//! Turns one provider's [`ProviderResources`] into enum definitions plus a
//! single conditional rule that applies them when that provider is selected.

use crate::provider::ProviderResources;
use serde_json::{json, Map, Value};

/// Definitions and the provider-guarded rule derived from one catalog
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaFragment {
    pub definitions: Map<String, Value>,
    pub conditional: Value,
}

/// Definition-name prefix for a provider: "digitalocean" -> "Digitalocean",
/// "my-cloud" -> "MyCloud"
pub fn definition_prefix(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect()
}

fn string_enum(values: &[String], description: String) -> Value {
    json!({
        "type": "string",
        "enum": values,
        "description": description,
    })
}

fn definition_ref(name: &str) -> Value {
    json!({ "$ref": format!("#/definitions/{}", name) })
}

/// Build the fragment for one provider
pub fn build_fragment(provider: &str, resources: &ProviderResources) -> SchemaFragment {
    let prefix = definition_prefix(provider);
    let mut definitions = Map::new();
    let mut properties = Map::new();
    let mut infrastructure = Map::new();

    if !resources.regions.is_empty() {
        let name = format!("{}Regions", prefix);
        definitions.insert(
            name.clone(),
            string_enum(&resources.regions, format!("Available {} regions", provider)),
        );
        properties.insert("region".to_string(), definition_ref(&name));
    }

    let instance_types = resources.all_instance_types();
    if !instance_types.is_empty() {
        let name = format!("{}InstanceTypes", prefix);
        definitions.insert(
            name.clone(),
            string_enum(&instance_types, format!("Available {} instance types", provider)),
        );
        infrastructure.insert("size".to_string(), definition_ref(&name));
    }

    // One version rule per engine, each guarded on the selected engine
    let mut engine_rules = Vec::new();
    for (engine, versions) in &resources.database_types {
        if versions.is_empty() {
            continue;
        }
        let name = format!("{}{}Versions", prefix, definition_prefix(engine));
        definitions.insert(
            name.clone(),
            string_enum(versions, format!("Available {} versions on {}", engine, provider)),
        );
        engine_rules.push(json!({
            "if": {
                "properties": { "type": { "const": engine } },
                "required": ["type"]
            },
            "then": {
                "properties": { "version": definition_ref(&name) }
            }
        }));
    }
    if !engine_rules.is_empty() {
        infrastructure.insert("database".to_string(), json!({ "allOf": engine_rules }));
    }

    if let Some(versions) = resources.kubernetes_versions.as_deref().filter(|v| !v.is_empty()) {
        definitions.insert(
            format!("{}KubernetesVersions", prefix),
            string_enum(versions, format!("Available Kubernetes versions on {}", provider)),
        );
    }

    if !infrastructure.is_empty() {
        properties.insert(
            "infrastructure".to_string(),
            json!({ "properties": infrastructure }),
        );
    }

    let then = if properties.is_empty() {
        json!({})
    } else {
        json!({ "properties": properties })
    };

    SchemaFragment {
        definitions,
        conditional: json!({
            "if": {
                "properties": { "provider": { "const": provider } },
                "required": ["provider"]
            },
            "then": then
        }),
    }
}
