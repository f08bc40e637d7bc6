//! Editor Integration
//!
//! Points YAML language servers at a generated schema so deployment configs
//! get completion and inline validation. VS Code settings are merged in
//! place; Neovim users get a yamlls snippet to paste.

use crate::cache::write_atomic;
use crate::error::InstallError;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Settings key the YAML language server reads schema mappings from
pub const YAML_SCHEMAS_KEY: &str = "yaml.schemas";

/// Mapping key for `schema`: `./relative` inside the workspace, absolute otherwise
pub fn schema_key(workspace: &Path, schema: &Path) -> String {
    match schema.strip_prefix(workspace) {
        Ok(relative) => format!("./{}", relative.display()),
        Err(_) => schema.display().to_string(),
    }
}

/// Absolute path of an existing schema file
async fn resolve_schema(schema: &Path) -> Result<PathBuf, InstallError> {
    match fs::canonicalize(schema).await {
        Ok(path) => Ok(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(InstallError::MissingSchema(schema.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Map `pattern` to `schema` in `<workspace>/.vscode/settings.json`
///
/// Other settings and existing schema mappings are kept. Settings that do
/// not parse as a JSON object are left untouched and reported as an error.
/// Returns the settings file path.
pub async fn install_vscode(
    workspace: &Path,
    schema: &Path,
    pattern: &str,
) -> Result<PathBuf, InstallError> {
    let schema = resolve_schema(schema).await?;
    let workspace = fs::canonicalize(workspace).await?;
    let vscode_dir = workspace.join(".vscode");
    let settings_path = vscode_dir.join("settings.json");

    let mut settings = match fs::read_to_string(&settings_path).await {
        Ok(content) if content.trim().is_empty() => Map::new(),
        Ok(content) => match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            _ => return Err(InstallError::InvalidSettings(settings_path)),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
        Err(e) => return Err(e.into()),
    };

    let schemas = settings
        .entry(YAML_SCHEMAS_KEY)
        .or_insert_with(|| Value::Object(Map::new()));
    if !schemas.is_object() {
        tracing::warn!("Replacing non-object {} in {}", YAML_SCHEMAS_KEY, settings_path.display());
        *schemas = Value::Object(Map::new());
    }
    if let Value::Object(mappings) = schemas {
        mappings.insert(schema_key(&workspace, &schema), Value::String(pattern.to_string()));
    }

    let mut content = serde_json::to_string_pretty(&Value::Object(settings))?;
    content.push('\n');

    fs::create_dir_all(&vscode_dir).await?;
    write_atomic(&settings_path, content.as_bytes()).await?;

    tracing::info!("Mapped {} to {} in {}", pattern, schema.display(), settings_path.display());
    Ok(settings_path)
}

/// yamlls setup snippet for Neovim's lspconfig
pub async fn nvim_snippet(schema: &Path, pattern: &str) -> Result<String, InstallError> {
    let schema = resolve_schema(schema).await?;

    Ok(format!(
        r#"require('lspconfig').yamlls.setup({{
  settings = {{
    yaml = {{
      schemas = {{
        ["{}"] = "{}"
      }}
    }}
  }}
}})"#,
        schema.display(),
        pattern
    ))
}
