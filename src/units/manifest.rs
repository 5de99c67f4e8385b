//! Unit manifest parsing.

use crate::error::{ReloadError, Result};
use crate::registry::{MethodSet, ParamSpec};
use crate::sources::is_supported_extension;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

/// Parsed representation of one unit file.
///
/// ```toml
/// description = "Greetings"
///
/// [[handlers]]
/// name = "hello"
/// methods = ["GET", "POST"]
/// action = "hello"
///
/// [[handlers.params]]
/// name = "name"
/// type = "string"
/// default = "World"
///
/// [[handlers]]
/// name = "version"
/// respond = { version = "1.0" }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UnitManifest {
    /// Free-form description of the unit.
    #[serde(default)]
    pub description: Option<String>,
    /// Declared handlers.
    #[serde(default)]
    pub handlers: Vec<HandlerSpec>,
}

/// Declaration of one handler inside a manifest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HandlerSpec {
    /// Handler name; the second route segment.
    pub name: String,
    /// Accepted methods; POST only when omitted or empty.
    #[serde(default)]
    pub methods: Vec<String>,
    /// Declared parameters.
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    /// Catalog callable backing this handler.
    #[serde(default)]
    pub action: Option<String>,
    /// Static response backing this handler.
    #[serde(default)]
    pub respond: Option<Value>,
    /// Free-form description of the handler.
    #[serde(default)]
    pub description: Option<String>,
}

/// What a handler is bound to.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerBinding<'a> {
    /// A named catalog callable.
    Action(&'a str),
    /// A fixed JSON value.
    Respond(&'a Value),
}

impl HandlerSpec {
    /// The accepted methods as capability flags.
    ///
    /// # Errors
    ///
    /// Returns the offending name if a method is neither GET nor POST.
    pub fn method_set(&self) -> std::result::Result<MethodSet, String> {
        MethodSet::from_names(&self.methods)
    }

    /// The binding, if exactly one of `action` and `respond` is set.
    pub fn binding(&self) -> std::result::Result<HandlerBinding<'_>, String> {
        match (&self.action, &self.respond) {
            (Some(action), None) => Ok(HandlerBinding::Action(action)),
            (None, Some(value)) => Ok(HandlerBinding::Respond(value)),
            (Some(_), Some(_)) => Err(format!(
                "handler '{}' declares both 'action' and 'respond'",
                self.name
            )),
            (None, None) => Err(format!(
                "handler '{}' needs one of 'action' or 'respond'",
                self.name
            )),
        }
    }
}

impl UnitManifest {
    /// Structural checks that do not need the catalog.
    pub fn check(&self) -> std::result::Result<(), String> {
        let mut seen = HashSet::new();
        for spec in &self.handlers {
            if spec.name.trim().is_empty() {
                return Err("handler name must not be empty".to_string());
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(format!("duplicate handler '{}'", spec.name));
            }
            spec.method_set()?;
            spec.binding()?;
        }
        Ok(())
    }
}

/// Parse and structurally check the manifest at `path` for `unit`.
///
/// # Errors
///
/// Every failure is a [`ReloadError::LoadFailure`] for `unit`.
pub fn parse_manifest(unit: &str, path: &Path) -> Result<UnitManifest> {
    if !is_supported_extension(path) {
        return Err(ReloadError::load_failure(
            unit,
            format!("unsupported manifest '{}'", path.display()),
        ));
    }

    let manifest: UnitManifest = config::Config::builder()
        .add_source(config::File::from(path).required(true))
        .build()
        .and_then(|parsed| parsed.try_deserialize())
        .map_err(|e| ReloadError::load_failure(unit, e))?;

    manifest
        .check()
        .map_err(|reason| ReloadError::load_failure(unit, reason))?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ParamType;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, file: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(file);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_parse_toml_manifest() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "greet.toml",
            r#"
description = "Greetings"

[[handlers]]
name = "hello"
methods = ["GET", "POST"]
action = "hello"

[[handlers.params]]
name = "name"
type = "string"
default = "World"

[[handlers]]
name = "version"
respond = { version = "1.0" }
"#,
        );

        let manifest = parse_manifest("greet", &path).unwrap();
        assert_eq!(manifest.description.as_deref(), Some("Greetings"));
        assert_eq!(manifest.handlers.len(), 2);

        let hello = &manifest.handlers[0];
        assert_eq!(hello.method_set().unwrap(), MethodSet::GET_AND_POST);
        assert_eq!(hello.binding().unwrap(), HandlerBinding::Action("hello"));
        assert_eq!(hello.params[0].kind, ParamType::String);
        assert!(!hello.params[0].is_required());

        let version = &manifest.handlers[1];
        assert_eq!(version.method_set().unwrap(), MethodSet::POST_ONLY);
        assert!(matches!(version.binding().unwrap(), HandlerBinding::Respond(_)));
    }

    #[test]
    fn test_parse_json_manifest() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "ping.json",
            r#"{"handlers": [{"name": "ping", "methods": ["get"], "respond": "pong"}]}"#,
        );

        let manifest = parse_manifest("ping", &path).unwrap();
        assert_eq!(manifest.handlers[0].respond, Some(Value::from("pong")));
    }

    #[test]
    fn test_rejects_duplicate_handlers() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "dup.yaml",
            "handlers:\n  - name: a\n    action: echo\n  - name: a\n    action: echo\n",
        );

        let err = parse_manifest("dup", &path).unwrap_err();
        assert!(matches!(err, ReloadError::LoadFailure { ref unit, .. } if unit == "dup"));
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rejects_bad_binding_and_method() {
        let dir = TempDir::new().unwrap();
        let neither = write(&dir, "neither.yaml", "handlers:\n  - name: a\n");
        assert!(parse_manifest("neither", &neither).is_err());

        let both = write(
            &dir,
            "both.yaml",
            "handlers:\n  - name: a\n    action: echo\n    respond: 1\n",
        );
        assert!(parse_manifest("both", &both).is_err());

        let method = write(
            &dir,
            "method.yaml",
            "handlers:\n  - name: a\n    action: echo\n    methods: [DELETE]\n",
        );
        assert!(parse_manifest("method", &method).is_err());
    }

    #[test]
    fn test_syntax_error_is_load_failure() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "broken.toml", "[[handlers]\nname = ");
        assert!(matches!(
            parse_manifest("broken", &path),
            Err(ReloadError::LoadFailure { .. })
        ));
    }

    #[test]
    fn test_empty_manifest_has_no_handlers() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "empty.toml", "description = \"nothing yet\"\n");
        assert!(parse_manifest("empty", &path).unwrap().handlers.is_empty());
    }
}
