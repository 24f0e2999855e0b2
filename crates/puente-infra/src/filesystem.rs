//! Data directory layout and definition export.

use std::path::{Path, PathBuf};

use puente_core::workflow::definition::{
    WorkflowError, serialize_definition_json, serialize_definition_yaml,
};
use puente_types::config::{ExportConfig, ExportFormat};
use puente_types::workflow::WorkflowDefinition;

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `PUENTE_DATA_DIR` environment variable
/// 2. `~/.puente`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PUENTE_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".puente");
    }

    // Last resort: current directory
    PathBuf::from(".puente")
}

/// Export directory from configuration. Relative paths resolve under
/// `data_dir`.
pub fn resolve_export_dir(data_dir: &Path, export: &ExportConfig) -> PathBuf {
    let dir = Path::new(&export.directory);
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        data_dir.join(dir)
    }
}

/// `{dir}/{workflow_id}.{ext}`
pub fn export_path(dir: &Path, workflow_id: &str, format: ExportFormat) -> PathBuf {
    dir.join(format!("{workflow_id}.{}", format.extension()))
}

/// Write each definition to `dir` in `format`, creating `dir` if needed.
///
/// Existing files are overwritten. Returns the written paths in input order.
pub async fn export_definitions(
    dir: &Path,
    defs: &[WorkflowDefinition],
    format: ExportFormat,
) -> Result<Vec<PathBuf>, WorkflowError> {
    tokio::fs::create_dir_all(dir).await?;

    let mut written = Vec::with_capacity(defs.len());
    for def in defs {
        let content = match format {
            ExportFormat::Json => serialize_definition_json(def)?,
            ExportFormat::Yaml => serialize_definition_yaml(def)?,
        };
        let path = export_path(dir, &def.workflow_id, format);
        tokio::fs::write(&path, content).await?;
        tracing::debug!(workflow_id = %def.workflow_id, path = %path.display(), "exported workflow definition");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use puente_core::catalog;
    use puente_core::workflow::definition::{discover_definitions, load_definition_file};
    use tempfile::tempdir;

    #[test]
    fn test_resolve_data_dir_from_env() {
        // SAFETY: This test is single-threaded and restores the env var immediately.
        unsafe {
            std::env::set_var("PUENTE_DATA_DIR", "/tmp/test-puente");
        }
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/tmp/test-puente"));
        unsafe {
            std::env::remove_var("PUENTE_DATA_DIR");
        }
    }

    #[test]
    fn test_export_dir_resolution() {
        let data_dir = PathBuf::from("/home/user/.puente");
        let relative = ExportConfig::default();
        assert_eq!(
            resolve_export_dir(&data_dir, &relative),
            PathBuf::from("/home/user/.puente/workflows")
        );

        let absolute = ExportConfig {
            directory: "/srv/puente/export".to_string(),
            ..ExportConfig::default()
        };
        assert_eq!(resolve_export_dir(&data_dir, &absolute), PathBuf::from("/srv/puente/export"));
    }

    #[test]
    fn test_export_path() {
        assert_eq!(
            export_path(Path::new("out"), "avaluo_catastral_v1", ExportFormat::Yaml),
            PathBuf::from("out/avaluo_catastral_v1.yaml")
        );
    }

    #[tokio::test]
    async fn test_export_catalog_as_json() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("nested").join("workflows");
        let defs = catalog::definitions();

        let written = export_definitions(&out, &defs, ExportFormat::Json).await.unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(written[0], out.join("actualizacion_catastral_v1.json"));

        let loaded = load_definition_file(&written[2]).unwrap();
        assert_eq!(loaded, defs[2]);
    }

    #[tokio::test]
    async fn test_export_yaml_is_discoverable() {
        let dir = tempdir().unwrap();
        let defs = catalog::definitions();
        export_definitions(dir.path(), &defs, ExportFormat::Yaml).await.unwrap();

        let found = discover_definitions(dir.path()).unwrap();
        let ids: Vec<_> = found.iter().map(|(_, d)| d.workflow_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["actualizacion_catastral_v1", "avaluo_catastral_v1", "certificado_libertad_v1"]
        );
    }
}
