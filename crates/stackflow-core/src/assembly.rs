//! Cloud assembly
//!
//! The synthesized output of an app: one template per unit plus a manifest
//! (`manifest.json`) recording deployment order, targets and dependencies.
//! The previous manifest is kept as `manifest.json.backup`.

use crate::error::{Result, SynthError};
use crate::model::{Target, validate_unit_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;

const MANIFEST_VERSION: u32 = 1;
const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_BACKUP: &str = "manifest.json.backup";
const TEMPLATE_SUFFIX: &str = ".template.json";

/// A unit rendered into a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedUnit {
    pub id: String,
    pub target: Target,
    /// Units that must be deployed first
    pub dependencies: Vec<String>,
    pub template: Value,
}

impl SynthesizedUnit {
    /// File name of this unit's template inside the assembly directory
    pub fn template_file(&self) -> String {
        format!("{}{}", self.id, TEMPLATE_SUFFIX)
    }

    /// Number of declared resources
    pub fn resource_count(&self) -> usize {
        self.template
            .get("Resources")
            .and_then(Value::as_object)
            .map(|r| r.len())
            .unwrap_or(0)
    }

    /// Number of resources of a provider type
    pub fn count_of_type(&self, resource_type: &str) -> usize {
        self.template
            .get("Resources")
            .and_then(Value::as_object)
            .map(|r| {
                r.values()
                    .filter(|res| res["Type"] == resource_type)
                    .count()
            })
            .unwrap_or(0)
    }
}

/// Every synthesized unit, in deployment order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assembly {
    pub units: Vec<SynthesizedUnit>,
}

impl Assembly {
    pub fn get(&self, id: &str) -> Option<&SynthesizedUnit> {
        self.units.iter().find(|u| u.id == id)
    }

    pub fn template(&self, id: &str) -> Option<&Value> {
        self.get(id).map(|u| &u.template)
    }

    pub fn resource_count(&self) -> usize {
        self.units.iter().map(SynthesizedUnit::resource_count).sum()
    }
}

/// Manifest entry for one unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub target: Target,
    pub template_file: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// `manifest.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub units: Vec<ManifestEntry>,
}

impl Manifest {
    fn for_assembly(assembly: &Assembly) -> Self {
        Self {
            version: MANIFEST_VERSION,
            created_at: Utc::now(),
            units: assembly
                .units
                .iter()
                .map(|u| ManifestEntry {
                    id: u.id.clone(),
                    target: u.target.clone(),
                    template_file: u.template_file(),
                    dependencies: u.dependencies.clone(),
                })
                .collect(),
        }
    }
}

/// Reads and writes an assembly directory
pub struct AssemblyStore {
    out_dir: PathBuf,
}

impl AssemblyStore {
    pub fn new(out_dir: impl AsRef<Path>) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_path_buf(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn manifest_path(&self) -> PathBuf {
        self.out_dir.join(MANIFEST_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.out_dir.join(MANIFEST_BACKUP)
    }

    async fn ensure_out_dir(&self) -> Result<()> {
        if !self.out_dir.exists() {
            fs::create_dir_all(&self.out_dir).await?;
            tracing::debug!("Created assembly directory: {}", self.out_dir.display());
        }
        Ok(())
    }

    /// Load the assembly written by a previous run, if any
    pub async fn load(&self) -> Result<Option<Assembly>> {
        let path = self.manifest_path();
        if !path.exists() {
            tracing::debug!("No previous assembly in {}", self.out_dir.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let manifest: Manifest = serde_json::from_str(&content)?;
        if manifest.version > MANIFEST_VERSION {
            return Err(SynthError::AssemblyError(format!(
                "Manifest version {} is newer than supported version {}",
                manifest.version, MANIFEST_VERSION
            )));
        }

        let mut units = Vec::with_capacity(manifest.units.len());
        for entry in manifest.units {
            if !is_bare_file_name(&entry.template_file) {
                return Err(SynthError::AssemblyError(format!(
                    "Manifest entry '{}' points outside the assembly directory: {}",
                    entry.id, entry.template_file
                )));
            }
            let template_path = self.out_dir.join(&entry.template_file);
            let content =
                fs::read_to_string(&template_path)
                    .await
                    .map_err(|e| SynthError::IoError {
                        path: template_path.clone(),
                        message: e.to_string(),
                    })?;
            units.push(SynthesizedUnit {
                id: entry.id,
                target: entry.target,
                dependencies: entry.dependencies,
                template: serde_json::from_str(&content)?,
            });
        }

        tracing::debug!("Loaded assembly with {} units", units.len());
        Ok(Some(Assembly { units }))
    }

    /// Write templates and manifest, replacing the previous assembly
    pub async fn save(&self, assembly: &Assembly) -> Result<Manifest> {
        for unit in &assembly.units {
            validate_unit_id(&unit.id)?;
        }
        self.ensure_out_dir().await?;

        let path = self.manifest_path();
        let backup = self.backup_path();
        let mut stale = Vec::new();

        if path.exists() {
            let content = fs::read_to_string(&path).await?;
            if let Ok(previous) = serde_json::from_str::<Manifest>(&content) {
                stale = previous
                    .units
                    .into_iter()
                    .filter(|e| assembly.get(&e.id).is_none())
                    .map(|e| e.template_file)
                    .filter(|file| {
                        let bare = is_bare_file_name(file);
                        if !bare {
                            tracing::warn!("Ignoring stale manifest entry outside the assembly: {}", file);
                        }
                        bare
                    })
                    .collect();
            }
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created manifest backup");
        }

        for unit in &assembly.units {
            let content = serde_json::to_string_pretty(&unit.template)?;
            fs::write(self.out_dir.join(unit.template_file()), content).await?;
        }

        for file in stale {
            let stale_path = self.out_dir.join(&file);
            if stale_path.exists() {
                fs::remove_file(&stale_path).await?;
                tracing::debug!("Removed stale template {}", file);
            }
        }

        let manifest = Manifest::for_assembly(assembly);
        fs::write(&path, serde_json::to_string_pretty(&manifest)?).await?;

        tracing::debug!("Saved assembly with {} units", assembly.units.len());
        Ok(manifest)
    }
}

/// A name that joins onto the assembly directory without leaving it
fn is_bare_file_name(name: &str) -> bool {
    !name.contains(['/', '\\'])
        && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
}
