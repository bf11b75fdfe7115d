use crate::project::Project;
use anyhow::{Context, anyhow};
use colored::Colorize;
use serde_json::Value;
use stackflow_config::OutputFormat;
use stackflow_core::AssemblyStore;
use std::path::PathBuf;
use tracing::info;

pub async fn handle(
    project: &Project,
    out: Option<PathBuf>,
    format: Option<OutputFormat>,
    unit: Option<&str>,
) -> anyhow::Result<()> {
    let composition = project.compose()?;
    let assembly = composition.app.synth().context("synthesis failed")?;

    // 表示するユニット: 指定されたもの、またはユニットが1つだけの場合はそれ
    let printed = match unit {
        Some(id) => Some(
            assembly
                .get(id)
                .ok_or_else(|| anyhow!("unit '{}' is not part of the deployment", id))?,
        ),
        None if assembly.units.len() == 1 => assembly.units.first(),
        None => None,
    };

    let out_dir = out.unwrap_or_else(|| project.settings.out_dir.clone());
    let manifest = AssemblyStore::new(&out_dir).save(&assembly).await?;
    info!(
        out_dir = %out_dir.display(),
        units = manifest.units.len(),
        resources = assembly.resource_count(),
        "Wrote cloud assembly"
    );

    eprintln!(
        "{} {} unit(s) into {}",
        "✓ Synthesized".green().bold(),
        manifest.units.len(),
        out_dir.display().to_string().cyan()
    );
    for entry in &manifest.units {
        eprintln!("  - {} ({})", entry.id.cyan(), entry.template_file);
    }

    if let Some(unit) = printed {
        let format = format.unwrap_or(project.settings.format);
        println!("{}", render(&unit.template, format)?);
    }
    Ok(())
}

pub fn render(template: &Value, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(template)?,
        OutputFormat::Yaml => serde_yaml::to_string(template)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_formats() {
        let template = json!({
            "AWSTemplateFormatVersion": "2010-09-09",
            "Resources": { "Vpc": { "Type": "AWS::EC2::VPC" } }
        });

        let as_json = render(&template, OutputFormat::Json).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&as_json).unwrap(), template);

        let as_yaml = render(&template, OutputFormat::Yaml).unwrap();
        assert!(as_yaml.contains("Type: AWS::EC2::VPC"));
    }
}
