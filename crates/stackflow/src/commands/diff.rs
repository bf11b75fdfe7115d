use crate::project::Project;
use anyhow::Context;
use colored::Colorize;
use stackflow_core::{AssemblyStore, ChangeType, diff_assemblies};
use std::path::PathBuf;
use tracing::debug;

pub async fn handle(project: &Project, out: Option<PathBuf>) -> anyhow::Result<()> {
    let composition = project.compose()?;
    let current = composition.app.synth().context("synthesis failed")?;

    let out_dir = out.unwrap_or_else(|| project.settings.out_dir.clone());
    let previous = AssemblyStore::new(&out_dir).load().await?;
    if previous.is_none() {
        println!(
            "{}",
            format!("No previous synth in {}", out_dir.display()).yellow()
        );
    }

    let plan = diff_assemblies(previous.as_ref(), &current);
    debug!(changes = plan.changes.len(), "Computed plan");
    for change in &plan.changes {
        match change.change_type {
            ChangeType::Create => println!(
                "  {} {} ({})",
                "+".green().bold(),
                change.id().green(),
                change.resource_type
            ),
            ChangeType::Update => println!(
                "  {} {} [{}]",
                "~".yellow().bold(),
                change.id().yellow(),
                change.changed.join(", ")
            ),
            ChangeType::Delete => println!(
                "  {} {} ({})",
                "-".red().bold(),
                change.id().red(),
                change.resource_type
            ),
            ChangeType::NoOp => {}
        }
    }

    println!();
    if plan.has_changes {
        println!("{} {}", "Plan:".bold(), plan.summary());
    } else {
        println!("{}", "No changes.".green());
    }
    Ok(())
}
