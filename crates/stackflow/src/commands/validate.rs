use crate::project::Project;
use anyhow::Context;
use colored::Colorize;

pub fn handle(project: &Project) -> anyhow::Result<()> {
    println!("{}", "Validating deployment...".blue());
    println!("File: {}", project.path.display().to_string().cyan());

    let composition = project.compose()?;
    let assembly = composition.app.synth().context("synthesis failed")?;

    println!("{}", "✓ Deployment is valid".green().bold());
    println!();
    println!("Summary:");
    println!("  Targets: {}", project.deployment.targets.len());
    for (name, target) in &project.deployment.targets {
        println!("    - {} ({})", name.cyan(), target);
    }
    println!("  Units: {}", assembly.units.len());
    for unit in &assembly.units {
        println!(
            "    - {} ({} resources)",
            unit.id.cyan(),
            unit.resource_count()
        );
    }
    println!("  Resources: {}", assembly.resource_count());
    Ok(())
}
