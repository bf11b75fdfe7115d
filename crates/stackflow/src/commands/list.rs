use crate::project::Project;
use colored::Colorize;

pub fn handle(project: &Project) -> anyhow::Result<()> {
    let composition = project.compose()?;
    let graph = composition.app.dependency_graph();
    let order = composition.app.deployment_order()?;

    println!("{} {}", "Project:".bold(), project.deployment.project.cyan());
    for (index, unit) in order.iter().enumerate() {
        let kind = project
            .deployment
            .unit(unit.id())
            .map(|spec| spec.kind.as_str())
            .unwrap_or("-");
        println!(
            "{:>3}. {} [{}] {} ({} resources)",
            index + 1,
            unit.id().cyan(),
            kind,
            unit.target(),
            unit.resources().len()
        );
        let dependencies = graph.dependencies_of(unit.id());
        if !dependencies.is_empty() {
            println!("     depends on: {}", dependencies.join(", "));
        }
    }
    Ok(())
}
