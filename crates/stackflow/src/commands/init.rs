use anyhow::bail;
use colored::Colorize;

const FILE_NAME: &str = "stackflow.kdl";

/// 4ユニット構成のひな形
pub const STARTER: &str = r#"// StackFlow deployment
project "{{ project }}"

variables {
    project "my-app"
    environment "dev"
    region "us-east-1"
}

target "primary" region="{{ region }}"

network "network" {
    name "{{ project }}-vpc"
    cidr "10.0.0.0/16"
    zones "{{ region }}a" "{{ region }}b" "{{ region }}c"
}

security "security" network="network"

load-balancer "elb" network="network" security="security"

backend "backend" network="network" security="security" load-balancer="elb" {
    resource-prefix "{{ project }}"
    environment "{{ environment }}"
    db-name "app"
    db-engine-version "15.3"
}
"#;

pub async fn handle(force: bool) -> anyhow::Result<()> {
    let path = std::env::current_dir()?.join(FILE_NAME);
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    tokio::fs::write(&path, STARTER).await?;
    println!(
        "{} {}",
        "✓ Created".green().bold(),
        path.display().to_string().cyan()
    );
    println!();
    println!("Next steps:");
    println!("  stackflow validate");
    println!("  stackflow synth");
    Ok(())
}
