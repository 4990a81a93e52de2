use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

// `#[zbus::proxy]` generates `ReuniteProxy` (async); the daemon owns the
// models, the registry, and the provider clients — the CLI only ships bytes.
#[zbus::proxy(
    interface = "org.reunite.Reunite1",
    default_service = "org.reunite.Reunite1",
    default_path = "/org/reunite/Reunite1"
)]
trait Reunite {
    async fn enroll(&self, name: &str, image: &[u8]) -> zbus::Result<String>;
    async fn find_matches(&self, image: &[u8]) -> zbus::Result<String>;
    async fn list_identities(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "reunite", about = "Reunite missing-person matching CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a missing person from a photo
    Enroll {
        /// Display name of the person
        #[arg(short, long)]
        name: String,
        /// Path to the photo (png/jpeg)
        image: PathBuf,
    },
    /// Match a found photo against enrolled identities and the external feed
    Find {
        /// Path to the found photo
        image: PathBuf,
    },
    /// List enrolled identities
    List,
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("connecting to the session bus — is reunited running?")?;
    let proxy = ReuniteProxy::new(&conn).await?;

    match cli.command {
        Commands::Enroll { name, image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let reply = proxy.enroll(&name, &bytes).await?;
            let doc: serde_json::Value = serde_json::from_str(&reply)?;
            match doc["outcome"].as_str() {
                Some("enrolled") => {
                    println!(
                        "Enrolled {} (key: {})",
                        doc["display_name"].as_str().unwrap_or(&name),
                        doc["key"].as_str().unwrap_or("?")
                    );
                    if let Some(path) = doc["reference_image"].as_str() {
                        println!("Reference image stored at {path}");
                    }
                }
                Some("no_face_detected") => {
                    println!("No face detected in the photo — nothing was stored.");
                }
                _ => println!("{reply}"),
            }
        }
        Commands::Find { image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let reply = proxy.find_matches(&bytes).await?;
            let doc: serde_json::Value = serde_json::from_str(&reply)?;
            match doc["outcome"].as_str() {
                Some("ranked") => print_report(&doc),
                Some("no_face_detected") => {
                    println!("No face detected in the photo — nothing to match against.");
                }
                _ => println!("{reply}"),
            }
        }
        Commands::List => {
            let reply = proxy.list_identities().await?;
            let doc: serde_json::Value = serde_json::from_str(&reply)?;
            let entries = doc.as_array().cloned().unwrap_or_default();
            if entries.is_empty() {
                println!("No identities enrolled.");
            }
            for entry in entries {
                println!(
                    "{}  {}  {}",
                    entry["key"].as_str().unwrap_or("?"),
                    entry["display_name"].as_str().unwrap_or("?"),
                    entry["reference_image"].as_str().unwrap_or("?"),
                );
            }
        }
        Commands::Status => {
            let reply = proxy.status().await?;
            let doc: serde_json::Value = serde_json::from_str(&reply)?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
    }

    Ok(())
}

fn print_report(doc: &serde_json::Value) {
    for advisory in doc["advisories"].as_array().into_iter().flatten() {
        if let Some(text) = advisory.as_str() {
            println!("warning: {text}");
        }
    }

    let candidates = doc["candidates"].as_array().cloned().unwrap_or_default();
    if candidates.is_empty() {
        println!("No matches found.");
        return;
    }

    for (i, c) in candidates.iter().enumerate() {
        let label = c["label"].as_str().unwrap_or("?");
        let name = c["display_name"].as_str();
        let source = c["source"].as_str().unwrap_or("?");
        let evidence = c["evidence"].as_str().unwrap_or("?");
        let confidence = match c["confidence"].as_f64() {
            Some(pct) => format!("{pct:.2}%"),
            None => "unscored".to_string(),
        };

        match name {
            Some(name) => {
                println!("{:>3}. {name} ({label})  {confidence}  [{source}]  {evidence}", i + 1)
            }
            None => println!("{:>3}. {label}  {confidence}  [{source}]  {evidence}", i + 1),
        }
    }
}
