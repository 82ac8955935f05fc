//! Form commands: schema, validate and submit

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use crm_form_actions::api::client::HttpGateway;
use crm_form_actions::api::gateway::CrmGateway;
use crm_form_actions::api::memory::InMemoryGateway;
use crm_form_actions::api::operations::Operation;
use crm_form_actions::config::Config;
use crm_form_actions::files::LocalFileStore;
use crm_form_actions::form::{Form, Submission};
use crm_form_actions::pipeline::{FormProcessor, SubmissionOutcome};
use std::path::PathBuf;
use std::sync::Arc;

/// Where CRM calls go
#[derive(Args, Clone)]
pub struct GatewayArgs {
    /// Send calls to the CRM configured in the config file or environment
    #[arg(long, conflicts_with = "seed")]
    pub remote: bool,

    /// Seed the in-memory CRM from this JSON file
    #[arg(long)]
    pub seed: Option<PathBuf>,
}

#[derive(Args)]
pub struct SchemaArgs {
    /// Form definition (TOML)
    pub form: PathBuf,

    #[command(flatten)]
    pub gateway: GatewayArgs,
}

#[derive(Args)]
pub struct FormArgs {
    /// Form definition (TOML)
    pub form: PathBuf,

    /// Submitted values (JSON)
    pub submission: PathBuf,

    #[command(flatten)]
    pub gateway: GatewayArgs,

    /// Print the results as JSON only
    #[arg(long)]
    pub json: bool,
}

/// The configured gateway, plus the in-memory one when that is in use
struct Backend {
    gateway: Arc<dyn CrmGateway>,
    memory: Option<Arc<InMemoryGateway>>,
}

fn backend(args: &GatewayArgs, config: &Config) -> Result<Backend> {
    if args.remote {
        let connection = config.crm_connection()?;
        println!("🌐 Using CRM at {}", connection.url.cyan());
        return Ok(Backend {
            gateway: Arc::new(HttpGateway::new(&connection)?),
            memory: None,
        });
    }

    let memory = Arc::new(match &args.seed {
        Some(path) => InMemoryGateway::from_seed_file(path)?,
        None => InMemoryGateway::new(),
    });
    Ok(Backend {
        gateway: memory.clone(),
        memory: Some(memory),
    })
}

fn processor(backend: &Backend, config: &Config) -> Result<FormProcessor> {
    let files = LocalFileStore::open(&config.files.storage_dir)
        .with_context(|| format!("Failed to open file storage at {:?}", config.files.storage_dir))?;
    Ok(FormProcessor::new(backend.gateway.clone(), Arc::new(files))?.with_settings(config.settings.clone()))
}

pub async fn handle_schema_command(args: SchemaArgs, config: &Config) -> Result<()> {
    let form = Form::load(&args.form)?;
    let backend = backend(&args.gateway, config)?;
    let schema = processor(&backend, config)?.load(&form).await?;
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

pub async fn handle_validate_command(args: FormArgs, config: &Config) -> Result<()> {
    let form = Form::load(&args.form)?;
    let submission = Submission::load(&args.submission)?;
    let backend = backend(&args.gateway, config)?;
    let errors = processor(&backend, config)?.validate(&form, &submission).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&errors)?);
        return Ok(());
    }
    if errors.is_empty() {
        println!("{} Submission is valid for form {}", "✓".bright_green().bold(), form.id.bright_yellow());
        return Ok(());
    }
    println!("{} Submission rejected by form {}:", "✗".bright_red().bold(), form.id.bright_yellow());
    for error in errors.errors() {
        println!("  {} {}: {}", error.alias.bold(), error.field.cyan(), error.message.red());
    }
    Ok(())
}

pub async fn handle_submit_command(args: FormArgs, config: &Config) -> Result<()> {
    let form = Form::load(&args.form)?;
    let submission = Submission::load(&args.submission)?;
    let backend = backend(&args.gateway, config)?;
    let outcome = processor(&backend, config)?.submit(&form, &submission).await?;

    let report = match outcome {
        SubmissionOutcome::Rejected(errors) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&errors)?);
            } else {
                println!("{} {}", "✗".bright_red().bold(), errors.to_string().red());
            }
            return Ok(());
        }
        SubmissionOutcome::Completed(report) => report,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.to_value())?);
        return Ok(());
    }

    println!("{} Form {} submitted", "✓".bright_green().bold(), form.id.bright_yellow());
    for (alias, result) in report.results.by_alias() {
        match result.id {
            Some(id) => println!("  {} {} {}", alias.bold(), result.entity_key.dimmed(), id.to_string().green()),
            None => println!("  {} {} {}", alias.bold(), result.entity_key.dimmed(), "nothing written".yellow()),
        }
    }
    if let Some(url) = &report.redirect {
        println!("↪️  Redirect to {}", url.cyan());
    }
    for alias in &report.not_run {
        println!("  {} {}", alias.bold(), "not run".dimmed());
    }

    if let Some(memory) = &backend.memory {
        let operations = memory.operations();
        println!();
        println!("📝 {} CRM calls", operations.len());
        for operation in &operations {
            let target = match operation {
                Operation::Create { entity, .. } | Operation::Delete { entity, .. } => entity.clone(),
                Operation::Update { entity, id, .. } => format!("{} {}", entity, id),
                Operation::SendEmail { .. } => "message template".to_string(),
                Operation::Attach { entity_table, entity_id, .. } => format!("{} {}", entity_table, entity_id),
                Operation::NotifyAssignees { activity_id, .. } => format!("activity {}", activity_id),
            };
            println!("  {} {}", operation.operation_type().cyan(), target);
        }
    }
    Ok(())
}
