use super::commands::form::{FormArgs, SchemaArgs};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "crm-form-actions")]
#[command(about = "Run form submissions through CRM form actions")]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the field and settings schema of every action in a form
    Schema(SchemaArgs),
    /// Validate a submission without writing anything
    Validate(FormArgs),
    /// Validate a submission, then run every action
    Submit(FormArgs),
}
