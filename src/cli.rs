use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show failures
    Quiet,
    #[default]
    Normal,
    /// Show every file and violation
    Verbose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
    Summary,
}

/// Load, inspect and validate XML ORM mapping documents
#[derive(Parser, Debug, Clone)]
#[command(name = "xml-mapping")]
#[command(about = "Load and validate XML object-relational mapping documents")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding mapping documents (repeatable, searched in order)
    #[arg(short = 'm', long = "mapping-dir", global = true, action = clap::ArgAction::Append)]
    pub mapping_dirs: Vec<PathBuf>,

    /// Mapping file name suffix
    #[arg(long = "extension", global = true)]
    pub extension: Option<String>,

    /// XSD to validate against instead of the bundled one
    #[arg(long = "schema", global = true)]
    pub schema: Option<PathBuf>,

    /// Load mappings without validating them against the XSD first
    #[arg(long = "no-schema-validation", global = true)]
    pub no_schema_validation: bool,

    /// Number of concurrent validations
    #[arg(short = 't', long = "threads", global = true)]
    pub threads: Option<usize>,

    /// Per-file validation timeout in seconds
    #[arg(long = "timeout", global = true)]
    pub timeout: Option<u64>,

    /// Stop after the first failing file
    #[arg(long = "fail-fast", global = true)]
    pub fail_fast: bool,

    #[arg(short = 'f', long = "format", value_enum, global = true)]
    pub output_format: Option<OutputFormat>,

    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Only report failures
    #[arg(short = 'q', long = "quiet", global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Include file patterns (glob syntax)
    #[arg(long = "include", global = true, action = clap::ArgAction::Append)]
    pub include_patterns: Vec<String>,

    /// Exclude file patterns (glob syntax)
    #[arg(long = "exclude", global = true, action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Maximum directory depth when discovering files
    #[arg(long = "max-depth", global = true)]
    pub max_depth: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Validate mapping documents against the XSD
    Validate {
        /// File or directory (defaults to the mapping directories)
        path: Option<PathBuf>,

        /// TOML file listing the violations each invalid file must produce
        #[arg(long = "expect")]
        expect: Option<PathBuf>,
    },

    /// Print the metadata loaded for one class
    Inspect {
        /// Class name, e.g. Models.Cms.Article
        class: String,
    },

    /// Load every class and check the mappings against each other
    Check,

    /// List mapped class names
    Classes,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(threads) = self.threads
            && threads == 0
        {
            return Err("Number of threads must be greater than 0".to_string());
        }
        if let Command::Validate {
            path: Some(path), ..
        } = &self.command
            && !path.exists()
        {
            return Err(format!("Path does not exist: {}", path.display()));
        }
        Ok(())
    }
}
