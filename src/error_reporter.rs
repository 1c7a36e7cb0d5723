use std::path::Path;

use crate::cli::VerbosityLevel;
use crate::config::ConfigError;
use crate::error::MappingError;

/// Writes errors and progress to stderr with configurable verbosity
pub struct ErrorReporter {
    verbosity: VerbosityLevel,
    show_timestamps: bool,
}

impl ErrorReporter {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_timestamps: false,
        }
    }

    pub fn with_timestamps(mut self, show_timestamps: bool) -> Self {
        self.show_timestamps = show_timestamps;
        self
    }

    pub fn report_error(&self, error: &MappingError) {
        if self.verbosity == VerbosityLevel::Quiet && !self.is_critical_error(error) {
            return;
        }
        eprintln!("{}", self.format_error(error));
    }

    pub fn report_config_error(&self, error: &ConfigError) {
        eprintln!("{}", self.format_config_error(error));
    }

    /// Report progress for long-running operations
    pub fn report_progress(&self, current: usize, total: usize, current_file: Option<&Path>) {
        if self.verbosity == VerbosityLevel::Quiet || total == 0 {
            return;
        }

        let percentage = (current as f64 / total as f64 * 100.0) as u32;
        match (self.verbosity, current_file) {
            (VerbosityLevel::Verbose, Some(file)) => eprint!(
                "\rProgress: {}/{} ({}%) - {}",
                current,
                total,
                percentage,
                file.display()
            ),
            _ => eprint!("\rProgress: {}/{} ({}%)", current, total, percentage),
        }

        if current == total {
            eprintln!();
        }
    }

    /// Errors that stop the whole run rather than a single document
    pub fn is_critical_error(&self, error: &MappingError) -> bool {
        matches!(
            error,
            MappingError::Config(_)
                | MappingError::SchemaParsing { .. }
                | MappingError::LibXml2Internal { .. }
                | MappingError::Concurrency { .. }
        )
    }

    pub fn format_error(&self, error: &MappingError) -> String {
        let timestamp = if self.show_timestamps {
            format!("[{}] ", chrono::Utc::now().format("%H:%M:%S"))
        } else {
            String::new()
        };

        if self.verbosity == VerbosityLevel::Quiet {
            return format!("{}error: {}", timestamp, error);
        }

        let mut output = format!("{}{}", timestamp, error);

        if let MappingError::SchemaViolation { file, violations } = error {
            for violation in violations {
                output.push_str(&format!(
                    "\n  {}:{}: {}",
                    file.display(),
                    violation.line,
                    violation.message
                ));
            }
        }

        if self.verbosity == VerbosityLevel::Verbose {
            if let Some(suggestion) = suggestion_for(error) {
                output.push_str(&format!("\nSuggestion: {}", suggestion));
            }

            let mut current: &dyn std::error::Error = error;
            while let Some(source) = current.source() {
                output.push_str(&format!("\nCaused by: {}", source));
                current = source;
            }
        }

        output
    }

    pub fn format_config_error(&self, error: &ConfigError) -> String {
        if self.verbosity == VerbosityLevel::Quiet {
            return format!("Config error: {}", error);
        }

        let help = match error {
            ConfigError::Io(_) => "Check that the configuration file exists and is readable",
            ConfigError::TomlParsing(_) | ConfigError::JsonParsing(_) => {
                "Check the configuration file syntax (TOML/JSON format expected)"
            }
            ConfigError::Validation(_) => "Fix the configuration value named above",
            ConfigError::Environment(_) => "Fix or unset the XML_MAPPING_* variable named above",
            ConfigError::UnsupportedFormat(_) => "Use a .toml or .json configuration file",
        };
        format!("Configuration Error: {}\n{}", error, help)
    }
}

fn suggestion_for(error: &MappingError) -> Option<&'static str> {
    let suggestion = match error {
        MappingError::MappingNotFound { .. } => {
            "Add the mapping directory with --mapping-dir or check the file extension"
        }
        MappingError::NotMappedClass { .. } => {
            "The mapping file must declare the class in an <entity>, <mapped-superclass> or <embeddable> element"
        }
        MappingError::InvalidXml { .. } => "Check the XML syntax of the mapping document",
        MappingError::SchemaViolation { .. } => {
            "Run `xml-mapping validate` on the file to list every violation"
        }
        MappingError::NonCacheableAssociation { .. } => {
            "Add a <cache> element to the association or remove it from the class"
        }
        MappingError::IdentifierRequired { .. } => "Declare at least one <id> for the entity",
        MappingError::MissingDiscriminatorMap { .. } => {
            "Add a <discriminator-map> listing every class of the hierarchy"
        }
        MappingError::SchemaParsing { .. } => "Check the XSD passed with --schema",
        _ => return None,
    };
    Some(suggestion)
}
