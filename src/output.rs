//! Output formatting for validation runs, loaded metadata and mapping checks
//!
//! Every report comes in three formats: human-readable text (colored when
//! stdout is a terminal), JSON, and a one-line summary.

use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::factory::MappingIssue;
use crate::metadata::{AssociationMapping, ClassMetadata};
use crate::validator::{
    ExpectationOutcome, FileValidationResult, PerformanceMetrics, ValidationResults,
    ValidationStatus,
};

/// Formats reports for stdout
pub struct Output {
    verbosity: VerbosityLevel,
    format: OutputFormat,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel, format: OutputFormat) -> Self {
        Self {
            verbosity,
            format,
            show_colors: format == OutputFormat::Human && atty::is(atty::Stream::Stdout),
        }
    }

    /// Disable ANSI colors regardless of the terminal
    pub fn without_colors(mut self) -> Self {
        self.show_colors = false;
        self
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_results(&self, results: &ValidationResults) -> String {
        match self.format {
            OutputFormat::Json => self.format_results_json(results),
            OutputFormat::Summary => format!(
                "{} files: {} valid, {} invalid, {} errors, {} skipped, {} unmet expectations",
                results.total_files,
                results.valid_files,
                results.invalid_files,
                results.error_files,
                results.skipped_files,
                results.expectation_mismatches
            ),
            OutputFormat::Human => self.format_results_human(results),
        }
    }

    fn format_results_human(&self, results: &ValidationResults) -> String {
        let mut output = String::new();

        for file_result in &results.file_results {
            let show = match self.verbosity {
                VerbosityLevel::Quiet => file_result.is_failure(),
                VerbosityLevel::Normal => {
                    file_result.is_failure() || !file_result.status.is_valid()
                }
                VerbosityLevel::Verbose => true,
            };
            if show {
                output.push_str(&self.format_file_result(file_result));
                output.push('\n');
            }
        }

        if self.verbosity != VerbosityLevel::Quiet {
            output.push_str(&self.format_summary(results));
        } else if results.has_failures() {
            let _ = writeln!(
                output,
                "Invalid: {} Errors: {} Unmet expectations: {}",
                results.invalid_files, results.error_files, results.expectation_mismatches
            );
        }

        output
    }

    pub fn format_file_result(&self, result: &FileValidationResult) -> String {
        let path_display = result.path.display();
        let duration_str = format_duration(result.duration);

        let mut output = match &result.status {
            ValidationStatus::Valid => format!(
                "{}  {} ({})",
                self.colorize("✓ VALID", "32"),
                path_display,
                duration_str
            ),
            ValidationStatus::Invalid { violation_count } => format!(
                "{}  {} ({}) - {} violation{}",
                self.colorize("✗ INVALID", "31"),
                path_display,
                duration_str,
                violation_count,
                if *violation_count == 1 { "" } else { "s" }
            ),
            ValidationStatus::Error { message } => format!(
                "{}  {} ({}) - {}",
                self.colorize("⚠ ERROR", "33"),
                path_display,
                duration_str,
                message
            ),
            ValidationStatus::Skipped { reason } => format!(
                "{}  {} - {}",
                self.colorize("- SKIPPED", "36"),
                path_display,
                reason
            ),
        };

        match &result.expectation {
            Some(ExpectationOutcome::Met) if !result.violations.is_empty() => {
                output.push_str(" [as expected]");
            }
            Some(ExpectationOutcome::Mismatch { reason }) => {
                let _ = write!(
                    output,
                    "\n    {} {}",
                    self.colorize("unmet expectation:", "31"),
                    reason
                );
            }
            _ => {}
        }

        let show_violations = self.verbosity == VerbosityLevel::Verbose
            || (self.verbosity == VerbosityLevel::Normal && result.is_failure());
        if show_violations {
            for violation in &result.violations {
                let _ = write!(output, "\n    line {}: {}", violation.line, violation.message);
            }
        }

        output
    }

    fn format_summary(&self, results: &ValidationResults) -> String {
        let mut output = String::new();
        output.push_str("Validation Summary:\n");
        let _ = writeln!(output, "  Total files: {}", results.total_files);
        let _ = writeln!(output, "  {} {}", self.colorize("Valid:", "32"), results.valid_files);

        if results.invalid_files > 0 {
            let _ = writeln!(
                output,
                "  {} {}",
                self.colorize("Invalid:", "31"),
                results.invalid_files
            );
        }
        if results.error_files > 0 {
            let _ = writeln!(
                output,
                "  {} {}",
                self.colorize("Errors:", "33"),
                results.error_files
            );
        }
        if results.skipped_files > 0 {
            let _ = writeln!(
                output,
                "  {} {}",
                self.colorize("Skipped:", "36"),
                results.skipped_files
            );
        }
        if results.expectation_mismatches > 0 {
            let _ = writeln!(
                output,
                "  {} {}",
                self.colorize("Unmet expectations:", "31"),
                results.expectation_mismatches
            );
        }

        let _ = writeln!(output, "  Success rate: {:.1}%", results.success_rate());
        let _ = writeln!(
            output,
            "  Duration: {}",
            format_duration(results.performance_metrics.total_duration)
        );

        if self.verbosity == VerbosityLevel::Verbose {
            output.push_str(&format_performance_metrics(&results.performance_metrics));
        }

        output
    }

    fn format_results_json(&self, results: &ValidationResults) -> String {
        let files: Vec<_> = results
            .file_results
            .iter()
            .map(|file| {
                json!({
                    "path": file.path,
                    "status": status_label(&file.status),
                    "message": match &file.status {
                        ValidationStatus::Error { message } => Some(message.as_str()),
                        ValidationStatus::Skipped { reason } => Some(reason.as_str()),
                        _ => None,
                    },
                    "duration_ms": file.duration.as_millis() as u64,
                    "violations": file.violations,
                    "expectation": file.expectation,
                })
            })
            .collect();

        to_json(&json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "summary": {
                "total_files": results.total_files,
                "valid_files": results.valid_files,
                "invalid_files": results.invalid_files,
                "error_files": results.error_files,
                "skipped_files": results.skipped_files,
                "expectation_mismatches": results.expectation_mismatches,
                "success_rate": results.success_rate(),
                "duration_ms": results.performance_metrics.total_duration.as_millis() as u64,
            },
            "files": files,
        }))
    }

    /// Report for `inspect`
    pub fn format_metadata(&self, metadata: &ClassMetadata) -> String {
        match self.format {
            OutputFormat::Json => to_json(metadata),
            OutputFormat::Summary => format!(
                "{} ({}): {} fields, {} associations, {} embedded",
                metadata.name,
                label(&metadata.kind),
                metadata.field_mappings.len(),
                metadata.association_mappings.len(),
                metadata.embedded_classes.len()
            ),
            OutputFormat::Human => self.format_metadata_human(metadata),
        }
    }

    fn format_metadata_human(&self, metadata: &ClassMetadata) -> String {
        let mut output = String::new();
        let _ = writeln!(
            output,
            "{} ({})",
            self.colorize(&metadata.name, "1"),
            label(&metadata.kind)
        );

        if !metadata.is_embedded_class() {
            match &metadata.table.schema {
                Some(schema) => {
                    let _ = writeln!(output, "  Table: {}.{}", schema, metadata.table.name);
                }
                None => {
                    let _ = writeln!(output, "  Table: {}", metadata.table.name);
                }
            }
        }
        if let Some(repository) = &metadata.repository_class {
            let _ = writeln!(output, "  Repository: {}", repository);
        }
        if metadata.read_only {
            output.push_str("  Read-only\n");
        }
        if !metadata.identifier.is_empty() {
            let _ = writeln!(
                output,
                "  Identifier: {} (generator {})",
                metadata.identifier.join(", "),
                label(&metadata.generator_type)
            );
        }
        if let Some(sequence) = &metadata.sequence_generator {
            let _ = writeln!(
                output,
                "  Sequence: {} (allocation {}, initial {})",
                sequence.sequence_name, sequence.allocation_size, sequence.initial_value
            );
        }

        if !metadata.is_inheritance_type_none() {
            let _ = writeln!(output, "  Inheritance: {}", label(&metadata.inheritance_type));
            if let Some(column) = &metadata.discriminator_column {
                let _ = writeln!(
                    output,
                    "  Discriminator: {} ({}{})",
                    column.name,
                    column.type_name,
                    column
                        .length
                        .map(|length| format!(", length {}", length))
                        .unwrap_or_default()
                );
            }
            for (value, class) in &metadata.discriminator_map {
                let _ = writeln!(output, "    {} => {}", value, class);
            }
        }
        if let Some(cache) = &metadata.cache {
            let _ = writeln!(output, "  Cache: {} region {}", label(&cache.usage), cache.region);
        }

        if !metadata.field_mappings.is_empty() {
            output.push_str("  Fields:\n");
            for field in metadata.field_mappings.values() {
                let mut flags = Vec::new();
                if field.id {
                    flags.push("id");
                }
                if field.version {
                    flags.push("version");
                }
                if field.nullable {
                    flags.push("nullable");
                }
                if field.unique {
                    flags.push("unique");
                }
                let _ = write!(
                    output,
                    "    {}: {} column {}",
                    field.field_name, field.type_name, field.column_name
                );
                if let Some(length) = field.length {
                    let _ = write!(output, " length {}", length);
                }
                if !flags.is_empty() {
                    let _ = write!(output, " [{}]", flags.join(", "));
                }
                output.push('\n');
            }
        }

        if !metadata.association_mappings.is_empty() {
            output.push_str("  Associations:\n");
            for association in metadata.association_mappings.values() {
                output.push_str(&format_association(association));
            }
        }

        if !metadata.embedded_classes.is_empty() {
            output.push_str("  Embedded:\n");
            for (field, embedded) in &metadata.embedded_classes {
                let prefix = embedded
                    .column_prefix
                    .resolve(field)
                    .map(|prefix| format!("prefix {}", prefix))
                    .unwrap_or_else(|| "no prefix".to_string());
                let _ = writeln!(output, "    {}: {} ({})", field, embedded.class, prefix);
            }
        }

        if !metadata.lifecycle_callbacks.is_empty() {
            output.push_str("  Lifecycle callbacks:\n");
            for (event, methods) in &metadata.lifecycle_callbacks {
                let _ = writeln!(output, "    {}: {}", label(event), methods.join(", "));
            }
        }

        output
    }

    /// Report for `check`
    pub fn format_issues(&self, issues: &[MappingIssue], classes_checked: usize) -> String {
        match self.format {
            OutputFormat::Json => to_json(&json!({
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "classes_checked": classes_checked,
                "issues": issues,
            })),
            OutputFormat::Summary => {
                format!("{} classes: {} issues", classes_checked, issues.len())
            }
            OutputFormat::Human => {
                let mut output = String::new();
                for issue in issues {
                    let _ = writeln!(output, "{} {}", self.colorize("✗", "31"), issue);
                }
                if issues.is_empty() {
                    if self.verbosity != VerbosityLevel::Quiet {
                        let _ = writeln!(
                            output,
                            "{} {} classes checked, mappings are consistent",
                            self.colorize("✓", "32"),
                            classes_checked
                        );
                    }
                } else {
                    let _ = writeln!(
                        output,
                        "{} issue{} in {} classes",
                        issues.len(),
                        if issues.len() == 1 { "" } else { "s" },
                        classes_checked
                    );
                }
                output
            }
        }
    }

    /// Report for `classes`
    pub fn format_class_names(&self, class_names: &[String]) -> String {
        match self.format {
            OutputFormat::Json => to_json(&json!({ "classes": class_names })),
            OutputFormat::Summary => format!("{} mapped classes", class_names.len()),
            OutputFormat::Human => {
                let mut output = String::new();
                for name in class_names {
                    output.push_str(name);
                    output.push('\n');
                }
                output
            }
        }
    }
}

fn format_association(association: &AssociationMapping) -> String {
    let mut output = format!(
        "    {}: {} {}",
        association.field_name,
        label(&association.kind),
        association.target_entity
    );

    if let Some(mapped_by) = &association.mapped_by {
        let _ = write!(output, " mapped-by {}", mapped_by);
    }
    if let Some(inversed_by) = &association.inversed_by {
        let _ = write!(output, " inversed-by {}", inversed_by);
    }
    if association.id {
        output.push_str(" [id]");
    }
    if !association.join_columns.is_empty() {
        let columns: Vec<_> = association
            .join_columns
            .iter()
            .map(|column| format!("{} -> {}", column.name, column.referenced_column_name))
            .collect();
        let _ = write!(output, " join columns ({})", columns.join(", "));
    }
    if let Some(join_table) = &association.join_table {
        let _ = write!(output, " join table {}", join_table.name);
    }
    if let Some(cache) = &association.cache {
        let _ = write!(output, " cache {} region {}", label(&cache.usage), cache.region);
    }
    output.push('\n');
    output
}

fn format_performance_metrics(metrics: &PerformanceMetrics) -> String {
    let mut output = String::new();
    output.push_str("\nPerformance Metrics:\n");
    let _ = writeln!(
        output,
        "  Discovery: {}",
        format_duration(metrics.discovery_duration)
    );
    let _ = writeln!(
        output,
        "  Throughput: {:.1} files/sec",
        metrics.throughput_files_per_second
    );
    let _ = writeln!(
        output,
        "  Concurrent validations: {}",
        metrics.concurrent_validations
    );
    output
}

fn status_label(status: &ValidationStatus) -> &'static str {
    match status {
        ValidationStatus::Valid => "valid",
        ValidationStatus::Invalid { .. } => "invalid",
        ValidationStatus::Error { .. } => "error",
        ValidationStatus::Skipped { .. } => "skipped",
    }
}

/// The serialized name of a unit enum variant
fn label<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| json!({ "error": e.to_string() }).to_string())
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libxml2::SchemaViolation;
    use crate::metadata::{AssociationKind, FieldMapping};
    use std::path::PathBuf;

    fn create_test_results() -> ValidationResults {
        let mut expected = FileValidationResult::invalid(
            PathBuf::from("Models.Invalid.BadBoolean.orm.xml"),
            vec![SchemaViolation::new(
                5,
                "Element 'field', attribute 'nullable': 'yes' is not a valid value",
            )],
            Duration::from_millis(3),
        );
        expected.expectation = Some(ExpectationOutcome::Met);

        ValidationResults::aggregate(vec![
            FileValidationResult::valid(
                PathBuf::from("Models.Cms.Article.orm.xml"),
                Duration::from_millis(2),
            ),
            expected,
        ])
    }

    fn output(verbosity: VerbosityLevel, format: OutputFormat) -> Output {
        Output::new(verbosity, format).without_colors()
    }

    #[test]
    fn test_output_summary() {
        let formatted = output(VerbosityLevel::Normal, OutputFormat::Human)
            .format_results(&create_test_results());

        assert!(formatted.contains("Validation Summary:"));
        assert!(formatted.contains("Total files: 2"));
        assert!(formatted.contains("✗ INVALID  Models.Invalid.BadBoolean.orm.xml"));
        assert!(formatted.contains("[as expected]"));
        assert!(!formatted.contains("✓ VALID"));
    }

    #[test]
    fn test_verbose_lists_violations() {
        let formatted = output(VerbosityLevel::Verbose, OutputFormat::Human)
            .format_results(&create_test_results());

        assert!(formatted.contains("✓ VALID  Models.Cms.Article.orm.xml"));
        assert!(formatted.contains("line 5: Element 'field', attribute 'nullable'"));
        assert!(formatted.contains("Performance Metrics:"));
    }

    #[test]
    fn test_quiet_without_failures_prints_nothing() {
        let formatted = output(VerbosityLevel::Quiet, OutputFormat::Human)
            .format_results(&create_test_results());
        assert!(formatted.is_empty());
    }

    #[test]
    fn test_json_results() {
        let formatted = output(VerbosityLevel::Normal, OutputFormat::Json)
            .format_results(&create_test_results());
        let value: serde_json::Value = serde_json::from_str(&formatted).unwrap();

        assert_eq!(value["summary"]["total_files"], 2);
        assert_eq!(value["summary"]["invalid_files"], 1);
        assert_eq!(value["files"][1]["status"], "invalid");
        assert_eq!(value["files"][1]["violations"][0]["line"], 5);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_summary_line() {
        let formatted = output(VerbosityLevel::Normal, OutputFormat::Summary)
            .format_results(&create_test_results());
        assert_eq!(
            formatted,
            "2 files: 1 valid, 1 invalid, 0 errors, 0 skipped, 0 unmet expectations"
        );
    }

    #[test]
    fn test_metadata_report() {
        let mut metadata = ClassMetadata::new("Models.Cms.Article");
        let mut id = FieldMapping::new("id");
        id.type_name = "integer".to_string();
        id.id = true;
        metadata.map_field(id).unwrap();
        metadata
            .map_association(AssociationMapping::new(
                "author",
                AssociationKind::ManyToOne,
                "Models.Cms.User",
            ))
            .unwrap();
        metadata.set_identifier(vec!["id".to_string()]).unwrap();

        let formatted = output(VerbosityLevel::Normal, OutputFormat::Human).format_metadata(&metadata);

        assert!(formatted.starts_with("Models.Cms.Article (entity)"));
        assert!(formatted.contains("Table: Article"));
        assert!(formatted.contains("Identifier: id"));
        assert!(formatted.contains("id: integer column id [id]"));
        assert!(formatted.contains("author: many-to-one Models.Cms.User"));

        let json = output(VerbosityLevel::Normal, OutputFormat::Json).format_metadata(&metadata);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["name"], "Models.Cms.Article");
        assert_eq!(value["kind"], "entity");
    }

    #[test]
    fn test_issue_report() {
        let issues = vec![MappingIssue {
            class_name: "Models.Cms.Comment".to_string(),
            message: "The target entity 'Models.Cms.Missing' specified on Models.Cms.Comment#post is unknown or not an entity.".to_string(),
        }];
        let out = output(VerbosityLevel::Normal, OutputFormat::Human);

        let formatted = out.format_issues(&issues, 3);
        assert!(formatted.contains("[Models.Cms.Comment] The target entity"));
        assert!(formatted.contains("1 issue in 3 classes"));

        assert!(out.format_issues(&[], 3).contains("3 classes checked"));
    }

    #[test]
    fn test_class_names() {
        let names = vec!["A".to_string(), "B.C".to_string()];
        assert_eq!(
            output(VerbosityLevel::Normal, OutputFormat::Human).format_class_names(&names),
            "A\nB.C\n"
        );
        assert_eq!(
            output(VerbosityLevel::Normal, OutputFormat::Summary).format_class_names(&names),
            "2 mapped classes"
        );
    }
}
