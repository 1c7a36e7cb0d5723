//! Concurrent schema validation of mapping documents
//!
//! Files are discovered asynchronously, then validated in tokio tasks bounded
//! by a semaphore. The libxml2 call itself runs on the blocking pool so the
//! runtime keeps serving file reads while documents are being checked.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MappingError, Result};
use crate::expectations::ExpectationSet;
use crate::file_discovery::FileDiscovery;
use crate::libxml2::SchemaViolation;
use crate::schema::MappingSchema;

/// Validation engine settings
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationConfig {
    pub max_concurrent_validations: usize,
    /// Per-file limit, including reading the file
    pub validation_timeout: Duration,
    /// Skip the remaining files after the first failure
    pub fail_fast: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_validations: num_cpus::get(),
            validation_timeout: Duration::from_secs(30),
            fail_fast: false,
        }
    }
}

/// Status of a single file validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Valid,
    /// The document violates the schema
    Invalid { violation_count: usize },
    /// The document could not be checked (unreadable, malformed, timed out)
    Error { message: String },
    Skipped { reason: String },
}

impl ValidationStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationStatus::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidationStatus::Invalid { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ValidationStatus::Error { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ValidationStatus::Skipped { .. })
    }
}

/// Whether a file's violations matched the expected patterns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectationOutcome {
    Met,
    Mismatch { reason: String },
}

/// Result of validating a single file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileValidationResult {
    pub path: PathBuf,
    pub status: ValidationStatus,
    pub duration: Duration,
    /// Violations in the order libxml2 reported them
    pub violations: Vec<SchemaViolation>,
    /// Set when the run compares against an expectation set
    pub expectation: Option<ExpectationOutcome>,
}

impl FileValidationResult {
    pub fn valid(path: PathBuf, duration: Duration) -> Self {
        Self {
            path,
            status: ValidationStatus::Valid,
            duration,
            violations: Vec::new(),
            expectation: None,
        }
    }

    pub fn invalid(path: PathBuf, violations: Vec<SchemaViolation>, duration: Duration) -> Self {
        Self {
            path,
            status: ValidationStatus::Invalid {
                violation_count: violations.len(),
            },
            duration,
            violations,
            expectation: None,
        }
    }

    pub fn error(path: PathBuf, error: MappingError, duration: Duration) -> Self {
        Self {
            path,
            status: ValidationStatus::Error {
                message: error.to_string(),
            },
            duration,
            violations: Vec::new(),
            expectation: None,
        }
    }

    pub fn skipped(path: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            path,
            status: ValidationStatus::Skipped {
                reason: reason.into(),
            },
            duration: Duration::ZERO,
            violations: Vec::new(),
            expectation: None,
        }
    }

    /// File name used to look up expectations
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Whether this file counts as a failure of the run
    pub fn is_failure(&self) -> bool {
        match (&self.status, &self.expectation) {
            (ValidationStatus::Error { .. }, _) => true,
            (_, Some(outcome)) => matches!(outcome, ExpectationOutcome::Mismatch { .. }),
            (status, None) => status.is_invalid(),
        }
    }

    fn apply_expectations(&mut self, expectations: &ExpectationSet) {
        if self.status.is_error() || self.status.is_skipped() {
            return;
        }
        self.expectation = Some(
            match expectations.check(&self.file_name(), &self.violations) {
                Ok(()) => ExpectationOutcome::Met,
                Err(mismatch) => ExpectationOutcome::Mismatch {
                    reason: mismatch.to_string(),
                },
            },
        );
    }
}

/// Progress update for validation
#[derive(Debug, Clone)]
pub struct ValidationProgress {
    pub current_file: Option<PathBuf>,
    pub completed: usize,
    pub total: usize,
    pub phase: ValidationPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPhase {
    Discovery,
    Validation,
    Complete,
}

/// Timing of a validation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_duration: Duration,
    pub discovery_duration: Duration,
    pub validation_duration: Duration,
    pub average_time_per_file: Duration,
    pub throughput_files_per_second: f64,
    pub concurrent_validations: usize,
}

/// Aggregated results of validating multiple files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResults {
    pub total_files: usize,
    pub valid_files: usize,
    pub invalid_files: usize,
    pub error_files: usize,
    pub skipped_files: usize,
    /// Files whose violations did not match their expectations
    pub expectation_mismatches: usize,
    pub total_duration: Duration,
    pub average_duration: Duration,
    pub file_results: Vec<FileValidationResult>,
    pub performance_metrics: PerformanceMetrics,
}

impl ValidationResults {
    /// Aggregate individual file results into a summary
    pub fn aggregate(file_results: Vec<FileValidationResult>) -> Self {
        let total_files = file_results.len();
        let mut valid_files = 0;
        let mut invalid_files = 0;
        let mut error_files = 0;
        let mut skipped_files = 0;
        let mut expectation_mismatches = 0;
        let mut total_duration = Duration::ZERO;

        for result in &file_results {
            match result.status {
                ValidationStatus::Valid => valid_files += 1,
                ValidationStatus::Invalid { .. } => invalid_files += 1,
                ValidationStatus::Error { .. } => error_files += 1,
                ValidationStatus::Skipped { .. } => skipped_files += 1,
            }
            if matches!(result.expectation, Some(ExpectationOutcome::Mismatch { .. })) {
                expectation_mismatches += 1;
            }
            total_duration += result.duration;
        }

        let average_duration = if total_files > 0 {
            total_duration / total_files as u32
        } else {
            Duration::ZERO
        };

        let performance_metrics = PerformanceMetrics {
            total_duration,
            validation_duration: total_duration,
            average_time_per_file: average_duration,
            throughput_files_per_second: throughput(total_files, total_duration),
            concurrent_validations: 1,
            ..PerformanceMetrics::default()
        };

        Self {
            total_files,
            valid_files,
            invalid_files,
            error_files,
            skipped_files,
            expectation_mismatches,
            total_duration,
            average_duration,
            file_results,
            performance_metrics,
        }
    }

    pub fn with_metrics(
        file_results: Vec<FileValidationResult>,
        performance_metrics: PerformanceMetrics,
    ) -> Self {
        let mut results = Self::aggregate(file_results);
        results.performance_metrics = performance_metrics;
        results
    }

    /// Whether any file failed the run
    pub fn has_failures(&self) -> bool {
        self.file_results.iter().any(FileValidationResult::is_failure)
    }

    pub fn all_valid(&self) -> bool {
        self.total_files > 0 && self.valid_files == self.total_files
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.valid_files as f64 / self.total_files as f64) * 100.0
        }
    }
}

fn throughput(files: usize, duration: Duration) -> f64 {
    if duration.as_secs_f64() > 0.0 {
        files as f64 / duration.as_secs_f64()
    } else {
        0.0
    }
}

pub type ProgressCallback = Arc<dyn Fn(ValidationProgress) + Send + Sync>;

/// Validates mapping documents against a compiled schema
pub struct ValidationEngine {
    schema: MappingSchema,
    expectations: Option<Arc<ExpectationSet>>,
    config: ValidationConfig,
}

impl ValidationEngine {
    pub fn new(schema: MappingSchema, config: ValidationConfig) -> Self {
        Self {
            schema,
            expectations: None,
            config,
        }
    }

    /// Compare each file's violations with `expectations` instead of requiring validity
    pub fn with_expectations(mut self, expectations: ExpectationSet) -> Self {
        self.expectations = Some(Arc::new(expectations));
        self
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn schema(&self) -> &MappingSchema {
        &self.schema
    }

    pub async fn validate_path(
        &self,
        path: &Path,
        file_discovery: &FileDiscovery,
    ) -> Result<ValidationResults> {
        self.validate_path_with_progress(path, file_discovery, None)
            .await
    }

    /// Discover and validate the mapping documents at `path`
    pub async fn validate_path_with_progress(
        &self,
        path: &Path,
        file_discovery: &FileDiscovery,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<ValidationResults> {
        let workflow_start = Instant::now();
        let mut metrics = PerformanceMetrics {
            concurrent_validations: self.config.max_concurrent_validations,
            ..PerformanceMetrics::default()
        };

        if let Some(ref callback) = progress_callback {
            callback(ValidationProgress {
                current_file: None,
                completed: 0,
                total: 0,
                phase: ValidationPhase::Discovery,
            });
        }

        let discovery_start = Instant::now();
        let files = file_discovery.discover_files(path).await?;
        metrics.discovery_duration = discovery_start.elapsed();
        debug!(path = %path.display(), files = files.len(), "starting schema validation");

        let validation_start = Instant::now();
        let results = self
            .validate_files_with_progress(files, progress_callback.clone())
            .await?;
        metrics.validation_duration = validation_start.elapsed();

        metrics.total_duration = workflow_start.elapsed();
        metrics.average_time_per_file = if results.is_empty() {
            Duration::ZERO
        } else {
            metrics.validation_duration / results.len() as u32
        };
        metrics.throughput_files_per_second = throughput(results.len(), metrics.total_duration);

        let final_results = ValidationResults::with_metrics(results, metrics);

        if let Some(ref callback) = progress_callback {
            callback(ValidationProgress {
                current_file: None,
                completed: final_results.total_files,
                total: final_results.total_files,
                phase: ValidationPhase::Complete,
            });
        }

        Ok(final_results)
    }

    pub async fn validate_files(&self, files: Vec<PathBuf>) -> Result<Vec<FileValidationResult>> {
        self.validate_files_with_progress(files, None).await
    }

    /// Validate `files` concurrently, returning results in input order
    pub async fn validate_files_with_progress(
        &self,
        files: Vec<PathBuf>,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<Vec<FileValidationResult>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let total_files = files.len();
        let completed = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let semaphore = Arc::new(tokio::sync::Semaphore::new(
            self.config.max_concurrent_validations.max(1),
        ));

        let validation_tasks: Vec<_> = files
            .into_iter()
            .map(|file_path| {
                let schema = self.schema.clone();
                let expectations = self.expectations.clone();
                let semaphore = Arc::clone(&semaphore);
                let timeout = self.config.validation_timeout;
                let fail_fast = self.config.fail_fast;
                let progress_callback = progress_callback.clone();
                let completed = Arc::clone(&completed);
                let stop = Arc::clone(&stop);

                tokio::spawn(async move {
                    let _permit = semaphore.acquire().await.map_err(|_| {
                        MappingError::Concurrency {
                            details: "Failed to acquire validation semaphore".to_string(),
                        }
                    })?;

                    let mut result = if stop.load(Ordering::SeqCst) {
                        FileValidationResult::skipped(file_path.clone(), "fail-fast")
                    } else {
                        match tokio::time::timeout(
                            timeout,
                            Self::validate_single_file_internal(file_path.clone(), schema),
                        )
                        .await
                        {
                            Ok(result) => result,
                            Err(_) => FileValidationResult::error(
                                file_path.clone(),
                                MappingError::Concurrency {
                                    details: format!("Validation timeout after {:?}", timeout),
                                },
                                timeout,
                            ),
                        }
                    };

                    if let Some(expectations) = &expectations {
                        result.apply_expectations(expectations);
                    }
                    if fail_fast && result.is_failure() {
                        stop.store(true, Ordering::SeqCst);
                    }

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(ref callback) = progress_callback {
                        callback(ValidationProgress {
                            current_file: Some(file_path),
                            completed: done,
                            total: total_files,
                            phase: ValidationPhase::Validation,
                        });
                    }

                    Ok::<FileValidationResult, MappingError>(result)
                })
            })
            .collect();

        let task_results =
            try_join_all(validation_tasks)
                .await
                .map_err(|e| MappingError::Concurrency {
                    details: format!("Task join error: {}", e),
                })?;

        task_results.into_iter().collect()
    }

    async fn validate_single_file_internal(
        file_path: PathBuf,
        schema: MappingSchema,
    ) -> FileValidationResult {
        let start_time = Instant::now();

        let content = match tokio::fs::read(&file_path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %file_path.display(), error = %e, "cannot read mapping file");
                return FileValidationResult::error(file_path, e.into(), start_time.elapsed());
            }
        };

        let name = file_path.display().to_string();
        let report =
            tokio::task::spawn_blocking(move || schema.validate_bytes(&content, &name)).await;
        let duration = start_time.elapsed();

        match report {
            Ok(Ok(report)) if report.valid => FileValidationResult::valid(file_path, duration),
            Ok(Ok(report)) => FileValidationResult::invalid(file_path, report.violations, duration),
            Ok(Err(e)) => FileValidationResult::error(file_path, e, duration),
            Err(e) => FileValidationResult::error(
                file_path,
                MappingError::Concurrency {
                    details: format!("Join error: {}", e),
                },
                duration,
            ),
        }
    }

    pub async fn validate_single_file(&self, file_path: &Path) -> FileValidationResult {
        let mut result =
            Self::validate_single_file_internal(file_path.to_path_buf(), self.schema.clone())
                .await;
        if let Some(expectations) = &self.expectations {
            result.apply_expectations(expectations);
        }
        result
    }
}
