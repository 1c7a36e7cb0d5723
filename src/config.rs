use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::{Cli, OutputFormat};
use crate::factory::DEFAULT_MAX_METADATA_ENTRIES;
use crate::file_discovery::DEFAULT_MAPPING_SUFFIX;

const CONFIG_FILE_NAMES: [&str; 4] = [
    "xml-mapping.toml",
    "xml-mapping.json",
    ".xml-mapping.toml",
    ".xml-mapping.json",
];

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads the process environment
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub mapping: MappingConfig,
    pub schema: SchemaConfig,
    pub validation: ValidationConfig,
    pub cache: CacheConfig,
    pub output: OutputConfig,
    pub files: FileConfig,
}

/// Where mapping documents live and how they are loaded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MappingConfig {
    /// Directories searched in order
    pub paths: Vec<PathBuf>,
    pub file_extension: String,
    /// Validate each document against the XSD before loading it
    pub validate_schema: bool,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            paths: vec![PathBuf::from(".")],
            file_extension: DEFAULT_MAPPING_SUFFIX.to_string(),
            validate_schema: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SchemaConfig {
    /// XSD used instead of the bundled schema
    pub xsd: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Concurrent validations (defaults to the number of CPUs)
    pub threads: Option<usize>,
    pub fail_fast: bool,
    /// Per-file timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            threads: None,
            fail_fast: false,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Class metadata records kept in memory
    pub max_metadata_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_metadata_entries: DEFAULT_MAX_METADATA_ENTRIES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub verbose: bool,
    pub quiet: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct FileConfig {
    /// Include patterns (glob syntax)
    pub include_patterns: Vec<String>,
    /// Exclude patterns (glob syntax)
    pub exclude_patterns: Vec<String>,
    pub max_depth: Option<usize>,
    pub follow_symlinks: bool,
}

/// Loads configuration with precedence defaults, file, environment, CLI
pub struct ConfigManager;

impl ConfigManager {
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        Self::load_config_with(cli, &SystemEnvProvider).await
    }

    pub async fn load_config_with(cli: &Cli, env: &impl EnvProvider) -> Result<Config> {
        let mut config = Config::default();

        if let Some(config_path) = &cli.config {
            let file_config = Self::load_from_file(config_path).await?;
            config = Self::merge_configs(config, file_config);
        } else if let Some(found_config) = Self::find_config_file().await? {
            config = Self::merge_configs(config, found_config);
        }

        config = Self::apply_environment_overrides_with(env, config)?;
        config = Self::merge_with_cli(config, cli);

        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML or JSON file
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => match toml::from_str::<Config>(&content) {
                Ok(config) => Ok(config),
                Err(_) => Ok(serde_json::from_str(&content)?),
            },
        }
    }

    /// Look in the current directory, then the user config directory
    pub async fn find_config_file() -> Result<Option<Config>> {
        let mut dirs = vec![PathBuf::from(".")];
        if let Some(config_dir) = dirs::config_dir() {
            dirs.push(config_dir.join("xml-mapping"));
        }

        for dir in dirs {
            for name in CONFIG_FILE_NAMES {
                let path = dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply `XML_MAPPING_*` overrides read through `env`
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        if let Some(paths) = env.get("XML_MAPPING_PATHS") {
            config.mapping.paths = split_list(&paths).map(PathBuf::from).collect();
        }
        if let Some(extension) = env.get("XML_MAPPING_EXTENSION") {
            config.mapping.file_extension = extension;
        }
        if let Some(validate) = parse_env(env, "XML_MAPPING_VALIDATE_SCHEMA")? {
            config.mapping.validate_schema = validate;
        }
        if let Some(xsd) = env.get("XML_MAPPING_SCHEMA") {
            config.schema.xsd = Some(PathBuf::from(xsd));
        }

        if let Some(threads) = parse_env(env, "XML_MAPPING_THREADS")? {
            config.validation.threads = Some(threads);
        }
        if let Some(fail_fast) = parse_env(env, "XML_MAPPING_FAIL_FAST")? {
            config.validation.fail_fast = fail_fast;
        }
        if let Some(timeout) = parse_env(env, "XML_MAPPING_TIMEOUT")? {
            config.validation.timeout_seconds = timeout;
        }

        if let Some(entries) = parse_env(env, "XML_MAPPING_CACHE_ENTRIES")? {
            config.cache.max_metadata_entries = entries;
        }

        if let Some(verbose) = parse_env(env, "XML_MAPPING_VERBOSE")? {
            config.output.verbose = verbose;
        }
        if let Some(quiet) = parse_env(env, "XML_MAPPING_QUIET")? {
            config.output.quiet = quiet;
        }
        if let Some(format) = env.get("XML_MAPPING_FORMAT") {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormat::Human,
                "json" => OutputFormat::Json,
                "summary" => OutputFormat::Summary,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid XML_MAPPING_FORMAT value: {}",
                        format
                    )));
                }
            };
        }

        if let Some(max_depth) = parse_env(env, "XML_MAPPING_MAX_DEPTH")? {
            config.files.max_depth = Some(max_depth);
        }

        Ok(config)
    }

    /// Apply CLI arguments; only options given on the command line override
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if !cli.mapping_dirs.is_empty() {
            config.mapping.paths = cli.mapping_dirs.clone();
        }
        if let Some(extension) = &cli.extension {
            config.mapping.file_extension = extension.clone();
        }
        if cli.no_schema_validation {
            config.mapping.validate_schema = false;
        }
        if cli.schema.is_some() {
            config.schema.xsd = cli.schema.clone();
        }

        if cli.threads.is_some() {
            config.validation.threads = cli.threads;
        }
        if let Some(timeout) = cli.timeout {
            config.validation.timeout_seconds = timeout;
        }
        if cli.fail_fast {
            config.validation.fail_fast = true;
        }

        if let Some(format) = cli.output_format {
            config.output.format = format;
        }
        if cli.verbose {
            config.output.verbose = true;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
        }

        if !cli.include_patterns.is_empty() {
            config.files.include_patterns = cli.include_patterns.clone();
        }
        if !cli.exclude_patterns.is_empty() {
            config.files.exclude_patterns = cli.exclude_patterns.clone();
        }
        if cli.max_depth.is_some() {
            config.files.max_depth = cli.max_depth;
        }

        config
    }

    /// Merge two configurations (second takes precedence)
    pub fn merge_configs(mut base: Config, override_config: Config) -> Config {
        if !override_config.mapping.paths.is_empty() {
            base.mapping.paths = override_config.mapping.paths;
        }
        base.mapping.file_extension = override_config.mapping.file_extension;
        base.mapping.validate_schema = override_config.mapping.validate_schema;

        if override_config.schema.xsd.is_some() {
            base.schema.xsd = override_config.schema.xsd;
        }

        if override_config.validation.threads.is_some() {
            base.validation.threads = override_config.validation.threads;
        }
        base.validation.fail_fast = override_config.validation.fail_fast;
        base.validation.timeout_seconds = override_config.validation.timeout_seconds;

        base.cache = override_config.cache;
        base.output = override_config.output;

        if !override_config.files.include_patterns.is_empty() {
            base.files.include_patterns = override_config.files.include_patterns;
        }
        if !override_config.files.exclude_patterns.is_empty() {
            base.files.exclude_patterns = override_config.files.exclude_patterns;
        }
        if override_config.files.max_depth.is_some() {
            base.files.max_depth = override_config.files.max_depth;
        }
        base.files.follow_symlinks = override_config.files.follow_symlinks;

        base
    }

    pub fn validate_config(config: &Config) -> Result<()> {
        if config.mapping.paths.is_empty() {
            return Err(ConfigError::Validation(
                "At least one mapping directory must be specified".to_string(),
            ));
        }

        let extension = &config.mapping.file_extension;
        if extension.is_empty() || extension.contains('/') || extension.contains('\\') {
            return Err(ConfigError::Validation(format!(
                "Invalid mapping file extension: '{}'",
                extension
            )));
        }

        if let Some(threads) = config.validation.threads {
            if threads == 0 {
                return Err(ConfigError::Validation(
                    "Number of threads must be greater than 0".to_string(),
                ));
            }
            if threads > 1000 {
                return Err(ConfigError::Validation(
                    "Number of threads cannot exceed 1000".to_string(),
                ));
            }
        }

        if config.validation.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if config.cache.max_metadata_entries == 0 {
            return Err(ConfigError::Validation(
                "Metadata cache must hold at least one entry".to_string(),
            ));
        }

        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        Ok(())
    }

    pub fn get_thread_count(config: &Config) -> usize {
        config.validation.threads.unwrap_or_else(num_cpus::get)
    }

    pub fn get_timeout_duration(config: &Config) -> Duration {
        Duration::from_secs(config.validation.timeout_seconds)
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_env<T: FromStr>(env: &impl EnvProvider, key: &str) -> Result<Option<T>> {
    env.get(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Environment(format!("Invalid {} value: {}", key, value)))
        })
        .transpose()
}
