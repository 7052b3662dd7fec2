//! CLI subcommands: init, validate, list, run, models.

use crate::core::error::{ConfigError, ConversionError};
use crate::core::executor::Coordinator;
use crate::core::parser::{self, ValidationError};
use crate::core::processor::CategoryProcessor;
use crate::core::registry::{CategoryRegistry, Selection};
use crate::core::types::RunConfig;
use crate::provenance::eventlog::EventSink;
use crate::providers::azure::AzureGraphClient;
use crate::providers::gemini::GeminiClient;
use crate::providers::pandoc::{MissingConverter, PandocConverter};
use crate::providers::{DocumentConverter, InventoryService, NarrativeService};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write template cloudscribe.yaml and categories.yaml
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate a category file without contacting any service
    Validate {
        /// Path to categories.yaml
        #[arg(short, long, default_value = "categories.yaml")]
        file: PathBuf,
    },

    /// Show which categories a run would process
    List {
        /// Path to categories.yaml
        #[arg(short, long, default_value = "categories.yaml")]
        file: PathBuf,

        /// Run config supplying run_categories
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Inventory the subscription and write the report
    Run {
        /// Path to cloudscribe.yaml
        #[arg(short, long, default_value = "cloudscribe.yaml")]
        config: PathBuf,

        /// Path to categories.yaml
        #[arg(short, long, default_value = "categories.yaml")]
        file: PathBuf,

        /// Only run these categories (repeatable; overrides run_categories)
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Output directory (overrides output_dir)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Skip .docx conversion
        #[arg(long)]
        no_docx: bool,

        /// Categories processed at once (overrides concurrency)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Exit non-zero when any category failed
        #[arg(long)]
        fail_on_error: bool,
    },

    /// List Gemini models that support generateContent
    Models {
        /// Path to cloudscribe.yaml
        #[arg(short, long, default_value = "cloudscribe.yaml")]
        config: PathBuf,
    },
}

/// Dispatch a CLI command.
pub async fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::List { file, config } => cmd_list(&file, config.as_deref()),
        Commands::Run {
            config,
            file,
            categories,
            output_dir,
            no_docx,
            concurrency,
            fail_on_error,
        } => {
            let overrides = RunOverrides {
                categories,
                output_dir,
                no_docx,
                concurrency,
                fail_on_error,
            };
            cmd_run(&config, &file, overrides).await
        }
        Commands::Models { config } => cmd_models(&config).await,
    }
}

const CONFIG_TEMPLATE: &str = r#"# cloudscribe run configuration
subscription_id: "00000000-0000-0000-0000-000000000000"

# Prefer the GEMINI_API_KEY environment variable over storing the key here.
# gemini_api_key: "..."
gemini:
  model: gemini-1.5-flash
  timeout_secs: 120

# pandoc_path: /usr/local/bin/pandoc

# Omit (or set to anything but a list) to run every category.
# run_categories: ["Virtual Machines", "Storage Accounts"]

output_dir: OUTPUT
concurrency: 1
# Seconds before a stuck `az graph query` is killed and retried
az_timeout_secs: 300
retry:
  max_retries: 1
  base_delay_ms: 500
  max_delay_ms: 8000
executive_summary: true
run_log: true
"#;

const CATEGORIES_TEMPLATE: &str = r#"categories:
  - name: Virtual Machines
    query: >-
      Resources
      | where type =~ 'microsoft.compute/virtualmachines'
      | project name, type, location, resourceGroup,
        vmSize = properties.hardwareProfile.vmSize,
        osType = properties.storageProfile.osDisk.osType,
        zones, tags
    fields_for_ai: [vmSize, osType, location, zones, tags]
    fields_for_table: [name, resourceGroup, location, vmSize, osType]

  - name: Storage Accounts
    query: >-
      Resources
      | where type =~ 'microsoft.storage/storageaccounts'
      | project name, type, location, resourceGroup, kind,
        sku = sku.name,
        httpsOnly = properties.supportsHttpsTrafficOnly,
        publicAccess = properties.allowBlobPublicAccess
    fields_for_ai: [kind, sku, httpsOnly, publicAccess, location]
    fields_for_table: [name, resourceGroup, location, kind, sku]

  - name: Virtual Networks
    query: >-
      Resources
      | where type =~ 'microsoft.network/virtualnetworks'
      | project name, type, location, resourceGroup,
        addressPrefixes = properties.addressSpace.addressPrefixes
    fields_for_ai: [addressPrefixes, location]
    fields_for_table: [name, resourceGroup, location, addressPrefixes]
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join("cloudscribe.yaml");
    let categories_path = path.join("categories.yaml");
    for existing in [&config_path, &categories_path] {
        if existing.exists() {
            return Err(format!("{} already exists", existing.display()));
        }
    }
    std::fs::create_dir_all(path).map_err(|e| format!("cannot create {}: {}", path.display(), e))?;

    std::fs::write(&config_path, CONFIG_TEMPLATE)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;
    std::fs::write(&categories_path, CATEGORIES_TEMPLATE)
        .map_err(|e| format!("cannot write {}: {}", categories_path.display(), e))?;

    println!("Initialized cloudscribe project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}", categories_path.display());
    Ok(())
}

fn print_errors(errors: &[ValidationError]) {
    for e in errors {
        eprintln!("  ERROR: {}", e);
    }
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let categories = parser::parse_categories_file(file).map_err(|e| e.to_string())?;
    let errors = parser::validate_categories(&categories);

    if errors.is_empty() {
        let no_table = categories.iter().filter(|c| c.fields_for_table.is_empty()).count();
        println!("OK: {} ({} categories)", file.display(), categories.len());
        if no_table > 0 {
            println!("  {no_table} categor(ies) use default table columns");
        }
        Ok(())
    } else {
        print_errors(&errors);
        Err(format!("{} validation error(s)", errors.len()))
    }
}

fn cmd_list(file: &Path, config: Option<&Path>) -> Result<(), String> {
    let registry = CategoryRegistry::load(file).map_err(|e| e.to_string())?;
    if registry.is_empty() {
        println!("No categories defined in {}", file.display());
        return Ok(());
    }
    let selection = match config {
        Some(path) => {
            let config = parser::parse_run_config_file(path).map_err(|e| e.to_string())?;
            Selection::from_yaml(config.run_categories.as_ref())
        }
        None => Selection::All,
    };

    let active = registry.active_categories(&selection);
    println!("{} of {} categories active:", active.len(), registry.len());
    for category in active {
        println!(
            "  {} (ai fields: {}, table fields: {})",
            category.name,
            category.fields_for_ai.len(),
            category.fields_for_table.len()
        );
    }
    Ok(())
}

/// Command-line overrides for `run`.
#[derive(Debug, Default)]
struct RunOverrides {
    categories: Vec<String>,
    output_dir: Option<PathBuf>,
    no_docx: bool,
    concurrency: Option<usize>,
    fail_on_error: bool,
}

/// Load a run config and apply environment overrides.
fn load_run_config(path: &Path) -> Result<RunConfig, ConfigError> {
    let mut config = parser::parse_run_config_file(path)?;
    parser::apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

fn require_api_key(config: &RunConfig) -> Result<String, ConfigError> {
    config
        .gemini_api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .ok_or(ConfigError::Missing("gemini_api_key (or GEMINI_API_KEY)"))
}

/// Validate everything `run` needs before any category is attempted.
fn prepare_run(config: &mut RunConfig, overrides: &RunOverrides) -> Result<(String, String), String> {
    if let Some(dir) = &overrides.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(n) = overrides.concurrency {
        config.concurrency = n;
    }

    let errors = parser::validate_run_config(config);
    if !errors.is_empty() {
        print_errors(&errors);
        return Err(ConfigError::Invalid(errors).to_string());
    }
    let api_key = require_api_key(config).map_err(|e| e.to_string())?;
    let subscription = config.subscription_id.clone().unwrap_or_default();
    Ok((subscription, api_key))
}

async fn cmd_run(config_path: &Path, file: &Path, overrides: RunOverrides) -> Result<(), String> {
    let mut config = load_run_config(config_path).map_err(|e| e.to_string())?;
    let (subscription, api_key) = prepare_run(&mut config, &overrides)?;
    let registry = CategoryRegistry::load(file).map_err(|e| e.to_string())?;

    let inventory: Arc<dyn InventoryService> = Arc::new(
        AzureGraphClient::new(&subscription)
            .with_timeout(Duration::from_secs(config.az_timeout_secs)),
    );
    let narrative: Arc<dyn NarrativeService> =
        Arc::new(GeminiClient::new(&config.gemini, &api_key).map_err(|e| e.to_string())?);
    let converter: Option<Box<dyn DocumentConverter>> = if overrides.no_docx {
        None
    } else {
        let located: Box<dyn DocumentConverter> =
            match PandocConverter::locate(config.pandoc_path.as_deref()) {
                Ok(pandoc) => Box::new(pandoc),
                Err(e) => {
                    tracing::warn!(error = %e, "document conversion will be skipped");
                    let reason = match e {
                        ConversionError::Unavailable(reason) => reason,
                        other => other.to_string(),
                    };
                    Box::new(MissingConverter { reason })
                }
            };
        Some(located)
    };

    execute_run(
        &config,
        &registry,
        &overrides,
        &subscription,
        inventory,
        narrative,
        converter.as_deref(),
    )
    .await
}

async fn execute_run(
    config: &RunConfig,
    registry: &CategoryRegistry,
    overrides: &RunOverrides,
    subscription: &str,
    inventory: Arc<dyn InventoryService>,
    narrative: Arc<dyn NarrativeService>,
    converter: Option<&dyn DocumentConverter>,
) -> Result<(), String> {
    let selection = Selection::from_names(&overrides.categories)
        .unwrap_or_else(|| Selection::from_yaml(config.run_categories.as_ref()));

    let coordinator = Coordinator {
        processor: CategoryProcessor::new(inventory, narrative, config.retry.clone()),
        concurrency: config.concurrency,
        executive_summary: config.executive_summary,
        events: EventSink::new(&config.output_dir, config.run_log),
    };

    let outcome = coordinator
        .run_and_write(registry, &selection, subscription, &config.output_dir, converter)
        .await?;

    println!("Report: {}", outcome.report_path.display());
    if let Some(doc) = &outcome.document_path {
        println!("Document: {}", doc.display());
    }
    println!(
        "Categories: {} succeeded, {} partial, {} failed",
        outcome.succeeded, outcome.partial, outcome.failed
    );

    if overrides.fail_on_error && outcome.any_failed() {
        return Err(format!("{} category(ies) failed", outcome.failed));
    }
    Ok(())
}

async fn cmd_models(config_path: &Path) -> Result<(), String> {
    let config = load_run_config(config_path).map_err(|e| e.to_string())?;
    let api_key = require_api_key(&config).map_err(|e| e.to_string())?;
    let client = GeminiClient::new(&config.gemini, &api_key).map_err(|e| e.to_string())?;

    let models = client.list_models().await.map_err(|e| e.to_string())?;
    if models.is_empty() {
        println!("No models support generateContent; check the API key and its permissions.");
        return Ok(());
    }
    println!("Models supporting generateContent:");
    for model in &models {
        match &model.display_name {
            Some(display) => println!("  {} ({})", model.name, display),
            None => println!("  {}", model.name),
        }
    }
    Ok(())
}
