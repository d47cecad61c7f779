//! dietcheck CLI

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use dietcheck_core::{
    AlertLevel, ComplianceEngine, ComplianceResult, EngineConfig, FlagDerivation,
    ProductSnapshot, ProfileError, UserDietaryProfile,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dietcheck")]
#[command(about = "Dietary compliance analysis for food products")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a product against a dietary profile
    ///
    /// Exit status: 0 SAFE, 1 CAUTION, 2 VIOLATION.
    Evaluate {
        /// Product snapshot (JSON, or YAML by extension)
        #[arg(long)]
        product: PathBuf,

        /// Dietary profile (YAML, or JSON by extension)
        #[arg(long)]
        profile: PathBuf,

        /// Engine configuration overrides (YAML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Evaluation instant (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Derive dietary flags for a product without a profile
    Flags {
        #[arg(long)]
        product: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Validate a dietary profile
    CheckProfile {
        /// Profile file (YAML, or JSON by extension)
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Evaluate {
            product,
            profile,
            config,
            at,
            format,
        } => cmd_evaluate(&product, &profile, config.as_deref(), at, format),
        Commands::Flags {
            product,
            config,
            format,
        } => cmd_flags(&product, config.as_deref(), format),
        Commands::CheckProfile { file } => cmd_check_profile(&file),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(3)
        }
    }
}

fn cmd_evaluate(
    product: &Path,
    profile: &Path,
    config: Option<&Path>,
    at: Option<DateTime<Utc>>,
    format: Format,
) -> Result<ExitCode> {
    let engine = load_engine(config)?;
    let product = load_product(product)?;
    let profile = load_profile(profile)?;

    let result = engine
        .evaluate_at(&product, &profile, at.unwrap_or_else(Utc::now))
        .context("evaluation failed")?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_result(&result),
    }

    Ok(match result.alert_level {
        AlertLevel::Safe => ExitCode::SUCCESS,
        AlertLevel::Caution => ExitCode::from(1),
        AlertLevel::Violation => ExitCode::from(2),
    })
}

fn cmd_flags(product: &Path, config: Option<&Path>, format: Format) -> Result<ExitCode> {
    let engine = load_engine(config)?;
    let product = load_product(product)?;
    let flags = engine.derive_flags(&product);

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&flags)?),
        Format::Text => print_flags(&flags),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_check_profile(file: &Path) -> Result<ExitCode> {
    match read_profile(file) {
        Ok(profile) => {
            println!(
                "OK: {} allerg{}, {} medical condition(s), {} custom rule(s)",
                profile.allergies.len(),
                if profile.allergies.len() == 1 { "y" } else { "ies" },
                profile.medical.len(),
                profile.custom_rules.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(ProfileError::SchemaError(errors)) => {
            println!("INVALID: {}", file.display());
            for error in errors {
                println!("  - {}", error);
            }
            Ok(ExitCode::from(1))
        }
        Err(e) => {
            println!("INVALID: {}: {}", file.display(), e);
            Ok(ExitCode::from(1))
        }
    }
}

fn load_engine(config: Option<&Path>) -> Result<ComplianceEngine> {
    let config = match config {
        Some(path) => EngineConfig::from_yaml_file(path)
            .with_context(|| format!("load config: {}", path.display()))?,
        None => EngineConfig::default(),
    };
    ComplianceEngine::new(config).context("invalid engine configuration")
}

fn load_product(path: &Path) -> Result<ProductSnapshot> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("read: {}", path.display()))?;
    let product: ProductSnapshot = if is_yaml(path) {
        serde_yaml::from_str(&content).with_context(|| format!("parse YAML: {}", path.display()))?
    } else {
        serde_json::from_str(&content).with_context(|| format!("parse JSON: {}", path.display()))?
    };
    tracing::debug!(code = %product.code, path = %path.display(), "Loaded product");
    Ok(product)
}

fn load_profile(path: &Path) -> Result<UserDietaryProfile> {
    read_profile(path).with_context(|| format!("load profile: {}", path.display()))
}

fn read_profile(path: &Path) -> Result<UserDietaryProfile, ProfileError> {
    if is_json(path) {
        UserDietaryProfile::from_json_file(path)
    } else {
        UserDietaryProfile::from_yaml_file(path)
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn is_json(path: &Path) -> bool {
    extension(path).as_deref() == Some("json")
}

fn is_yaml(path: &Path) -> bool {
    matches!(extension(path).as_deref(), Some("yaml" | "yml"))
}

fn print_result(result: &ComplianceResult) {
    println!("{}: {}", result.product_code, result.alert_level);
    for line in &result.explanation {
        println!("  - {}", line);
    }
    for s in &result.suppressions {
        println!(
            "  suppressed {} (won by {}) for '{}': {}",
            s.suppressed_rule_id, s.winning_rule_id, s.subject, s.reason
        );
    }
    println!(
        "quality {:.2}, completeness {:.2}",
        result.quality_score, result.completeness_score
    );
}

fn print_flags(flags: &FlagDerivation) {
    for (flag, value) in &flags.dietary_flags {
        let tier = flags
            .tier(*flag)
            .map(|t| t.to_string())
            .unwrap_or_else(|| "no evidence".to_string());
        println!(
            "{:<12} {:<8} {:.2}  ({})",
            flag.as_str(),
            value.to_string(),
            flags.confidence(*flag),
            tier
        );
    }
    for note in &flags.derivation_notes {
        println!("  note: {}", note.message);
    }
}
