use anyhow::{Context, Result};
use baitdetector::{
    config::{AppConfig, LoggingConfig},
    dataset::JsonDatasetStore,
    ml::{BincodeModelStore, LexicalExtractor, ModelFamily, ModelStore, Pipeline},
    DatasetProvider,
};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "baitdetector")]
#[command(about = "Phishing URL classifier", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, global = true, env = "BAITDETECTOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: features, evaluation, tuning, persistence
    Run,

    /// Train and evaluate every family at default hyperparameters
    Train,

    /// Grid-search one family and save the winner
    Tune {
        /// random_forest, svm or gradient_boosting (defaults to pipeline.tune_family)
        #[arg(short, long)]
        family: Option<String>,
    },

    /// Print the lexical features of a URL as JSON
    Features {
        #[arg(value_name = "URL")]
        url: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(2);
        }
    };

    init_tracing(&config.logging);

    if let Err(err) = run(cli.command, config) {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run(command: Commands, config: AppConfig) -> Result<()> {
    info!("Starting BaitDetector v{}", env!("CARGO_PKG_VERSION"));

    match command {
        Commands::Run => {
            let provider = JsonDatasetStore::new(&config.dataset.path);
            let store = BincodeModelStore::new();
            let pipeline = Pipeline::new(config);

            let report = pipeline
                .run(&provider, &store)
                .context("pipeline run failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Train => {
            let provider = JsonDatasetStore::new(&config.dataset.path);
            let dataset = provider
                .get_dataset(config.dataset.size)
                .context("failed to load dataset")?;
            let pipeline = Pipeline::new(config);

            let features = pipeline.prepare_features(&dataset)?;
            let (results, _) = pipeline.evaluate(&features)?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Tune { family } => {
            let family = match family {
                Some(name) => ModelFamily::parse(&name)?,
                None => config.pipeline.tune_family,
            };

            let provider = JsonDatasetStore::new(&config.dataset.path);
            let dataset = provider
                .get_dataset(config.dataset.size)
                .context("failed to load dataset")?;

            let mut config = config;
            config.pipeline.tune_family = family;
            let model_path = config.pipeline.model_path.clone();
            let pipeline = Pipeline::new(config);

            let features = pipeline.prepare_features(&dataset)?;
            let (search, model) = pipeline
                .tune(&features)
                .with_context(|| format!("grid search for {} failed", family))?;
            BincodeModelStore::new()
                .save(&model, &model_path)
                .with_context(|| format!("failed to save model to {}", model_path.display()))?;
            println!("{}", serde_json::to_string_pretty(&search)?);
        }
        Commands::Features { url } => {
            let extractor = LexicalExtractor::new();
            let features = extractor.extract(&url);
            let named: serde_json::Map<String, serde_json::Value> = features
                .named()
                .into_iter()
                .map(|(name, value)| (name.to_string(), json!(value)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&named)?);
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
