//! Tennis Prediction CLI
//!
//! Win-probability predictions from an attention LSTM over match histories.

use clap::{Parser, Subcommand};
use tennis::{Config, Result};

#[derive(Parser)]
#[command(name = "tennis")]
#[command(about = "Tennis match win-probability prediction using deep learning", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match ledger management commands
    Data {
        #[command(subcommand)]
        action: DataCommands,
    },
    /// Training dataset commands
    Dataset {
        #[command(subcommand)]
        action: DatasetCommands,
    },
    /// Train the prediction model
    Train {
        /// Override number of epochs
        #[arg(long)]
        epochs: Option<usize>,
        /// Override learning rate
        #[arg(long)]
        lr: Option<f64>,
    },
    /// Predict the probability that player A beats player B
    Predict {
        /// First player
        player_a: String,
        /// Second player
        player_b: String,
        /// Matches of history per player (defaults to the trained lookback)
        #[arg(long)]
        lookback: Option<usize>,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Model management commands
    Model {
        #[command(subcommand)]
        action: ModelCommands,
    },
    /// Initialize a new project with default config
    Init,
}

#[derive(Subcommand)]
enum DataCommands {
    /// Import one or more match CSV files into the database
    Import {
        /// CSV files with the ledger columns
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Show database status
    Status,
}

#[derive(Subcommand)]
enum DatasetCommands {
    /// Encode every ledger match into the training dataset file
    Build,
}

#[derive(Subcommand)]
enum ModelCommands {
    /// Show model information
    Info,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use table, json, or csv.", s)),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let result = match cli.command {
        Commands::Data { action } => match action {
            DataCommands::Import { paths } => commands::data_import(&config, &paths),
            DataCommands::Status => commands::data_status(&config),
        },
        Commands::Dataset { action } => match action {
            DatasetCommands::Build => commands::dataset_build(&config),
        },
        Commands::Train { epochs, lr } => commands::train(&config, epochs, lr),
        Commands::Predict {
            player_a,
            player_b,
            lookback,
            format,
        } => commands::predict(&config, &player_a, &player_b, lookback, format),
        Commands::Model { action } => match action {
            ModelCommands::Info => commands::model_info(&config),
        },
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use std::path::Path;
    use tennis::data::{Database, Ledger, TrainingDataset};
    use tennis::features::MatchupEncoder;
    use tennis::model::{save_artifacts, ArtifactManifest};
    use tennis::predict::inference::{compute_confidence, format_prediction, InferenceContext, LoadedModel};
    use tennis::training::run_training;
    use tennis::{Prediction, TennisError};

    type MyBackend = NdArray<f32>;
    type MyAutodiffBackend = Autodiff<MyBackend>;

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all("data")?;
        std::fs::create_dir_all("model")?;
        println!("Created data/ and model/ directories");

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings", config_path);
        println!("  2. Run 'tennis data import <matches.csv>' to load match data");
        println!("  3. Run 'tennis dataset build' then 'tennis train' to train the model");
        println!("  4. Run 'tennis predict \"Player A\" \"Player B\"' to make predictions");

        Ok(())
    }

    /// The match ledger: the database when it holds matches, else the configured CSV
    fn load_ledger(config: &Config) -> Result<Ledger> {
        if Path::new(&config.data.database_path).exists() {
            let db = Database::open(&config.data.database_path)?;
            if db.get_stats()?.match_count > 0 {
                log::info!("Reading ledger from {}", config.data.database_path);
                return db.load_ledger();
            }
        }
        if !Path::new(&config.data.ledger_path).exists() {
            return Err(TennisError::Config(format!(
                "No matches in {} and no ledger at {}. Run 'tennis data import' first.",
                config.data.database_path, config.data.ledger_path
            )));
        }
        log::info!("Reading ledger from {}", config.data.ledger_path);
        Ledger::from_csv_path(&config.data.ledger_path)
    }

    pub fn data_import(config: &Config, paths: &[String]) -> Result<()> {
        if let Some(parent) = Path::new(&config.data.database_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Every file must parse and share one stat layout before anything is stored
        let mut combined: Option<Ledger> = None;
        for path in paths {
            println!("Reading {}...", path);
            let ledger = Ledger::from_csv_path(path)?;
            println!("  {} matches ({} stats)", ledger.len(), ledger.stats().len());
            combined = Some(match combined {
                Some(acc) => acc.merge(ledger)?,
                None => ledger,
            });
        }
        let ledger = combined.unwrap_or_default();

        let mut db = Database::open(&config.data.database_path)?;
        let total = db.import_ledger(&ledger)?;
        println!("Stored {} matches in database", total);

        Ok(())
    }

    pub fn data_status(config: &Config) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let stats = db.get_stats()?;

        println!("Database Status");
        println!("───────────────────────────────");
        println!("  Path:     {}", config.data.database_path);
        println!("  Players:  {}", stats.player_count);
        println!("  Matches:  {}", stats.match_count);
        if let (Some(earliest), Some(latest)) = (stats.earliest_match, stats.latest_match) {
            println!("  Range:    {} to {}", earliest, latest);
        }
        if let Some(columns) = db.stored_stats()? {
            println!("  Stats:    {}", columns.join(", "));
        }

        Ok(())
    }

    fn build_dataset(config: &Config) -> Result<TrainingDataset> {
        let ledger = load_ledger(config)?;
        println!("Loaded {} matches", ledger.len());

        let encoder = MatchupEncoder::from_config(&config.features, ledger.stats().len());
        println!(
            "Encoding matchups (lookback {}, {} features per match)...",
            encoder.lookback(),
            encoder.feature_width()
        );
        TrainingDataset::build(&ledger, &encoder)
    }

    pub fn dataset_build(config: &Config) -> Result<()> {
        let dataset = build_dataset(config)?;
        dataset.save(&config.data.dataset_path)?;
        println!("Saved {} samples to {}", dataset.len(), config.data.dataset_path);
        Ok(())
    }

    pub fn train(config: &Config, epochs: Option<usize>, lr: Option<f64>) -> Result<()> {
        let mut training_config = config.clone();
        if let Some(e) = epochs {
            training_config.training.max_epochs = e;
        }
        if let Some(lr) = lr {
            training_config.training.learning_rate = lr;
        }
        training_config.validate()?;

        let dataset = if Path::new(&config.data.dataset_path).exists() {
            println!("Loading dataset from {}", config.data.dataset_path);
            TrainingDataset::load(&config.data.dataset_path)?
        } else {
            build_dataset(config)?
        };
        println!("  {} samples", dataset.len());

        println!("Initializing training...");
        let device = Default::default();
        let (outcome, manifest) = run_training::<MyAutodiffBackend>(dataset, &training_config, device)?;

        let history = &outcome.history;
        println!("\nTraining complete");
        println!("───────────────────────────────");
        println!("  Epochs run:   {}", history.epochs());
        println!("  Best epoch:   {}", history.best_epoch + 1);
        println!("  Best val F1:  {:.4}", history.best_val_f1);
        if history.stopped_early {
            println!("  Stopped early");
        }

        save_artifacts(&outcome.model, &manifest, &config.data.model_path)?;
        println!("Model saved to {}", config.data.model_path);

        Ok(())
    }

    pub fn predict(
        config: &Config,
        player_a: &str,
        player_b: &str,
        lookback: Option<usize>,
        format: OutputFormat,
    ) -> Result<()> {
        let ledger = load_ledger(config)?;
        let context =
            InferenceContext::<LoadedModel<MyBackend>>::load(&ledger, &config.data.model_path, Default::default())?;

        let mut prediction = context.prediction(player_a, player_b)?;
        if let Some(n) = lookback.filter(|n| *n != context.lookback()) {
            let history_len = |player: &str| {
                context
                    .index()
                    .recent_before(player, None, n + 1)
                    .len()
                    .saturating_sub(1)
            };
            prediction = Prediction {
                player_a_win_prob: context.predict_with_lookback(player_a, player_b, n)?,
                confidence: compute_confidence(history_len(player_a), history_len(player_b), n),
                ..prediction
            };
        }

        match format {
            OutputFormat::Table => {
                print!("{}", format_prediction(&prediction));
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&prediction)?);
            }
            OutputFormat::Csv => {
                println!("player_a,player_b,player_a_win_prob,h2h_wins,h2h_total,confidence");
                println!(
                    "{},{},{:.3},{},{},{}",
                    prediction.player_a,
                    prediction.player_b,
                    prediction.player_a_win_prob,
                    prediction.h2h_wins,
                    prediction.h2h_total,
                    prediction.confidence
                );
            }
        }

        Ok(())
    }

    pub fn model_info(config: &Config) -> Result<()> {
        let model_file = ArtifactManifest::weights_path(&config.data.model_path);
        if !Path::new(&model_file).exists() {
            return Err(TennisError::NoModel);
        }
        let manifest = ArtifactManifest::load(&config.data.model_path)?;

        println!("Model Information");
        println!("───────────────────────────────");
        println!("  Path:           {}", model_file);
        println!("  Trained at:     {}", manifest.trained_at.format("%Y-%m-%d %H:%M UTC"));
        println!("  Input features: {}", manifest.model.input_size);
        println!("  Hidden size:    {}", manifest.model.hidden_size);
        println!("  LSTM layers:    {}", manifest.model.num_layers);
        println!("  Lookback:       {}", manifest.lookback);
        println!("  Surface 1-hot:  {}", manifest.surface_one_hot);
        println!("  Stats:          {}", manifest.stats.join(", "));
        println!("  Best epoch:     {}", manifest.best_epoch + 1);
        println!("  Best val F1:    {:.4}", manifest.best_val_f1);

        Ok(())
    }
}
