use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::EnvFilter;

use refrain::config::Config;
use refrain::dataset::HardTripletBatchSet;
use refrain::error::{RefrainError, Result};
use refrain::eval;
use refrain::model::{EmbeddingModel, OnnxEmbedder};
use refrain::songbase;

#[derive(Parser)]
#[command(
    name = "refrain",
    about = "Cover song identification over audio feature matrices",
    long_about = "Refrain builds hard-triplet training batches from per-song \
        collections of cover representations (MFCC/HPCP time series) and \
        evaluates trained embedding models by ranking covers in the learned \
        space. Feature matrices are organized as a songbase directory: one \
        subdirectory per song, one JSON matrix per cover."
)]
struct Cli {
    /// Path to config file
    ///
    /// Defaults to ~/.config/refrain/config.yaml if not specified.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    ///
    /// Sets the log level to debug for the refrain crate, showing detailed
    /// information about songbase loading, segmentation, and batch
    /// construction.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the hard-triplet batch sets and report their statistics
    ///
    /// Loads the configured training songbase, splits it into training and
    /// validation songs, and materializes the precomputed P×K batch sets.
    /// Useful for validating a songbase and batch configuration before
    /// spending GPU time on training.
    Build,

    /// Extract representation matrices from WAV files
    ///
    /// Walks a directory laid out like a songbase (one subdirectory per
    /// song, one WAV per cover), computes log-Mel filterbank features for
    /// each file, and writes the matching JSON matrix tree.
    Extract {
        /// Directory of <song_id>/<cover>.wav files
        input: PathBuf,

        /// Destination songbase directory
        output: PathBuf,
    },

    /// Evaluate a trained embedding model on the test songbase
    ///
    /// Embeds every test cover, ranks covers in the learned space, and
    /// writes ROC rows plus summary metrics (AUC, mean average precision,
    /// mean reciprocal rank, threshold classification quality) into a
    /// timestamped results directory. Falls back to the validation split
    /// when no test datasets are configured.
    Evaluate,

    /// Generate shell completions
    ///
    /// Prints a completion script for the given shell to stdout.
    /// Source or install the output to enable tab completion.
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, elvish, powershell)
        shell: Shell,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let path = cli.config.clone().unwrap_or_else(Config::default_path);
    Config::load(&path)
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("refrain=debug,info")
    } else {
        EnvFilter::new("refrain=info,warn")
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "refrain", &mut std::io::stdout());
            Ok(())
        }
        Command::Extract { ref input, ref output } => {
            let written = songbase::extract::extract_dir(input, output)?;
            println!("Extracted {written} cover representations to {}", output.display());
            Ok(())
        }
        _ => run_with_config(cli),
    }
}

fn make_rng(config: &Config) -> StdRng {
    match config.dataset.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

fn run_with_config(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Command::Build => run_build(&config),
        Command::Evaluate => run_evaluate(&config),
        Command::Extract { .. } | Command::Completions { .. } => unreachable!(),
    }
}

fn run_build(config: &Config) -> Result<()> {
    let mut rng = make_rng(config);

    let (train_songs, _test_songs) = songbase::from_config(config, &mut rng)?;
    if train_songs.is_empty() {
        return Err(RefrainError::Configuration(
            "no training datasets configured".to_string(),
        ));
    }

    let (train_songs, valid_songs) =
        songbase::split_songs(train_songs, config.songbase.train_split, &mut rng);
    println!(
        "Split songbase: {} training songs, {} validation songs",
        train_songs.len(),
        valid_songs.len()
    );

    let train_set = HardTripletBatchSet::from_songs(&train_songs, &config.dataset, &mut rng)?;
    let valid_set = HardTripletBatchSet::from_songs(&valid_songs, &config.dataset, &mut rng)?;

    println!(
        "Training set: {} batches, {} samples",
        train_set.len(),
        total_samples(&train_set)
    );
    println!(
        "Validation set: {} batches, {} samples",
        valid_set.len(),
        total_samples(&valid_set)
    );
    Ok(())
}

fn total_samples(set: &HardTripletBatchSet) -> usize {
    set.iter().map(refrain::dataset::Batch::num_samples).sum()
}

fn run_evaluate(config: &Config) -> Result<()> {
    let mut rng = make_rng(config);

    let (train_songs, test_songs) = songbase::from_config(config, &mut rng)?;
    let eval_songs = if test_songs.is_empty() {
        tracing::warn!("no test datasets configured, evaluating on the validation split");
        let (_, valid_songs) =
            songbase::split_songs(train_songs, config.songbase.train_split, &mut rng);
        valid_songs
    } else {
        test_songs
    };
    if eval_songs.is_empty() {
        return Err(RefrainError::Configuration(
            "evaluation songbase is empty".to_string(),
        ));
    }

    let mut model = OnnxEmbedder::new(&config.model)?;
    let embeddings = eval::embed_covers(
        &mut model,
        &eval_songs,
        config.dataset.frame_size,
        config.dataset.scale,
    )?;

    let roc = eval::roc_curve(&embeddings)?;
    let auc = eval::auc(&roc);
    let map = eval::mean_average_precision(&embeddings)?;
    let mrr = eval::mean_reciprocal_rank(&embeddings)?;

    let threshold = config
        .model
        .threshold
        .or_else(|| eval::pick_threshold(&roc))
        .ok_or_else(|| {
            RefrainError::Eval("no ROC threshold reaches 70% true-positive rate".to_string())
        })?;
    let report = eval::ThresholdClassifier::new(threshold).metrics(&embeddings)?;

    // Batch-hard loss over a few freshly sampled batches, when the eval set
    // is large enough to honor the configured P.
    let triplet_loss = if eval_songs.len() >= config.dataset.songs_per_batch {
        let loss_config = refrain::config::DatasetConfig {
            n_batches: config.dataset.n_batches.min(8),
            ..config.dataset.clone()
        };
        let set = HardTripletBatchSet::from_songs(&eval_songs, &loss_config, &mut rng)?;
        let mut total = 0.0f32;
        for batch in &set {
            let frame_embeddings = model.embed(&batch.samples)?;
            total += eval::batch_hard_triplet_loss(
                &frame_embeddings,
                &batch.labels,
                config.model.margin,
            )?;
        }
        Some(total / set.len() as f32)
    } else {
        tracing::warn!(
            "skipping triplet loss: {} eval songs < songs_per_batch {}",
            eval_songs.len(),
            config.dataset.songs_per_batch
        );
        None
    };

    let results_dir = write_results(config, &roc, auc, map, mrr, &report, triplet_loss)?;

    println!("AUC: {auc:.3}");
    println!("MAP: {map:.3}");
    println!("MRR: {mrr:.3}");
    println!(
        "Classifier @ {threshold:.3}: accuracy {:.3}, precision {:.3}, recall {:.3}, F1 {:.3}",
        report.accuracy, report.precision, report.recall, report.f1
    );
    if let Some(loss) = triplet_loss {
        println!("Triplet loss: {loss:.4}");
    }
    println!("Results written to {}", results_dir.display());
    Ok(())
}

fn write_results(
    config: &Config,
    roc: &[eval::RocPoint],
    auc: f32,
    map: f32,
    mrr: f32,
    report: &eval::ClassifierReport,
    triplet_loss: Option<f32>,
) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y-%m-%dT%H-%M-%S");
    let dir = Config::expand_path(&config.output.results_dir)
        .join(format!("{stamp}_{}", config.songbase.representation));
    std::fs::create_dir_all(&dir)?;

    let roc_file = std::fs::File::create(dir.join("roc.json"))?;
    serde_json::to_writer_pretty(roc_file, roc)?;

    let summary = serde_json::json!({
        "auc": auc,
        "mean_average_precision": map,
        "mean_reciprocal_rank": mrr,
        "classifier": report,
        "triplet_loss": triplet_loss,
    });
    let summary_file = std::fs::File::create(dir.join("metrics.json"))?;
    serde_json::to_writer_pretty(summary_file, &summary)?;

    Ok(dir)
}
