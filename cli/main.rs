#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process;

use churnsurv::config::Settings;
use churnsurv::data::{build_training_samples, load_metrics};
use churnsurv::diagnostics::concordance_index;
use churnsurv::{FeatureVector, ModelCache, SubjectId};

#[derive(Args)]
pub struct TrainArgs {
    /// Path to a tab-separated customer metrics file
    pub training_data: PathBuf,

    /// Optional TOML file with [engine] and [retention] settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Where to write the fitted model
    #[arg(long, default_value = "model.toml")]
    pub out: PathBuf,
}

#[derive(Args)]
pub struct PredictArgs {
    /// Path to a tab-separated customer metrics file
    pub data: PathBuf,

    /// Fitted model produced by `train`
    #[arg(long)]
    pub model: PathBuf,

    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, default_value = "predictions.tsv")]
    pub out: PathBuf,
}

#[derive(Args)]
pub struct ExplainArgs {
    /// Path to a tab-separated customer metrics file
    pub data: PathBuf,

    #[arg(long)]
    pub model: PathBuf,

    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Subject to explain
    #[arg(long)]
    pub subject: String,
}

#[derive(Parser)]
#[command(
    name = "churnsurv",
    about = "Cox proportional-hazards churn modelling for customer retention",
    long_about = "Fits a Cox proportional-hazards model to customer histories and \
                 predicts churn probability and expected time-to-churn per customer."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fit a churn model (outputs: model.toml)")]
    Train(TrainArgs),
    #[command(about = "Score customers with a fitted model (outputs: predictions.tsv)")]
    Predict(PredictArgs),
    #[command(about = "Show a customer's churn estimate and risk factors")]
    Explain(ExplainArgs),
    #[command(about = "Display version information")]
    Version,
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Settings::load(path)?),
        None => Ok(Settings::default()),
    }
}

fn load_cache(
    model: &PathBuf,
    config: Option<&PathBuf>,
) -> Result<ModelCache, Box<dyn std::error::Error>> {
    let settings = load_settings(config)?;
    let cache = ModelCache::new(settings.engine)?;
    log::info!("Loading model from {}", model.display());
    cache.load_model(&fs::read(model)?)?;
    Ok(cache)
}

pub fn train(args: TrainArgs) -> Result<(), Box<dyn std::error::Error>> {
    let settings = load_settings(args.config.as_ref())?;
    let records = load_metrics(&args.training_data)?;
    let samples = build_training_samples(&records)?;

    let cache = ModelCache::new(settings.engine)?;
    let report = cache.build_cox_model(&samples)?;
    println!(
        "Fit {:?} after {} iterations ({} samples, {} events)",
        report.status, report.iterations, report.num_samples, report.num_events
    );
    if report.used_singular_fallback {
        println!("Note: the information matrix needed an extra ridge boost.");
    }

    let snapshot = cache.snapshot()?;
    for (predictor, weight) in snapshot.model().coefficients.iter() {
        println!("  {:<22} {weight:>12.6}", predictor.name());
    }
    match concordance_index(snapshot.model(), &samples) {
        Ok(c) => println!(
            "Training concordance: {:.4} over {} comparable pairs",
            c.index, c.comparable_pairs
        ),
        Err(e) => log::warn!("Concordance unavailable: {e}"),
    }

    fs::write(&args.out, cache.save_model()?)?;
    println!("Model saved to: {}", args.out.display());
    Ok(())
}

pub fn predict(args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    let cache = load_cache(&args.model, args.config.as_ref())?;
    let records = load_metrics(&args.data)?;
    let requests: Vec<(SubjectId, FeatureVector)> = records
        .iter()
        .map(|r| (r.subject_id.clone(), r.features()))
        .collect();

    let predictions = cache.predict_batch(&requests)?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&args.out)?;
    writer.write_record([
        "subject_id",
        "churn_probability",
        "expected_time_to_event",
        "top_risk_factor",
    ])?;

    let mut failures = 0usize;
    for ((subject, features), prediction) in requests.iter().zip(predictions) {
        match prediction {
            Ok(p) => {
                let top = cache
                    .churn_risk_factors(subject, Some(features))?
                    .first()
                    .map(|f| f.predictor.to_string())
                    .unwrap_or_default();
                let churn = format!("{:.6}", p.churn_probability);
                let time = format!("{:.4}", p.expected_time_to_event);
                writer.write_record([subject.as_str(), churn.as_str(), time.as_str(), top.as_str()])?;
            }
            Err(e) => {
                failures += 1;
                log::warn!("Skipping subject {subject}: {e}");
            }
        }
    }
    writer.flush()?;

    println!(
        "Predictions for {} subjects saved to: {}",
        requests.len() - failures,
        args.out.display()
    );
    Ok(())
}

pub fn explain(args: ExplainArgs) -> Result<(), Box<dyn std::error::Error>> {
    let cache = load_cache(&args.model, args.config.as_ref())?;
    let records = load_metrics(&args.data)?;
    let subject = SubjectId::new(args.subject);
    let record = records
        .iter()
        .find(|r| r.subject_id == subject)
        .ok_or_else(|| format!("subject '{subject}' not found in {}", args.data.display()))?;
    let features = record.features();

    let churn = cache.predict_churn_probability(&subject, Some(&features))?;
    println!("Subject: {subject}");
    println!("Churn probability: {churn:.4}");
    match cache.predict_time_to_event(&subject, None) {
        Ok(t) => println!("Expected time to churn: {t:.2} days"),
        Err(e) => println!("Expected time to churn: unavailable ({e})"),
    }
    println!("Risk factors (largest first):");
    for factor in cache.churn_risk_factors(&subject, None)? {
        println!(
            "  {:<22} {:>+12.6}",
            factor.predictor.name(),
            factor.contribution
        );
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Train(args)) => train(args),
        Some(Commands::Predict(args)) => predict(args),
        Some(Commands::Explain(args)) => explain(args),
        Some(Commands::Version) => {
            println!("churnsurv {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => Cli::command().print_help().map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
