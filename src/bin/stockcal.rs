use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use stockcal::campaign::{CalibrationLoop, CampaignJournal, CommandEngine};
use stockcal::config::CalibrationConfig;
use stockcal::series::{parse_timeseries_file, CsvReferenceSource, ReferenceSource};
use stockcal::stock::{load_archetypes_file, ReferencePopulation, TypeMapping};
use stockcal::validation::ValidationScorer;

#[derive(Parser)]
#[command(name = "stockcal")]
#[command(about = "Building-stock energy model calibration CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scores one simulated timeseries against metered reference data
    Score {
        /// Metered reference CSV
        #[arg(short, long)]
        reference: PathBuf,

        /// Engine timeseries CSV
        #[arg(short, long)]
        simulated: PathBuf,

        /// Configuration file providing objective weights
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "markdown")]
        format: String,

        /// Output file path
        #[arg(short, long)]
        output_file: Option<PathBuf>,
    },

    /// Runs a calibration campaign with an external simulation program
    Run {
        /// Configuration file; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Selected archetypes CSV
        #[arg(short, long)]
        archetypes: PathBuf,

        #[arg(long, default_value = "building_id")]
        id_column: String,

        #[arg(long, default_value = "sub_type")]
        sub_type_column: String,

        /// Census population CSV
        #[arg(short, long)]
        population: PathBuf,

        #[arg(long, default_value = "class")]
        class_column: String,

        /// Count column; without it every population row is one building
        #[arg(long)]
        count_column: Option<String>,

        /// Metered reference CSV for the configured reference year
        #[arg(short, long)]
        reference: PathBuf,

        /// Simulation program run once per building
        #[arg(short, long)]
        engine: PathBuf,

        /// Argument template for the engine ({building}, {params}, {output})
        #[arg(long = "engine-arg", allow_hyphen_values = true)]
        engine_args: Vec<String>,

        /// Directory holding per-building engine runs
        #[arg(long, default_value = "runs")]
        work_dir: PathBuf,

        /// Per-building engine timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Overrides the configured iteration budget
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Replays the configured journal before running
        #[arg(long)]
        resume: bool,

        /// Output format
        #[arg(short, long, default_value = "markdown")]
        format: String,

        /// Output file path
        #[arg(short, long)]
        output_file: Option<PathBuf>,
    },

    /// Writes the default configuration
    InitConfig {
        #[arg(short, long, default_value = "stockcal.json")]
        output: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<CalibrationConfig> {
    let mut config = match path {
        Some(path) => CalibrationConfig::from_file(path)?,
        None => CalibrationConfig::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

fn emit(output: String, output_file: Option<PathBuf>) -> anyhow::Result<()> {
    if let Some(path) = output_file {
        std::fs::write(&path, output)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Report saved to {:?}", path);
    } else {
        println!("{}", output);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Score {
            reference,
            simulated,
            config,
            format,
            output_file,
        } => {
            let config = load_config(config.as_ref())?;
            let year = config.campaign.reference_year;
            let reference = CsvReferenceSource::new()
                .with_year(year, reference)
                .load(year)?;
            let simulated = parse_timeseries_file(&simulated)?;

            let scorer = ValidationScorer::new(reference, config.objective)?;
            let metrics = scorer.metrics(&simulated)?;
            let score = scorer.objective(&metrics);

            let output = match format.as_str() {
                "markdown" => format!(
                    "# Validation\n\n{}\n**Objective:** {:.6}\n",
                    metrics.to_markdown(),
                    score
                ),
                "json" => serde_json::to_string_pretty(&serde_json::json!({
                    "metrics": metrics,
                    "objective": score,
                }))?,
                _ => anyhow::bail!("Unsupported format: {}", format),
            };
            emit(output, output_file)?;
        }

        Commands::Run {
            config,
            archetypes,
            id_column,
            sub_type_column,
            population,
            class_column,
            count_column,
            reference,
            engine,
            engine_args,
            work_dir,
            timeout,
            max_iterations,
            resume,
            format,
            output_file,
        } => {
            if format != "markdown" && format != "json" {
                anyhow::bail!("Unsupported format: {}", format);
            }

            let config = load_config(config.as_ref())?;
            let archetypes = load_archetypes_file(&archetypes, &id_column, &sub_type_column)?;
            let population =
                ReferencePopulation::from_file(&population, &class_column, count_column.as_deref())?;
            let year = config.campaign.reference_year;
            let reference = CsvReferenceSource::new().with_year(year, reference);

            let mut command = CommandEngine::new(engine, work_dir);
            if !engine_args.is_empty() {
                command = command.with_args(engine_args);
            }
            if let Some(secs) = timeout {
                command = command.with_timeout(Duration::from_secs(secs));
            }

            let budget = max_iterations.unwrap_or(config.campaign.max_iterations);
            let threshold = config.campaign.convergence_threshold;
            let journal_path = config.campaign.journal_path.clone();

            let mut calibration = CalibrationLoop::new(
                config,
                archetypes,
                population,
                TypeMapping::residential_default(),
                Box::new(reference),
                Box::new(command),
            )?;

            if resume {
                let path = journal_path
                    .context("--resume needs campaign.journal_path in the configuration")?;
                if path.exists() {
                    calibration.resume_from(&CampaignJournal::open(path)?)?;
                }
            }

            let result = calibration.run_campaign(budget, threshold)?;
            let output = match format.as_str() {
                "json" => result.to_json()?,
                _ => result.to_markdown(),
            };
            emit(output, output_file)?;
        }

        Commands::InitConfig { output } => {
            CalibrationConfig::default().to_file(&output)?;
            println!("Default configuration written to {:?}", output);
        }
    }

    Ok(())
}
