use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use eigenface_core::vectorizer::to_image;
use eigenface_core::{
    load, recognize, MatchResult, ModelHandle, TrainOptions, Trainer, TrainedModel, Vectorizer,
};
use std::io::BufRead;
use std::path::{Path, PathBuf};

mod config;
mod dataset;

use config::Config;

#[derive(Parser)]
#[command(name = "eigenface", about = "Eigenface face recognition CLI")]
struct Cli {
    /// Model directory (overrides EIGENFACE_MODEL_DIR)
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model from a dataset of per-person image folders
    Train {
        /// Dataset root; each sub-directory is one person
        #[arg(short, long)]
        dataset: Option<PathBuf>,
        /// Number of eigenfaces to keep
        #[arg(short = 'k', long)]
        components: Option<usize>,
        /// Fail on eigensolver warnings instead of keeping the best estimate
        #[arg(long)]
        strict: bool,
    },
    /// Recognize a face image against the trained model
    Recognize {
        /// Query image
        image: PathBuf,
        /// Maximum eigenspace distance accepted as a match
        #[arg(short, long)]
        threshold: Option<f64>,
        /// Number of ranked candidates to show
        #[arg(long)]
        top: Option<usize>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Write the first training image of the matched person here (PNG)
        #[arg(long)]
        save_match: Option<PathBuf>,
    },
    /// Show how many images each person has in the dataset
    Dataset {
        /// Dataset root; each sub-directory is one person
        #[arg(short, long)]
        dataset: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Show model statistics
    Info {
        #[arg(long)]
        json: bool,
    },
    /// Export the mean face and leading eigenfaces as images
    Export {
        /// Output directory
        #[arg(short, long)]
        out: PathBuf,
        /// Number of eigenfaces to export
        #[arg(short, long, default_value_t = 8)]
        count: usize,
    },
    /// Recognize image paths read from stdin; `:reload` swaps in the model on disk
    Session {
        #[arg(short, long)]
        threshold: Option<f64>,
        #[arg(long)]
        top: Option<usize>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(model) = cli.model {
        config.model_dir = model;
    }
    let vectorizer = Vectorizer::new(config.image_width, config.image_height)?;

    match cli.command {
        Commands::Train {
            dataset,
            components,
            strict,
        } => {
            let dataset_dir = dataset.unwrap_or_else(|| config.dataset_dir.clone());
            let components = components.unwrap_or(config.components);
            let corpus = dataset::load_corpus(&dataset_dir, &vectorizer)?;

            let trainer = Trainer::new(TrainOptions {
                solver: config.solver,
                strict: strict || config.strict,
            });
            let outcome = trainer.fit(&corpus, components).context("training failed")?;
            for warning in &outcome.warnings {
                println!("warning: {}", warning.clone().into_error());
            }

            let manifest = eigenface_core::save(&outcome.model, &config.model_dir)
                .with_context(|| format!("saving model to {}", config.model_dir.display()))?;

            println!("Model trained and saved to {}", config.model_dir.display());
            print_stats(&outcome.model);
            println!("  model id:         {}", manifest.model_id);
        }
        Commands::Recognize {
            image,
            threshold,
            top,
            json,
            save_match,
        } => {
            let model = load_model(&config.model_dir)?;
            check_dimension(&vectorizer, &model)?;

            let query = vectorizer.from_path(&image)?;
            let threshold = threshold.unwrap_or(config.threshold);
            let result = recognize(&query, &model, threshold, top.unwrap_or(config.top_n))?;

            if json {
                let report = serde_json::json!({
                    "result": result,
                    "confidence": result.confidence(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_result(&result);
            }

            if let Some(out) = save_match {
                if result.accepted {
                    save_matched_face(&model, &vectorizer, &result.best_label, &out)?;
                    println!("Matched face written to {}", out.display());
                } else {
                    println!("No match; {} not written", out.display());
                }
            }
        }
        Commands::Dataset { dataset, json } => {
            let root = dataset.unwrap_or_else(|| config.dataset_dir.clone());
            let summary = dataset::summarize(&root)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else if summary.is_empty() {
                println!(
                    "Dataset {} is empty: add one folder of images per person",
                    root.display()
                );
            } else {
                println!("Dataset {}", root.display());
                for person in &summary.people {
                    println!("  {:<20} {} images", person.label, person.images);
                }
                println!(
                    "  {} people, {} images in total",
                    summary.people.len(),
                    summary.total_images
                );
            }
        }
        Commands::Info { json } => {
            let manifest = eigenface_core::read_manifest(&config.model_dir)?;
            let model = load_model(&config.model_dir)?;
            if json {
                let report = serde_json::json!({
                    "model_id": manifest.model_id,
                    "created_at": manifest.created_at,
                    "people": model.label_count(),
                    "images": model.image_count(),
                    "eigenfaces": model.eigenface_count(),
                    "dimension": model.dimension(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Model {} ({})", manifest.model_id, config.model_dir.display());
                println!("  created:          {}", manifest.created_at);
                print_stats(&model);
            }
        }
        Commands::Export { out, count } => {
            let model = load_model(&config.model_dir)?;
            check_dimension(&vectorizer, &model)?;
            std::fs::create_dir_all(&out)?;

            let (w, h) = (vectorizer.width(), vectorizer.height());
            let mean = eigenface_core::FaceVector::new(model.mean_face().to_owned());
            to_image(&mean, w, h)?.save(out.join("mean_face.png"))?;

            let count = count.min(model.eigenface_count());
            for i in 0..count {
                if let Some(face) = model.eigenface(i) {
                    to_image(&face, w, h)?.save(out.join(format!("eigenface_{i:02}.png")))?;
                }
            }
            println!("Exported mean face and {count} eigenfaces to {}", out.display());
        }
        Commands::Session { threshold, top } => {
            let handle = ModelHandle::new(load_model(&config.model_dir)?);
            check_dimension(&vectorizer, &handle.snapshot())?;
            let threshold = threshold.unwrap_or(config.threshold);
            let top = top.unwrap_or(config.top_n);

            println!("Ready. Enter image paths, `:reload` or `:quit`.");
            for line in std::io::stdin().lock().lines() {
                let line = line?;
                match line.trim() {
                    "" => continue,
                    ":quit" => break,
                    ":reload" => match reload(&handle, &vectorizer, &config.model_dir) {
                        Ok(()) => println!("Model reloaded"),
                        Err(e) => eprintln!("reload failed, keeping current model: {e:#}"),
                    },
                    path => {
                        let outcome = vectorizer
                            .from_path(Path::new(path))
                            .and_then(|query| handle.recognize(&query, threshold, top));
                        match outcome {
                            Ok(result) => print_result(&result),
                            Err(e) => eprintln!("{path}: {e}"),
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

fn load_model(dir: &Path) -> Result<TrainedModel> {
    load(dir).with_context(|| format!("loading model from {}", dir.display()))
}

/// Swap the model on disk into `handle`, only if it fits `vectorizer`.
fn reload(handle: &ModelHandle, vectorizer: &Vectorizer, dir: &Path) -> Result<()> {
    let model = load_model(dir)?;
    check_dimension(vectorizer, &model)?;
    handle.replace(model);
    Ok(())
}

fn check_dimension(vectorizer: &Vectorizer, model: &TrainedModel) -> Result<()> {
    if vectorizer.dimension() != model.dimension() {
        bail!(
            "model expects {}-pixel faces but images are resized to {}x{} ({} pixels); \
             set EIGENFACE_IMAGE_WIDTH/EIGENFACE_IMAGE_HEIGHT to match the training run",
            model.dimension(),
            vectorizer.width(),
            vectorizer.height(),
            vectorizer.dimension()
        );
    }
    Ok(())
}

fn print_stats(model: &TrainedModel) {
    println!("  people:           {}", model.label_count());
    println!("  training images:  {}", model.image_count());
    println!("  eigenfaces:       {}", model.eigenface_count());
    println!("  pixels per face:  {}", model.dimension());
}

fn print_result(result: &MatchResult) {
    if result.accepted {
        println!(
            "Match: {} (distance {:.3}, confidence {})",
            result.best_label,
            result.best_distance,
            result.confidence()
        );
    } else {
        println!(
            "No match: nearest is {} at distance {:.3} (threshold {:.3})",
            result.best_label, result.best_distance, result.threshold
        );
    }
    for (rank, candidate) in result.candidates.iter().enumerate() {
        println!(
            "  {}. {} (distance {:.3}, image #{})",
            rank + 1,
            candidate.label,
            candidate.distance,
            candidate.index
        );
    }
}

fn save_matched_face(
    model: &TrainedModel,
    vectorizer: &Vectorizer,
    label: &str,
    out: &Path,
) -> Result<()> {
    let face = model
        .first_index_of(label)
        .and_then(|i| model.training_image(i))
        .with_context(|| format!("no training image for {label}"))?;
    to_image(&face, vectorizer.width(), vectorizer.height())?
        .save(out)
        .with_context(|| format!("writing {}", out.display()))?;
    Ok(())
}
