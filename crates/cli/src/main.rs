use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;

use faceindex_core::cache::infrastructure::cache_store::CacheStore;
use faceindex_core::clustering::cluster_engine::ClusterEngine;
use faceindex_core::embedding::embedding_generator::EmbeddingGenerator;
use faceindex_core::pipeline::batch_driver::{self, BatchDriver};
use faceindex_core::pipeline::batch_logger::LogBatchLogger;
use faceindex_core::pipeline::infrastructure::threaded_batch_executor::{
    onnx_factory, ThreadedBatchExecutor,
};
use faceindex_core::query::comparison_service::{
    ComparisonService, MatchOptions, DEFAULT_MATCH_LIMIT,
};
use faceindex_core::shared::config::FaceIndexConfig;
use faceindex_core::shared::constants::{
    EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, YOLO_MODEL_NAME, YOLO_MODEL_URL,
};
use faceindex_core::shared::model_resolver;

/// Face indexing, clustering and similarity search over video frames.
#[derive(Parser)]
#[command(name = "faceindex")]
struct Cli {
    /// Config file (defaults to the user config, then built-in defaults).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory holding the index and embedding files.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Embed every new or modified frame under ROOT.
    Index {
        root: PathBuf,

        /// Rebuild the index from embedding files without embedding anything.
        #[arg(long)]
        rebuild_index_only: bool,
    },
    /// Rebuild the index from the embedding files in the cache.
    Rebuild,
    /// Report cache defects as JSON.
    Validate,
    /// Repair cache defects, regenerating broken embeddings.
    Cleanup,
    /// Group cached faces into identities.
    Cluster {
        /// Similarity threshold (0.0-1.0).
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Compare the most confident face of two images.
    Compare { first: PathBuf, second: PathBuf },
    /// Find cached frames resembling the face in IMAGE.
    Search {
        image: PathBuf,

        /// Similarity threshold (0.0-1.0).
        #[arg(long)]
        threshold: Option<f64>,

        /// Maximum number of matches.
        #[arg(long, default_value_t = DEFAULT_MATCH_LIMIT)]
        limit: usize,

        /// Skip frames with fewer faces.
        #[arg(long)]
        min_faces: Option<usize>,

        /// Skip frames with more faces.
        #[arg(long)]
        max_faces: Option<usize>,
    },
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;
    let config = load_config(&cli)?;
    let store = CacheStore::from_config(&config);

    match cli.command {
        Command::Index {
            root,
            rebuild_index_only,
        } => {
            if rebuild_index_only {
                run_rebuild(&store)?;
            } else {
                run_index(&root, &config)?;
            }
        }
        Command::Rebuild => run_rebuild(&store)?,
        Command::Validate => {
            let defects = store.validate(&store.load());
            print_json(&defects)?;
        }
        Command::Cleanup => {
            let mut embedder = build_generator(&config)?;
            let mut index = store.load();
            let report = store.cleanup(&mut index, &mut embedder)?;
            print_json(&report)?;
        }
        Command::Cluster { threshold } => {
            let threshold = threshold.unwrap_or(config.similarity_threshold);
            print_json(&ClusterEngine::new(&store).cluster(threshold))?;
        }
        Command::Compare { first, second } => {
            let mut service = ComparisonService::new(Box::new(build_generator(&config)?));
            let comparison = service.compare(&read_image(&first)?, &read_image(&second)?)?;
            print_json(&comparison)?;
        }
        Command::Search {
            image,
            threshold,
            limit,
            min_faces,
            max_faces,
        } => {
            let options = MatchOptions {
                threshold: threshold.unwrap_or(config.similarity_threshold),
                limit,
                min_faces,
                max_faces,
            };
            let mut service = ComparisonService::new(Box::new(build_generator(&config)?));
            let matches = service.find_similar(&store, &read_image(&image)?, &options)?;
            print_json(&matches)?;
        }
    }

    Ok(())
}

fn run_index(root: &Path, config: &FaceIndexConfig) -> Result<(), Box<dyn std::error::Error>> {
    prefetch_models(config)?;
    let executor = ThreadedBatchExecutor::new(config.worker_count(), onnx_factory(config.clone()));
    log::info!("Indexing {} with {} workers", root.display(), executor.worker_count());

    let mut driver = BatchDriver::new(CacheStore::from_config(config), Box::new(executor))
        .with_batch_size(config.batch_size)
        .with_logger(Box::new(LogBatchLogger::default()));
    let report = driver.process_directory(root)?;
    print_json(&report)
}

fn run_rebuild(store: &CacheStore) -> Result<(), Box<dyn std::error::Error>> {
    let entries = batch_driver::rebuild_index_only(store)?;
    eprintln!("Index rebuilt: {entries} entries");
    Ok(())
}

fn load_config(cli: &Cli) -> Result<FaceIndexConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => FaceIndexConfig::load_from(path)?,
        None => FaceIndexConfig::load(),
    };
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn build_generator(
    config: &FaceIndexConfig,
) -> Result<EmbeddingGenerator, Box<dyn std::error::Error>> {
    prefetch_models(config)?;
    Ok(EmbeddingGenerator::with_onnx_models(config)?)
}

/// Downloads missing models up front so workers only ever find them locally.
fn prefetch_models(config: &FaceIndexConfig) -> Result<(), Box<dyn std::error::Error>> {
    for (name, url) in [
        (YOLO_MODEL_NAME, YOLO_MODEL_URL),
        (EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL),
    ] {
        model_resolver::resolve(
            name,
            url,
            config.model_dir.as_deref(),
            Some(Box::new(download_progress)),
        )?;
    }
    Ok(())
}

fn read_image(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    fs::read(path).map_err(|e| format!("Cannot read {}: {e}", path.display()).into())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = &cli.config {
        if !path.is_file() {
            return Err(format!("Config file not found: {}", path.display()).into());
        }
    }
    match &cli.command {
        Command::Index {
            root,
            rebuild_index_only: false,
        } if !root.is_dir() => {
            return Err(format!("Frame directory not found: {}", root.display()).into());
        }
        Command::Compare { first, second } => {
            for path in [first, second] {
                if !path.is_file() {
                    return Err(format!("Image not found: {}", path.display()).into());
                }
            }
        }
        Command::Search { image, .. } if !image.is_file() => {
            return Err(format!("Image not found: {}", image.display()).into());
        }
        _ => {}
    }
    let threshold = match &cli.command {
        Command::Cluster { threshold } | Command::Search { threshold, .. } => *threshold,
        _ => None,
    };
    if let Some(t) = threshold {
        if !(0.0..=1.0).contains(&t) {
            return Err(format!("Threshold must be between 0.0 and 1.0, got {t}").into());
        }
    }
    if let Command::Search {
        limit,
        min_faces,
        max_faces,
        ..
    } = &cli.command
    {
        if *limit == 0 {
            return Err("Limit must be at least 1".into());
        }
        if let (Some(min), Some(max)) = (min_faces, max_faces) {
            if min > max {
                return Err(format!("--min-faces ({min}) exceeds --max-faces ({max})").into());
            }
        }
    }
    Ok(())
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading model... {pct}%");
    } else {
        eprint!("\rDownloading model... {downloaded} bytes");
    }
}
