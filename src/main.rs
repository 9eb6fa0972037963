use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;

use imfcs_reader::data::discovery::scan_input_folder;
use imfcs_reader::{BatchLoader, FieldValue, ImageCollection, LoadMode, LoaderPhase};

/// Load an ImFCS export folder and summarize what it contains.
#[derive(Debug, Parser)]
#[command(name = "imfcs-reader", version, about)]
struct Args {
    /// Folder with the *_AVR.tif / *.xlsx export files.
    input_folder: PathBuf,

    /// Collection label shown in the summary and stored in snapshots.
    #[arg(long, default_value = "experiment")]
    label: String,

    /// Decode entries on a worker pool instead of one at a time.
    #[arg(long)]
    concurrent: bool,

    /// Worker-pool size for --concurrent.
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Write a collection snapshot (JSON) after loading.
    #[arg(long)]
    save: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let groups = scan_input_folder(&args.input_folder)
        .with_context(|| format!("scanning {}", args.input_folder.display()))?;
    let collection = ImageCollection::from_groups(&args.label, &groups);
    println!(
        "{}: {} file group(s) in {}",
        args.label,
        collection.len(),
        args.input_folder.display()
    );

    let mode = if args.concurrent {
        LoadMode::Concurrent {
            workers: args.workers,
        }
    } else {
        LoadMode::Sequential
    };

    let collection = Arc::new(Mutex::new(collection));
    let mut loader = BatchLoader::new(Arc::clone(&collection), &args.input_folder, mode);
    loader.start();
    loader.wait();

    if loader.phase() != LoaderPhase::Completed {
        anyhow::bail!("batch load did not complete (phase: {:?})", loader.phase());
    }
    println!("loaded: {}%", loader.progress_percent());

    let collection = collection.lock().unwrap();
    for entry in collection.entries() {
        match entry.field("acf1") {
            Ok(FieldValue::Grid(acf)) => {
                let (height, width, num_lag) = acf.dim();
                println!(
                    "  {:<24} {width}x{height} px, {num_lag} lag times",
                    entry.key()
                );
            }
            _ => println!("  {:<24} not loaded", entry.key()),
        }
    }

    if let Some(path) = &args.save {
        imfcs_reader::persist::save_collection(path, &collection)
            .with_context(|| format!("writing snapshot {}", path.display()))?;
        println!("snapshot written to {}", path.display());
    }

    Ok(())
}
