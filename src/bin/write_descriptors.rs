//! Write architecture descriptors for the crop catalog
//!
//! Persists `<stem>.arch.json` for every crop so the topology travels with the
//! weights. With `--init-weights`, also writes randomly initialised `<stem>.mpk`
//! files for crops that have none (useful for smoke-testing the server).
//!
//! Usage: cargo run --release --bin write_descriptors -- --models-dir model

use std::path::PathBuf;

use clap::Parser;

use cropscan::backend::{backend_name, default_device, InferenceBackend};
use cropscan::model::{descriptor_path, save_crop_net, weights_file, CropNet};
use cropscan::CropCatalog;

#[derive(Parser, Debug)]
#[command(name = "write_descriptors")]
#[command(about = "Write .arch.json descriptors next to crop model weights")]
struct Args {
    /// Directory holding the weight files
    #[arg(short, long, default_value = cropscan::DEFAULT_MODELS_DIR)]
    models_dir: PathBuf,

    /// JSON catalog to use instead of the built-in crops
    #[arg(short, long)]
    catalog: Option<PathBuf>,

    /// Overwrite descriptors that already exist
    #[arg(short, long)]
    force: bool,

    /// Save randomly initialised weights where no weight file exists
    #[arg(long)]
    init_weights: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let catalog = match &args.catalog {
        Some(path) => CropCatalog::from_file(path)?,
        None => CropCatalog::builtin(),
    };

    println!("=== Descriptor Export ===");
    println!("Models dir: {}", args.models_dir.display());
    println!("Crops: {}", catalog.crops.len());
    println!();

    let device = default_device();
    for spec in &catalog.crops {
        let path = descriptor_path(&args.models_dir, &spec.weights);
        if path.exists() && !args.force {
            println!("  {:<10} skipped, {} exists", spec.crop, path.display());
        } else {
            spec.architecture.save(&path)?;
            println!("  {:<10} wrote {}", spec.crop, path.display());
        }

        if args.init_weights {
            let stem = args.models_dir.join(&spec.weights);
            let file = weights_file(&stem);
            if file.exists() {
                println!("  {:<10} kept {}", spec.crop, file.display());
            } else {
                let net = CropNet::<InferenceBackend>::new(&spec.architecture, &device)?;
                save_crop_net(net, &stem)?;
                println!(
                    "  {:<10} initialised {} on {}",
                    spec.crop,
                    file.display(),
                    backend_name()
                );
            }
        }
    }

    println!();
    println!("Done.");
    Ok(())
}
