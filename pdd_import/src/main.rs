use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use pdd_import::{DecodePipeline, MemoryStore, Settings, fingerprint_bundle};

mod cli;
use cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();

    match cli.command {
        Command::Fingerprint(args) => {
            let settings = Settings::from_json_file(args.settings.as_deref())
                .context("loading settings")?;
            let report = fingerprint_bundle(&args.bundle, &settings).with_context(|| {
                format!("fingerprinting bundle {}", args.bundle.display())
            })?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Import(args) => {
            let settings = Settings::from_json_file(args.bundle.settings.as_deref())
                .context("loading settings")?;
            let mut store = MemoryStore::new();
            let summary = DecodePipeline::new(&args.bundle.bundle, &settings, &mut store)
                .run()
                .with_context(|| format!("importing bundle {}", args.bundle.bundle.display()))?;

            let json = store.to_json().context("serialising decoded records")?;
            fs::write(&args.output, json)
                .with_context(|| format!("writing {}", args.output.display()))?;
            if let Some(dir) = args.images_out.as_ref() {
                let written = store
                    .export_images(dir)
                    .with_context(|| format!("writing images to {}", dir.display()))?;
                println!("Wrote {written} images to {}", dir.display());
            }
            println!(
                "Decoded {} topics, {} questions, {} comments, {} regulations into {}",
                summary.topics,
                summary.questions,
                summary.comments,
                summary.traffregs,
                args.output.display()
            );
        }
    }

    Ok(())
}
