use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::error::InquireResult;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use semstore::config::{default_base_path, Config};
use semstore::semantic::similarity::l2_norm;
use semstore::{HybridWeights, VectorMetadata, VectorStore};

mod cli;
use cli::{parse_list, Command};

#[derive(Deserialize)]
struct ImportItem {
    id: String,
    #[serde(default)]
    metadata: VectorMetadata,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let base_path: PathBuf = match args.base_path {
        Some(path) => path,
        None => default_base_path()?,
    };
    tracing::debug!(base_path = %base_path.display(), "loading config");
    let config = Config::load_with(&base_path)?;

    let store = VectorStore::open(&config, &base_path)?;

    match args.command {
        Command::Index {
            id,
            description,
            keywords,
            transcript,
            people,
            media_type,
            created_at,
            duration,
        } => {
            let metadata = VectorMetadata {
                description,
                keywords: keywords.as_deref().map(parse_list).unwrap_or_default(),
                transcript,
                people: people.as_deref().map(parse_list),
                media_type,
                duration,
                created_at,
                location: None,
            };

            if !store.index_metadata(id.clone(), metadata) {
                bail!("Nothing to embed for '{id}', provide a description, keywords, transcript or people");
            }
            store.save_to_disk()?;

            println!("{}", serde_json::to_string_pretty(&store.get(&id))?);
            Ok(())
        }

        Command::Import { file } => {
            let data = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let items: Vec<ImportItem> = serde_json::from_str(&data)
                .with_context(|| format!("{} is not a JSON array of items", file.display()))?;

            let bar = ProgressBar::new(items.len() as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                    .progress_chars("#>-"),
            );

            let mut skipped = 0;
            for item in items {
                if !store.index_metadata(item.id, item.metadata) {
                    skipped += 1;
                }
                bar.inc(1);
            }
            bar.finish_and_clear();

            store.save_to_disk()?;
            println!("{} items indexed, {} skipped", bar.position() - skipped, skipped);
            Ok(())
        }

        Command::Search {
            query,
            top_k,
            threshold,
            filters,
        } => {
            let results = store.search(
                &query,
                top_k.unwrap_or(config.store.default_top_k),
                threshold.unwrap_or(config.store.default_threshold),
                filters.into_filters().as_ref(),
            );
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }

        Command::Hybrid {
            query,
            top_k,
            keyword_weight,
            semantic_weight,
            filters,
        } => {
            let defaults = config.store.weights();
            let weights = HybridWeights::new(
                keyword_weight.unwrap_or(defaults.keyword),
                semantic_weight.unwrap_or(defaults.semantic),
            );

            let results = store.hybrid_search(
                &query,
                top_k.unwrap_or(config.store.default_top_k),
                weights,
                filters.into_filters().as_ref(),
            );
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }

        Command::Get { id } => match store.get(&id) {
            Some(entry) => {
                println!("{}", serde_json::to_string_pretty(&entry)?);
                Ok(())
            }
            None => bail!("No item with id '{id}'"),
        },

        Command::Delete { id } => {
            if !store.delete(&id) {
                bail!("No item with id '{id}'");
            }
            store.save_to_disk()?;
            println!("'{id}' removed");
            Ok(())
        }

        Command::Count {} => {
            println!("{} items", store.count());
            Ok(())
        }

        Command::Rebuild {} => {
            let report = store.rebuild_embeddings();
            if !report.saved {
                bail!("Rebuilt {} items but failed to save them", report.rebuilt);
            }
            println!("{} items rebuilt, {} skipped", report.rebuilt, report.skipped);
            Ok(())
        }

        Command::Clear { yes } => {
            if !yes {
                match inquire::prompt_confirmation(format!(
                    "Are you sure you want to delete {} items?",
                    store.count()
                )) {
                    InquireResult::Ok(true) => {}
                    InquireResult::Ok(false) => return Ok(()),
                    InquireResult::Err(err) => bail!("An error occurred: {}", err),
                }
            }

            store.clear()?;
            println!("Store cleared");
            Ok(())
        }

        Command::Embed { text, vector } => {
            let Some((tier, embedding)) = store.engine().embed_with_tier(&text) else {
                bail!("Text produced no embedding");
            };

            println!("tier: {tier}");
            println!("dimensions: {}", embedding.len());
            println!("norm: {:.4}", l2_norm(&embedding));
            if vector {
                println!("{}", serde_json::to_string(&embedding)?);
            }
            Ok(())
        }
    }
}
