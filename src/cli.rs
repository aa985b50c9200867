use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args as ClapArgs, Parser, Subcommand};
use semstore::{MediaType, SearchFilters};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Data directory. Defaults to $SEMSTORE_BASE_PATH or ~/.local/share/semstore
    #[clap(long, global = true)]
    pub base_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only items created at or after this time (RFC 3339)
    #[clap(long)]
    pub from: Option<DateTime<Utc>>,

    /// Only items created at or before this time (RFC 3339)
    #[clap(long)]
    pub to: Option<DateTime<Utc>>,

    /// Only items of this media type (photo, video, audio, document)
    #[clap(short = 'm', long)]
    pub media_type: Option<MediaType>,

    /// Only items featuring this person (substring, case-insensitive)
    #[clap(short, long)]
    pub person: Option<String>,
}

impl FilterArgs {
    pub fn into_filters(self) -> Option<SearchFilters> {
        let filters = SearchFilters {
            start_date: self.from,
            end_date: self.to,
            media_type: self.media_type,
            person: self.person,
        };
        (!filters.is_empty()).then_some(filters)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Embed and store one item
    Index {
        /// Item id. Replaces an existing item with the same id.
        id: String,

        /// Item description
        #[clap(short, long, default_value = "")]
        description: String,

        /// Comma separated keywords
        #[clap(short = 'k', long)]
        keywords: Option<String>,

        /// Spoken text, cut to 500 characters before embedding
        #[clap(long)]
        transcript: Option<String>,

        /// Comma separated names
        #[clap(long)]
        people: Option<String>,

        #[clap(short = 'm', long, default_value = "photo")]
        media_type: MediaType,

        /// Creation time (RFC 3339)
        #[clap(long)]
        created_at: Option<DateTime<Utc>>,

        /// Duration in seconds
        #[clap(long)]
        duration: Option<f64>,
    },
    /// Index items from a JSON array of {"id": ..., "metadata": {...}}
    Import {
        file: PathBuf,
    },
    /// Semantic search
    Search {
        query: String,

        /// Max results. Config default when omitted.
        #[clap(short = 'k', long)]
        top_k: Option<usize>,

        /// Minimum similarity [0.0, 1.0]. Config default when omitted.
        #[clap(short, long)]
        threshold: Option<f32>,

        #[clap(flatten)]
        filters: FilterArgs,
    },
    /// Keyword and semantic search combined
    Hybrid {
        query: String,

        /// Max results. Config default when omitted.
        #[clap(short = 'k', long)]
        top_k: Option<usize>,

        #[clap(long)]
        keyword_weight: Option<f32>,

        #[clap(long)]
        semantic_weight: Option<f32>,

        #[clap(flatten)]
        filters: FilterArgs,
    },
    /// Print a stored item
    Get {
        id: String,
    },
    /// Remove a stored item
    Delete {
        id: String,
    },
    /// Print the number of stored items
    Count {},
    /// Recompute every vector with the current embedding setup
    Rebuild {},
    /// Remove every item and the store file
    Clear {
        /// Auto confirm
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },
    /// Print which tier embeds a text, and the resulting vector's shape
    Embed {
        text: String,

        /// Print the vector itself
        #[clap(long, default_value = "false")]
        vector: bool,
    },
}

/// Split a comma separated list, dropping empty items.
pub fn parse_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}
