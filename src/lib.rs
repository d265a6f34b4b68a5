pub mod config;
pub mod model;
pub mod search;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use config::{FallbackRanking, IndexLocation, SearchConfig};
use model::types::{Locale, ResultSource, SearchResultSet};
use search::SearchOrchestrator;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "content-search",
    version,
    about = "Query the site search pipeline with live backend and static-index fallback"
)]
pub struct Cli {
    /// Backend origin (also hosts the static index unless --index-dir is set)
    #[arg(long, env = "CONTENT_SEARCH_BASE_URL")]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one query through the pipeline and print the grouped result
    Search {
        /// Free-text query (3 to 100 characters after trimming)
        query: String,

        #[arg(long, value_enum, default_value_t = Locale::De)]
        locale: Locale,

        /// Print the result set as JSON
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Primary backend budget before falling back
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Result limit forwarded to the backend
        #[arg(long)]
        limit: Option<usize>,

        /// Read search-index-<locale>.json from this directory instead of the site host
        #[arg(long)]
        index_dir: Option<PathBuf>,

        /// Ordering of fallback matches
        #[arg(long, value_enum)]
        ranking: Option<FallbackRanking>,
    },
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            query,
            locale,
            json,
            timeout_ms,
            limit,
            index_dir,
            ranking,
        } => {
            let mut config = SearchConfig::from_env();
            if let Some(url) = cli.base_url {
                config = config.with_base_url(url);
            }
            if let Some(ms) = timeout_ms {
                config.primary_timeout = std::time::Duration::from_millis(ms);
            }
            if let Some(limit) = limit {
                config.result_limit = limit;
            }
            if let Some(dir) = index_dir {
                config.index_location = IndexLocation::Directory(dir);
            }
            if let Some(ranking) = ranking {
                config.fallback_ranking = ranking;
            }
            run_search(config, &query, locale, json).await
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "content-search", &mut std::io::stdout());
            Ok(())
        }
        Commands::Man => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            let mut out = std::io::stdout();
            man.render(&mut out)?;
            Ok(())
        }
    }
}

async fn run_search(config: SearchConfig, query: &str, locale: Locale, json: bool) -> Result<()> {
    let orchestrator =
        SearchOrchestrator::from_config(config).context("building search pipeline")?;
    let result = orchestrator.search_content(query, locale).await;

    if json {
        let out = serde_json::to_string_pretty(result.as_ref()).context("encoding result")?;
        println!("{out}");
    } else {
        print!("{}", render_result(&result));
    }
    Ok(())
}

/// Human-readable listing of a result set, one section per collection.
pub fn render_result(result: &SearchResultSet) -> String {
    let mut out = String::new();
    let source = match result.source {
        ResultSource::Primary => "primary".green(),
        ResultSource::Fallback => "fallback".yellow(),
    };
    out.push_str(&format!("source: {source}\n"));
    if let Some(error) = &result.error {
        out.push_str(&format!("{} {error}\n", "error:".red().bold()));
    }
    for (kind, docs) in &result.results {
        out.push_str(&format!("{} ({})\n", kind.as_str().bold(), docs.len()));
        for doc in docs {
            match &doc.slug {
                Some(slug) => out.push_str(&format!("  {}  [{slug}]\n", doc.title)),
                None => out.push_str(&format!("  {}\n", doc.title)),
            }
        }
    }
    out
}
