use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use unirank_core::RankingType;
use unirank_storage::PgUniversityStore;
use unirank_sync::{PipelineConfig, PipelineRequest, DEFAULT_LISTING_LIMIT, DEFAULT_MIN_PER_COUNTRY};

#[derive(Debug, Parser)]
#[command(name = "unirank-cli")]
#[command(about = "University ranking aggregator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the pipeline once.
    Sync {
        /// Comma-separated country list.
        #[arg(long, value_delimiter = ',', required = true)]
        countries: Vec<String>,
        #[arg(long = "type", default_value = "world")]
        ranking_type: RankingType,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        region: Option<String>,
        #[arg(long, default_value_t = DEFAULT_MIN_PER_COUNTRY)]
        min_per_country: usize,
        /// Only use the built-in synthetic source.
        #[arg(long)]
        mock: bool,
        /// Rows kept from each listing fetch.
        #[arg(long, default_value_t = DEFAULT_LISTING_LIMIT)]
        limit: usize,
        /// Follow topuniversities.com profile links to fill missing fields.
        #[arg(long)]
        enrich_details: bool,
    },
    /// Apply database migrations.
    Migrate,
    /// Start the HTTP server (and the scheduler when enabled).
    Serve,
    /// Print a markdown digest of recent runs.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            countries,
            ranking_type,
            year,
            subject,
            region,
            min_per_country,
            mock,
            limit,
            enrich_details,
        } => {
            info!(countries = ?countries, %ranking_type, mock, "sync requested");
            let mut request = PipelineRequest::new(countries);
            request.ranking_type = ranking_type;
            if let Some(year) = year {
                request.year = year;
            }
            request.subject = subject;
            request.region = region;
            request.min_per_country = min_per_country;
            request.use_mock_data = mock;
            request.limit = limit;
            request.enrich_details = enrich_details;

            let outcome = unirank_sync::run_from_env(request).await?;
            let report = &outcome.report;
            println!(
                "sync complete: run_id={} records={} created={} updated={} failed={} synthesized={}",
                report.run_id,
                report.total_records,
                report.created_count,
                report.updated_count,
                report.failures.len(),
                report.synthesized_records
            );
            if let Some(dir) = &outcome.reports_dir {
                println!("reports: {}", dir.display());
            }
        }
        Commands::Migrate => {
            let config = PipelineConfig::from_env();
            let url = config.database_url.context("DATABASE_URL must be set to migrate")?;
            info!("applying migrations");
            let store = PgUniversityStore::connect(&url).await.context("connecting to postgres")?;
            store.migrate().await.context("applying migrations")?;
            println!("migrations applied");
        }
        Commands::Serve => {
            unirank_web::serve_from_env().await?;
        }
        Commands::Report { runs } => {
            let config = PipelineConfig::from_env();
            info!(runs, dir = %config.reports_dir.display(), "rendering run digest");
            println!("{}", unirank_sync::report_markdown(runs, &config.reports_dir)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_flags_parse_with_defaults() {
        let cli = Cli::try_parse_from(["unirank-cli", "sync", "--countries", "Japan,Canada", "--limit", "25"]).unwrap();
        let Commands::Sync {
            countries,
            limit,
            enrich_details,
            min_per_country,
            ..
        } = cli.command
        else {
            panic!("expected sync");
        };
        assert_eq!(countries, vec!["Japan", "Canada"]);
        assert_eq!(limit, 25);
        assert!(!enrich_details);
        assert_eq!(min_per_country, DEFAULT_MIN_PER_COUNTRY);
    }
}
