use clap::Parser;
use market_analyst_agent::{
    config::Config,
    fmp::FmpClient,
    gemini::GeminiClient,
    models::DataKind,
    output::{render, OutputFormat},
    query::{QueryResolver, DEFAULT_PERIODS},
    AgentError, Orchestrator,
};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Ask Gemini for an analysis of a stock, grounded in Financial Modeling Prep data
#[derive(Parser, Debug)]
#[command(name = "market-analyst", version, about)]
struct Cli {
    /// Question naming a ticker ("How is $NVDA doing?") or just the ticker
    question: Vec<String>,

    /// Ticker symbol to look up (overrides any ticker found in the question)
    #[arg(short, long)]
    symbol: Option<String>,

    /// Market data to fetch: quote, profile or income
    #[arg(short, long, default_value_t = DataKind::Quote)]
    data: DataKind,

    /// Annual income statements to include with --data income
    #[arg(long, default_value_t = DEFAULT_PERIODS)]
    years: u8,

    /// Gemini model (defaults to GEMINI_MODEL or gemini-2.0-flash)
    #[arg(short, long)]
    model: Option<String>,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            if e.is_user_error() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli: Cli) -> Result<String, AgentError> {
    let question = cli.question.join(" ");
    let query = QueryResolver::resolve(cli.symbol.as_deref(), &question, cli.data, cli.years)?;

    let mut config = Config::from_env()?;
    if let Some(model) = cli.model {
        config.gemini_model = model;
    }
    config.validate()?;

    info!(
        symbol = %query.symbol,
        kind = %query.data_kind,
        model = %config.gemini_model,
        "Market analyst starting"
    );

    let orchestrator = Orchestrator::new(
        Box::new(FmpClient::new(&config)?),
        Box::new(GeminiClient::new(&config)?),
    );

    let result = orchestrator.run(query).await?;

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    render(&result, format)
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "market_analyst_agent=debug,market_analyst=debug,info"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
