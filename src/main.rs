use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use news_reels::{
    config::Config, logging::init_logging, ArticleId, CardView, FeedController, FeedStatus,
    HttpBackend, NewsBackend, ReelViewport, SearchController,
};

/// How long to wait for interaction sends still in flight before exiting.
const SEND_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Summarized news reels and Q&A over the same articles",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load the feed and scroll through every card
    Feed {
        /// Expand this article after scrolling
        #[arg(long)]
        open: Option<String>,
    },
    /// Ask a question about the news
    Search { query: Vec<String> },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load()?;
    println!("Using backend {} as user {}", config.backend_url, config.user_id);
    let backend: Arc<dyn NewsBackend> = Arc::new(HttpBackend::new(config.backend_url.clone()));

    match cli.command {
        Commands::Feed { open } => run_feed(&config, backend, open.map(ArticleId::new)).await,
        Commands::Search { query } => run_search(&config, backend, query.join(" ")).await,
    }

    Ok(())
}

async fn run_feed(config: &Config, backend: Arc<dyn NewsBackend>, open: Option<ArticleId>) {
    let reel = Arc::new(ReelViewport::new(config.viewport_rows, config.card_rows));
    let mut feed =
        FeedController::new(backend, config.user_id.clone(), reel.clone(), reel.clone());

    println!("Loading feed...");
    feed.load().await;
    if feed.status() == FeedStatus::Empty {
        println!("No articles found. Try running the scraper!");
        return;
    }

    for index in 0..feed.cards().len() {
        reel.snap_to(index);
    }

    if let Some(id) = &open {
        feed.tap(id);
    }

    for card in feed.cards() {
        match card.view() {
            CardView::Collapsed { short_summary, source } => {
                println!("[{}] {}\n    {}", card.id(), short_summary, source);
            }
            CardView::Expanded {
                title,
                long_summary,
                url,
                source,
                published_at,
            } => {
                let date = published_at
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                println!("[{}] {}\n    {} {}", card.id(), title, source, date);
                println!("\n{}\n\nRead full article: {}", long_summary, url);
            }
        }
    }

    // The runtime stops when main returns; let dispatched sends land first.
    if !feed.emitter().flush(SEND_GRACE).await {
        eprintln!("Some interactions were still being sent at exit.");
    }
}

async fn run_search(config: &Config, backend: Arc<dyn NewsBackend>, query: String) {
    let mut search = SearchController::new(backend, config.user_id.clone());

    match search.search(query).await {
        Some(result) => {
            println!("AI Answer\n\n{}\n\nSources", result.answer);
            for article in &result.related_articles {
                println!("- {}\n  {}", article.title, article.short_summary);
            }
        }
        None => println!("No answer."),
    }
}
