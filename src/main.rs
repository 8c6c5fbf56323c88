use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ratehub::{
    open_store, AuthorStats, Category, ClaudeAdapter, CommentService, Config, DashboardStats,
    DocumentStore, Insights, RetryPolicy, Review, ReviewDraft, ReviewFilter, ReviewService,
    ReviewSort, Vote, VoteLedger, VoteState,
};

#[derive(Parser)]
#[command(name = "ratehub")]
#[command(about = "Share and vote on reviews of movies, books and games")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(long, default_value = ".ratehub/config.yml")]
    config: PathBuf,

    /// Override the JSON store directory from the config
    #[arg(long)]
    store_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a new review
    Create {
        #[arg(long)]
        title: String,

        /// Review text (or use --content-file)
        #[arg(long, conflicts_with = "content_file")]
        content: Option<String>,

        #[arg(long)]
        content_file: Option<PathBuf>,

        /// Rating from 0.5 to 5
        #[arg(long)]
        rating: f64,

        /// movie, book or game
        #[arg(long)]
        category: Category,

        #[arg(long)]
        image_url: String,

        #[arg(long)]
        year: i32,

        #[arg(long)]
        genre: String,

        /// Signed-in author
        #[arg(long, env = "RATEHUB_USER")]
        author: Option<String>,
    },

    /// Toggle your vote on a review
    Vote {
        /// Review ID
        id: Uuid,

        /// Signed-in voter
        #[arg(long, env = "RATEHUB_USER")]
        user: Option<String>,

        /// Upvote (again to retract)
        #[arg(long, conflicts_with = "down")]
        up: bool,

        /// Downvote (again to retract)
        #[arg(long, conflicts_with = "up")]
        down: bool,
    },

    /// Show a review
    Show {
        /// Review ID
        id: Uuid,
    },

    /// Browse reviews
    List {
        #[arg(long)]
        category: Option<Category>,

        #[arg(long)]
        genre: Option<String>,

        #[arg(long)]
        min_rating: Option<f64>,

        #[arg(long)]
        year: Option<i32>,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        search: Option<String>,

        /// newest, top_rated or most_upvoted
        #[arg(long, default_value = "newest")]
        sort: ReviewSort,
    },

    /// Edit your own review; omitted fields keep their current value
    Edit {
        /// Review ID
        id: Uuid,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, conflicts_with = "content_file")]
        content: Option<String>,

        #[arg(long)]
        content_file: Option<PathBuf>,

        #[arg(long)]
        rating: Option<f64>,

        #[arg(long)]
        category: Option<Category>,

        #[arg(long)]
        image_url: Option<String>,

        #[arg(long)]
        year: Option<i32>,

        #[arg(long)]
        genre: Option<String>,

        /// Signed-in author
        #[arg(long, env = "RATEHUB_USER")]
        user: Option<String>,
    },

    /// Delete your own review
    Delete {
        /// Review ID
        id: Uuid,

        /// Signed-in author
        #[arg(long, env = "RATEHUB_USER")]
        user: Option<String>,
    },

    /// Comment on a review
    Comment {
        /// Review ID
        id: Uuid,

        text: String,

        /// Signed-in commenter
        #[arg(long, env = "RATEHUB_USER")]
        user: Option<String>,
    },

    /// Show the comments on a review, newest first
    Comments {
        /// Review ID
        id: Uuid,
    },

    /// Show dashboard figures, or one author's totals
    Stats {
        #[arg(long)]
        author: Option<String>,
    },

    /// Classify the sentiment of a review text
    Sentiment {
        text: String,
    },

    /// Summarize a review text
    Summarize {
        text: String,
    },

    /// Recommend titles for a described user
    Recommend {
        /// Tastes, history and preferences
        #[arg(long)]
        profile: String,

        #[arg(long)]
        category: Category,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ratehub=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(path) = cli.store_path {
        config.store.path = path;
    }

    match cli.command {
        Commands::Create {
            title,
            content,
            content_file,
            rating,
            category,
            image_url,
            year,
            genre,
            author,
        } => {
            let content = match (content, content_file) {
                (Some(text), _) => text,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read content file: {}", path.display()))?,
                (None, None) => anyhow::bail!("Must specify --content or --content-file"),
            };
            let draft = ReviewDraft {
                title,
                content,
                rating,
                category,
                image_url,
                year,
                genre,
            };

            let service = ReviewService::new(open_store(&config.store).await?);
            let review = service.create(draft, author.as_deref()).await?;
            println!("Created review {}", review.id);
        }
        Commands::Vote { id, user, up, down } => {
            let intent = match (up, down) {
                (true, false) => Vote::Upvote,
                (false, true) => Vote::Downvote,
                _ => anyhow::bail!("Must specify --up or --down"),
            };

            let ledger = VoteLedger::new(open_store(&config.store).await?)
                .with_retry(RetryPolicy::from(&config.voting));
            let outcome = ledger.cast_vote(&id, user.as_deref(), intent).await?;

            let state = match outcome.state {
                VoteState::Upvote => "upvoted",
                VoteState::Downvote => "downvoted",
                VoteState::None => "no vote",
            };
            println!(
                "👍 {}  👎 {}  (you: {})",
                outcome.upvotes, outcome.downvotes, state
            );
        }
        Commands::Show { id } => {
            let service = ReviewService::new(open_store(&config.store).await?);
            let review = service
                .get(&id)
                .await?
                .with_context(|| format!("No review found with id {}", id))?;
            print!("{}", render_review(&review));
        }
        Commands::List {
            category,
            genre,
            min_rating,
            year,
            author,
            search,
            sort,
        } => {
            let filter = ReviewFilter {
                category,
                genre,
                min_rating,
                year,
                author_id: author,
                search,
            };
            let service = ReviewService::new(open_store(&config.store).await?);
            let reviews = service.list(&filter, sort).await?;

            if reviews.is_empty() {
                println!("No reviews match.");
                return Ok(());
            }

            for review in reviews {
                println!(
                    "  [{}] {} ({}, {}) {:.1}/5  +{} -{}",
                    review.category,
                    review.title,
                    review.genre,
                    review.year,
                    review.rating,
                    review.upvotes,
                    review.downvotes
                );
                println!("    ID: {}", review.id);
            }
        }
        Commands::Edit {
            id,
            title,
            content,
            content_file,
            rating,
            category,
            image_url,
            year,
            genre,
            user,
        } => {
            let service = ReviewService::new(open_store(&config.store).await?);
            let current = service
                .get(&id)
                .await?
                .with_context(|| format!("No review found with id {}", id))?;

            let mut draft = current.to_draft();
            if let Some(title) = title {
                draft.title = title;
            }
            if let Some(text) = content {
                draft.content = text;
            } else if let Some(path) = content_file {
                draft.content = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read content file: {}", path.display()))?;
            }
            if let Some(rating) = rating {
                draft.rating = rating;
            }
            if let Some(category) = category {
                draft.category = category;
            }
            if let Some(image_url) = image_url {
                draft.image_url = image_url;
            }
            if let Some(year) = year {
                draft.year = year;
            }
            if let Some(genre) = genre {
                draft.genre = genre;
            }

            let review = service.update(&id, draft, user.as_deref()).await?;
            println!("Updated review {}", review.id);
        }
        Commands::Delete { id, user } => {
            let service = ReviewService::new(open_store(&config.store).await?);
            if service.delete(&id, user.as_deref()).await? {
                println!("Deleted review {}", id);
            } else {
                println!("No review found with id {}", id);
            }
        }
        Commands::Comment { id, text, user } => {
            let service = CommentService::new(open_store(&config.store).await?);
            let comment = service.post(&id, user.as_deref(), &text).await?;
            println!("Posted comment {}", comment.id);
        }
        Commands::Comments { id } => {
            let service = CommentService::new(open_store(&config.store).await?);
            let comments = service.list(&id).await?;

            if comments.is_empty() {
                println!("No comments yet.");
                return Ok(());
            }

            for comment in comments {
                println!(
                    "  {} ({})",
                    comment.author_id,
                    comment.created_at.format("%Y-%m-%d %H:%M")
                );
                println!("    {}", comment.content);
            }
        }
        Commands::Stats { author } => {
            let store = open_store(&config.store).await?;
            let reviews = store.list().await?;
            let json = match author {
                Some(author) => serde_json::to_string_pretty(&AuthorStats::compute(&reviews, &author))?,
                None => serde_json::to_string_pretty(&DashboardStats::compute(
                    &reviews,
                    chrono::Utc::now(),
                ))?,
            };
            println!("{}", json);
        }
        Commands::Sentiment { text } => {
            let analysis = insights(&config)?.analyze_sentiment(&text).await?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Commands::Summarize { text } => {
            let summary = insights(&config)?.summarize_review(&text).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Recommend { profile, category } => {
            let titles = insights(&config)?.recommend(&profile, category).await?;
            for title in titles {
                println!("- {}", title);
            }
        }
    }

    Ok(())
}

fn insights(config: &Config) -> Result<Insights<ClaudeAdapter>> {
    let api_key = std::env::var("ANTHROPIC_API_KEY").context("ANTHROPIC_API_KEY not set")?;
    Ok(Insights::new(ClaudeAdapter::from_config(
        api_key,
        &config.models.claude,
    )))
}

fn render_review(review: &Review) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", review.title));
    out.push_str(&format!(
        "{} | {} | {} | {:.1}/5 | by {}\n",
        review.category, review.genre, review.year, review.rating, review.author_id
    ));
    out.push_str(&format!(
        "Posted {} | 👍 {} 👎 {}\n\n",
        review.created_at.format("%Y-%m-%d"),
        review.upvotes,
        review.downvotes
    ));
    out.push_str(&format!("{}\n", review.content));
    out
}
