mod cli;
mod daemon;

use clap::{Args, Parser, Subcommand};
use sourcewatch::subscription::SubscriptionFilter;

#[derive(Parser)]
#[command(name = "sourcewatch", version, about = "Sourcewatch — notifications for new streams, posts and videos")]
struct App {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track a new source
    Add {
        #[command(subcommand)]
        source: AddSource,
    },
    /// List subscriptions with their display numbers
    List {
        /// Only subscriptions owned by this scope (plus unscoped ones)
        #[arg(long)]
        scope: Option<String>,
    },
    /// Stop tracking a source
    Remove {
        /// Subscription id as shown by `list`
        id: Option<String>,
        /// Display number from `list` instead of the id
        #[arg(long, conflicts_with = "id")]
        number: Option<usize>,
        /// Scope the display number refers to
        #[arg(long)]
        scope: Option<String>,
    },
    /// Run a single poll cycle now
    Check,
    /// View or modify configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Manage daemon
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
}

#[derive(Args)]
struct AddOptions {
    /// Destination reference (channel id or webhook URL)
    #[arg(long = "dest")]
    destination: String,
    /// Owner scope (e.g. guild id)
    #[arg(long)]
    scope: Option<String>,
    /// Minimum viewer count for go-live notifications
    #[arg(long)]
    min_viewers: Option<u64>,
    /// Allowed category (repeatable)
    #[arg(long = "category")]
    categories: Vec<String>,
    /// Keyword that must appear in the title or text (repeatable)
    #[arg(long = "keyword")]
    keywords: Vec<String>,
}

impl AddOptions {
    fn filter(&self) -> SubscriptionFilter {
        SubscriptionFilter {
            min_viewers: self.min_viewers,
            categories: self.categories.clone(),
            keywords: self.keywords.clone(),
        }
    }
}

#[derive(Subcommand)]
enum AddSource {
    /// Live-stream channel (Kick username)
    Stream {
        username: String,
        #[command(flatten)]
        opts: AddOptions,
    },
    /// RSS/Atom feed URL
    Feed {
        url: String,
        #[command(flatten)]
        opts: AddOptions,
    },
    /// YouTube channel id (UC...)
    Youtube {
        channel_id: String,
        #[command(flatten)]
        opts: AddOptions,
    },
    /// Timeline handle
    Timeline {
        handle: String,
        #[command(flatten)]
        opts: AddOptions,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Display the full configuration
    Show,
    /// Get a config value (dot notation: feed.max_parallel)
    Get {
        /// Config key (dot notation)
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key (dot notation)
        key: String,
        /// Value (JSON: true, false, 42, "string")
        value: String,
    },
}

#[derive(Subcommand)]
enum DaemonAction {
    /// Start the daemon (background)
    Start,
    /// Stop the daemon
    Stop,
    /// Show daemon status
    Status,
    /// Run daemon in foreground (used internally by 'start')
    RunForeground,
}

fn main() {
    let app = App::parse();

    match app.command {
        Commands::Add { source } => {
            let (target, opts) = match source {
                AddSource::Stream { username, opts } => (cli::subscriptions::AddTarget::Stream(username), opts),
                AddSource::Feed { url, opts } => (cli::subscriptions::AddTarget::Feed(url), opts),
                AddSource::Youtube { channel_id, opts } => (cli::subscriptions::AddTarget::Youtube(channel_id), opts),
                AddSource::Timeline { handle, opts } => (cli::subscriptions::AddTarget::Timeline(handle), opts),
            };
            cli::subscriptions::add(target, &opts.destination, opts.scope.as_deref(), opts.filter())
                .unwrap_or_else(|e| eprintln!("Error: {}", e));
        }
        Commands::List { scope } => {
            cli::subscriptions::list(scope.as_deref())
                .unwrap_or_else(|e| eprintln!("Error: {}", e));
        }
        Commands::Remove { id, number, scope } => {
            cli::subscriptions::remove(id.as_deref(), number, scope.as_deref())
                .unwrap_or_else(|e| eprintln!("Error: {}", e));
        }
        Commands::Check => {
            sourcewatch::tracing_init::init_stderr_tracing();
            cli::check::run().unwrap_or_else(|e| eprintln!("Error: {}", e));
        }
        Commands::Config { action } => {
            let result = match action {
                ConfigAction::Show => cli::config::run_show(),
                ConfigAction::Get { key } => cli::config::run_get(&key),
                ConfigAction::Set { key, value } => cli::config::run_set(&key, &value),
            };
            result.unwrap_or_else(|e| eprintln!("Error: {}", e));
        }
        // run-foreground is the actual daemon process
        Commands::Daemon { action } => match action {
            DaemonAction::RunForeground => daemon::run(),
            DaemonAction::Start => {
                cli::daemon::start().unwrap_or_else(|e| eprintln!("Error: {}", e));
            }
            DaemonAction::Stop => {
                cli::daemon::stop().unwrap_or_else(|e| eprintln!("Error: {}", e));
            }
            DaemonAction::Status => {
                cli::daemon::status().unwrap_or_else(|e| eprintln!("Error: {}", e));
            }
        },
    }
}
