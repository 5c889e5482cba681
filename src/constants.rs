// === Polling ===
pub const POLL_INTERVAL_SECS: u64 = 180; // 3 min
pub const MIN_POLL_INTERVAL_SECS: u64 = 5;
pub const SHUTDOWN_CHECK_MS: u64 = 500;

// === Stream status ===
pub const STREAM_API_BASE: &str = "https://kick.com/api/v2/channels";
pub const STREAM_TIMEOUT_SECS: u64 = 5;
pub const STREAM_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

// === Feeds ===
pub const FEED_TIMEOUT_SECS: u64 = 10;
pub const FEED_MAX_PARALLEL: usize = 8;
pub const YOUTUBE_FEED_BASE: &str = "https://www.youtube.com/feeds/videos.xml?channel_id=";
pub const YOUTUBE_CHANNEL_PREFIX: &str = "UC";

// === Timeline ===
pub const TIMELINE_API_BASE: &str = "https://api.twitter.com";
pub const TIMELINE_TIMEOUT_SECS: u64 = 10;
pub const TIMELINE_MAX_PARALLEL: usize = 4;
pub const TIMELINE_MAX_RESULTS: u32 = 5; // API floor is 5
pub const TIMELINE_TOKEN_ENV: &str = "SOURCEWATCH_TIMELINE_TOKEN";

// === Notifier ===
pub const NOTIFY_TIMEOUT_SECS: u64 = 10;
pub const MAX_DESCRIPTION_CHARS: usize = 300;

// === Files ===
pub const DATA_DIR_ENV: &str = "SOURCEWATCH_HOME";
pub const STORE_FILE: &str = "subscriptions.json";
pub const CONFIG_FILE: &str = "config.json";
pub const LOG_FILE: &str = "sourcewatch.log";
pub const PID_FILE: &str = "sourcewatch.pid";
