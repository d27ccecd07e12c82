use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[clap(name = "livesync", version)]
pub struct Cli {
    /// Signed-in user; required by per-user resources
    #[clap(long, global = true, env = "LIVESYNC_USER_ID", default_value = "")]
    pub user_id: String,

    /// Bearer token sent with backend requests
    #[clap(long, global = true, env = "LIVESYNC_TOKEN")]
    pub token: Option<String>,

    /// Overrides LIVESYNC_API_URL
    #[clap(long, global = true)]
    pub api_url: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow the notification list and unread badge
    Notifications {
        /// Mark this notification read once the first list arrived
        #[clap(long)]
        mark_read: Option<String>,
    },

    /// Follow spot prices, or market tickers when a timeframe is given
    Prices {
        #[clap(long)]
        timeframe: Option<String>,
    },

    /// Follow wallet balances
    Balances,

    /// Follow the chat of one trade
    Chat {
        #[clap(long)]
        trade_id: String,

        /// Send this message once the thread is loaded
        #[clap(long)]
        send: Option<String>,
    },
}
