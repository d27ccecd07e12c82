pub mod cli;

use std::fmt::Debug;

use anyhow::Context;
use clap::Parser;
use common::logger::{child_span, init_logger};
use livesync::config::SyncConfig;
use livesync::fetcher::HttpClient;
use livesync::metrics::Counters;
use livesync::resource::Snapshot;
use livesync::resources::{Balances, Notifications, PriceTicker, TradeChat};
use livesync::session::SessionContext;
use tokio::sync::watch;
use tracing::{info, warn};

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = SyncConfig::from_env();
    if let Some(url) = &cli.api_url {
        cfg.api_base_url = url.clone();
    }
    init_logger("livesync", cfg.json_logs);

    let mut session = SessionContext::new(cli.user_id.clone());
    if let Some(token) = &cli.token {
        session = session.with_token(token.clone());
    }

    let client = HttpClient::new(&cfg.api_base_url, cfg.request_timeout)
        .context("building http client")?
        .with_session(session.clone());
    let counters = Counters::default();

    info!(api = %cfg.api_base_url, user_id = %cli.user_id, "livesync starting");

    match cli.command {
        Command::Notifications { mark_read } => {
            let mut notes = Notifications::new(client, session, &cfg, counters.clone());
            if !notes.start() {
                anyhow::bail!("notifications need --user-id");
            }
            let mut rx = notes.subscribe();
            if let Some(id) = mark_read {
                rx.changed().await?;
                if let Err(e) = notes.mark_read(&id).await {
                    warn!(error = %e, id = %id, "mark-read failed");
                }
            }
            follow(rx, |v| {
                println!("🔔 {} unread", v.unread_count);
                for n in &v.items {
                    let dot = if n.read { " " } else { "•" };
                    println!("  {dot} [{}] {} {}", n.kind, n.title, n.message);
                }
            })
            .await;
        }

        Command::Prices { timeframe } => {
            let mut ticker = match timeframe {
                Some(tf) => PriceTicker::market(client, &cfg, &tf, counters.clone()),
                None => PriceTicker::spot(client, &cfg, counters.clone()),
            };
            ticker.start();
            follow(ticker.subscribe(), |quotes| {
                for q in quotes {
                    println!("{:>6} {:>14.2} USD {:+.2}%", q.symbol, q.price_usd, q.change_24h);
                }
            })
            .await;
        }

        Command::Balances => {
            let mut balances = Balances::new(client, session, &cfg, counters.clone());
            if !balances.start() {
                anyhow::bail!("balances need --user-id");
            }
            follow(balances.subscribe(), |rows| {
                for b in rows {
                    println!(
                        "{:>6} available {:.8} locked {:.8}",
                        b.currency, b.available, b.locked
                    );
                }
            })
            .await;
        }

        Command::Chat { trade_id, send } => {
            let mut chat = TradeChat::new(client, session, &cfg, counters.clone());
            if !chat.open(&trade_id) {
                anyhow::bail!("chat needs a non-empty --trade-id");
            }
            let mut rx = chat.subscribe();
            if let Some(body) = send {
                rx.changed().await?;
                if let Err(e) = chat.send(&body).await {
                    warn!(error = %e, trade_id = %trade_id, "message not sent");
                }
            }
            follow(rx, |v| {
                for m in &v.messages {
                    let mark = if m.pending { "…" } else { " " };
                    println!("{mark} {}: {}", m.sender, m.body);
                }
            })
            .await;
        }
    }

    info!(counters = ?counters.snapshot(), "livesync stopped");
    Ok(())
}

/// Prints every published snapshot until Ctrl-C.
async fn follow<V>(mut rx: watch::Receiver<Snapshot<V>>, render: impl Fn(&V))
where
    V: Clone + Debug,
{
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = rx.borrow_and_update().clone();
                let _enter = child_span("render").entered();

                match (&snap.view, snap.is_stale) {
                    (None, _) => println!("-- waiting for first response"),
                    (Some(view), stale) => {
                        let source = snap.source.as_deref().unwrap_or("-");
                        let flag = if stale { " (stale)" } else { "" };
                        println!("-- {} via {source}{flag}", snap.key.as_ref().map(|k| k.to_string()).unwrap_or_default());
                        render(view);
                    }
                }
            }
            _ = &mut shutdown => {
                info!("ctrl-c received; stopping pollers");
                break;
            }
        }
    }
}
