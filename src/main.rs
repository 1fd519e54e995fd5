//! lichess-board: command-line driver for the board synchronization core
//!
//! Logs in with OAuth2 PKCE, lists games, follows a game stream into a local
//! position, and plays moves after checking them against that position.
//!
//! Usage:
//!   lichess-board login                          # Authorize in a browser, paste the redirect URL
//!   lichess-board games                          # Games in progress
//!   lichess-board watch abcd1234                 # Follow a game until it ends
//!   lichess-board move abcd1234 e2 e4            # Play a move
//!   lichess-board bot --level 3 --color white    # Challenge the AI
//!   LICHESS_TOKEN=lip_... lichess-board whoami   # Use a token for one run

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use board_api::{
    ApiConfig, AuthFlow, CallbackParams, FileTokenStore, LichessClient, OAuthConfig, SessionStore,
};
use board_protocol::{BotColor, BotGameOptions, DEFAULT_HOST};
use board_sync::{GameStreamHandler, GameUpdate, LichessGame, close_stream};
use board_transport::ReaderConfig;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::AsyncBufReadExt;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Scope for board play plus AI challenges.
const CLI_SCOPE: &str = "board:play challenge:write";

#[derive(Parser, Debug)]
#[command(name = "lichess-board", about = "Play Lichess games from a local board")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Server root
    #[arg(long, default_value = DEFAULT_HOST)]
    host: Url,

    /// OAuth client id shown on the authorization page
    #[arg(long, default_value = "lichess-board")]
    client_id: String,

    /// Redirect URI registered for the login (the browser lands here with the code)
    #[arg(long, default_value = "http://localhost:8765/callback")]
    redirect_uri: Url,

    /// Token file (defaults to ~/.lichess-board/token)
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Give up on a silent game stream after this many seconds (0 disables)
    #[arg(long, default_value = "30")]
    idle_timeout_secs: u64,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file (defaults to ~/.lichess-board/logs/board.log if no path given)
    #[arg(long, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authorize this board with your Lichess account
    Login,
    /// Show the logged-in account
    Whoami,
    /// List games in progress
    Games,
    /// Follow a game until it ends (Ctrl-C to stop)
    Watch { game_id: String },
    /// Play a move in a game
    Move {
        game_id: String,
        /// Origin square, e.g. e2
        from: String,
        /// Destination square, e.g. e4
        to: String,
        /// queen, rook, bishop or knight
        #[arg(long)]
        promotion: Option<String>,
    },
    /// Challenge the Lichess AI
    Bot {
        /// Engine level, 1 to 8
        #[arg(long, default_value = "3")]
        level: u8,
        #[arg(long, value_enum, default_value = "random")]
        color: ColorArg,
        /// Initial clock in seconds
        #[arg(long, default_value = "300")]
        limit: u32,
        /// Increment in seconds
        #[arg(long, default_value = "0")]
        increment: u32,
    },
    /// Forget the stored token
    Logout,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ColorArg {
    White,
    Black,
    Random,
}

impl From<ColorArg> for BotColor {
    fn from(color: ColorArg) -> Self {
        match color {
            ColorArg::White => BotColor::White,
            ColorArg::Black => BotColor::Black,
            ColorArg::Random => BotColor::Random,
        }
    }
}

fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lichess-board/logs/board.log")
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    if let Some(ref log_file_arg) = cli.log_file {
        let log_path = if log_file_arg == "DEFAULT" {
            default_log_path()
        } else {
            PathBuf::from(log_file_arg)
        };

        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();

        eprintln!("Logging to {}", log_path.display());
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// Session backed by the token file, or by `LICHESS_TOKEN` for this run only.
fn open_session(cli: &Cli) -> anyhow::Result<Arc<SessionStore>> {
    if let Ok(token) = std::env::var("LICHESS_TOKEN") {
        if !token.trim().is_empty() {
            debug!("Using token from LICHESS_TOKEN");
            let session = SessionStore::new();
            session.set_token(token.trim())?;
            return Ok(Arc::new(session));
        }
    }

    let path = cli
        .token_file
        .clone()
        .unwrap_or_else(FileTokenStore::default_path);
    let session = SessionStore::with_token_store(Arc::new(FileTokenStore::new(path)));
    session.load()?;
    Ok(Arc::new(session))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let session = open_session(&cli)?;
    let stream = ReaderConfig {
        idle_timeout: (cli.idle_timeout_secs > 0)
            .then(|| Duration::from_secs(cli.idle_timeout_secs)),
        ..Default::default()
    };
    let config = ApiConfig::new(cli.host.clone()).with_stream_config(stream);
    let client = LichessClient::new(config, session.clone())?;
    let flow = AuthFlow::new(
        OAuthConfig::new(cli.client_id.clone(), cli.redirect_uri.clone()).with_scope(CLI_SCOPE),
        cli.host.clone(),
    );

    match cli.command {
        Command::Login => login(&flow, &client).await,
        Command::Whoami => whoami(&client).await,
        Command::Games => games(&client).await,
        Command::Watch { game_id } => watch(&client, &game_id).await,
        Command::Move {
            game_id,
            from,
            to,
            promotion,
        } => play_move(&client, &game_id, &from, &to, promotion.as_deref()).await,
        Command::Bot {
            level,
            color,
            limit,
            increment,
        } => {
            let options = BotGameOptions {
                level,
                color: color.into(),
                clock_limit: limit,
                clock_increment: increment,
            };
            bot(&client, &options).await
        }
        Command::Logout => {
            flow.logout(&session)?;
            println!("Logged out");
            Ok(())
        }
    }
}

// ── Commands ────────────────────────────────────────────────────────────────

async fn login(flow: &AuthFlow, client: &LichessClient) -> anyhow::Result<()> {
    let request = flow.begin()?;
    println!("Open this URL in a browser and approve access:\n\n  {}\n", request.url);
    println!("Then paste the full URL you were redirected to:");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let Some(line) = lines.next_line().await? else {
        flow.abandon();
        bail!("no callback URL entered");
    };

    let callback = CallbackParams::parse(&line);
    let user = flow.complete(client, &callback).await?;
    println!("Logged in as {}", user.display_name());
    Ok(())
}

async fn whoami(client: &LichessClient) -> anyhow::Result<()> {
    let user = client.fetch_user_info().await?;
    println!("{} ({})", user.display_name(), user.id);
    if let Some(country) = user.country() {
        println!("Country: {country}");
    }
    println!("Online: {}", if user.online { "yes" } else { "no" });
    Ok(())
}

async fn games(client: &LichessClient) -> anyhow::Result<()> {
    let games = client.fetch_active_games().await?;
    if games.is_empty() {
        println!("No games in progress");
        return Ok(());
    }
    for game in games {
        let opponent = game
            .opponent
            .as_ref()
            .and_then(|o| o.username.clone())
            .unwrap_or_else(|| "?".into());
        let color = game.color.map_or("?", |c| c.as_str());
        let turn = if game.is_my_turn { "your turn" } else { "waiting" };
        println!("{}  {color} vs {opponent}  {turn}", game.id);
    }
    Ok(())
}

async fn bot(client: &LichessClient, options: &BotGameOptions) -> anyhow::Result<()> {
    let game = client.start_bot_game(options).await?;
    let color = game.player.map_or("?", |c| c.as_str());
    println!("Started game {} playing {color}", game.id);
    Ok(())
}

/// The logged-in user's id, fetching the profile if it is not cached.
async fn ensure_user(client: &LichessClient) -> anyhow::Result<String> {
    if let Some(id) = client.session().user_id() {
        return Ok(id);
    }
    let user = client.fetch_user_info().await?;
    let id = user.id.clone();
    client.session().set_user(user);
    Ok(id)
}

fn print_update(update: &GameUpdate) {
    let last = update.last_move.as_deref().unwrap_or("-");
    println!(
        "#{:<3} {last:<6} {}  white {}  black {}  ({:?})",
        update.last_move_number,
        update.fen,
        format_clock(update.clocks.white),
        format_clock(update.clocks.black),
        update.status,
    );
}

fn format_clock(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

async fn watch(client: &LichessClient, game_id: &str) -> anyhow::Result<()> {
    let user_id = ensure_user(client).await?;
    let game = LichessGame::new(game_id, Some(user_id))
        .with_update_hook(print_update)
        .into_shared();

    let handle = client
        .open_game_stream(game_id, GameStreamHandler::new(game.clone()))
        .await?;
    game.lock().attach_stream(handle.clone());

    tokio::select! {
        _ = handle.done() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            close_stream(&game);
        }
    }

    let game = game.lock();
    if let Some(status) = game.status() {
        println!("Game {game_id}: {status:?} after {} moves", game.last_applied_move_count());
    }
    Ok(())
}

async fn play_move(
    client: &LichessClient,
    game_id: &str,
    from: &str,
    to: &str,
    promotion: Option<&str>,
) -> anyhow::Result<()> {
    let user_id = ensure_user(client).await?;
    let (seeded_tx, mut seeded_rx) = tokio::sync::watch::channel(false);
    let game = LichessGame::new(game_id, Some(user_id))
        .with_update_hook(move |_| {
            seeded_tx.send_replace(true);
        })
        .into_shared();

    let handle = client
        .open_game_stream(game_id, GameStreamHandler::new(game.clone()))
        .await?;
    game.lock().attach_stream(handle);

    let seeded = tokio::time::timeout(Duration::from_secs(15), seeded_rx.wait_for(|s| *s))
        .await
        .map(|waited| waited.is_ok());
    let prepared = match seeded {
        Ok(true) => game.lock().prepare_move(from, to, promotion),
        _ => {
            close_stream(&game);
            bail!("no game snapshot received for {game_id}");
        }
    };
    close_stream(&game);

    let uci = prepared?;
    let ack = client.submit_move(game_id, &uci).await?;
    if ack.ok {
        println!("Played {uci}");
    } else {
        warn!("Server did not confirm {uci}");
    }
    Ok(())
}
