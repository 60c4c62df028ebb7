use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use roomcast::http_api::{AllowAllAuthenticator, AppState, RequireBearerAuthenticator};
use roomcast::persistence::SqliteRoomRecordStore;
use roomcast::torrent::MockTorrentSession;
use roomcast::{RoomStorage, StoragePaths};
use tracing::{info, warn};

/// Synchronized-playback room server.
#[derive(Parser)]
#[command(version, author, about)]
struct Opts {
    /// HTTP API listen address.
    #[arg(long = "http-listen-addr", default_value = "127.0.0.1:3030", env = "HTTP_LISTEN_ADDR")]
    http_listen_addr: SocketAddr,

    /// Seconds an empty room is kept loaded before it's evicted.
    #[arg(long, default_value_t = 600, env = "ROOM_INACTIVITY_PERIOD")]
    room_inactivity_period: u64,

    /// Directory torrent scratch data (downloaded pieces) is kept under.
    #[arg(long, default_value = "./data/torrents", env = "TORRENT_SAVE_PATH")]
    torrent_save_path: PathBuf,

    /// Directory uploaded `.torrent` files are saved under.
    #[arg(long, default_value = "./data/torrent-files", env = "TORRENT_FILES_SAVE_PATH")]
    torrent_files_save_path: PathBuf,

    /// Maximum accepted size, in bytes, of an uploaded `.torrent` file.
    #[arg(long, default_value_t = 10 * 1024 * 1024, env = "MAX_TORRENT_FILE_SIZE")]
    max_torrent_file_size: u64,

    /// `sqlx` connection URL for the room record store.
    #[arg(long, default_value = "sqlite://./data/roomcast.db", env = "DB_URL")]
    db_url: String,

    /// If set, requests must carry a bearer token (spec.md §1: real
    /// token issue/verify is out of scope, this only gates presence).
    #[arg(long, env = "AUTH_SECRET_KEY")]
    auth_secret_key: Option<String>,

    /// Unused by this core; accepted so deployments reusing the
    /// original app's environment don't fail to start (spec.md §1).
    #[arg(long, env = "PW_SECRET_KEY")]
    #[allow(dead_code)]
    pw_secret_key: Option<String>,

    /// Unused by this core, see `pw_secret_key`.
    #[arg(long, env = "ACCESS_TOKEN_EXPIRE")]
    #[allow(dead_code)]
    access_token_expire: Option<u64>,

    /// The console log level.
    #[arg(long, default_value = "info", env = "ROOMCAST_LOG")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&opts.log_level))
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = rt.block_on(async_main(opts));
    if let Err(e) = result.as_ref() {
        tracing::error!("error running roomcastd: {e:?}");
    }
    result
}

async fn async_main(opts: Opts) -> anyhow::Result<()> {
    let records = Arc::new(SqliteRoomRecordStore::connect(&opts.db_url).await?);
    let torrents = Arc::new(MockTorrentSession::new());

    tokio::fs::create_dir_all(&opts.torrent_save_path).await?;
    tokio::fs::create_dir_all(&opts.torrent_files_save_path).await?;

    let rooms = RoomStorage::new(
        records,
        torrents,
        StoragePaths {
            torrent_save_path: opts.torrent_save_path,
            torrent_files_save_path: opts.torrent_files_save_path,
        },
        Duration::from_secs(opts.room_inactivity_period),
    );
    let sweeper = rooms.spawn_sweeper();

    let authenticator: Arc<dyn roomcast::http_api::Authenticator> = if opts.auth_secret_key.is_some() {
        Arc::new(RequireBearerAuthenticator)
    } else {
        warn!("AUTH_SECRET_KEY not set, accepting unauthenticated requests");
        Arc::new(AllowAllAuthenticator)
    };

    let state = AppState {
        rooms: rooms.clone(),
        authenticator,
        max_torrent_file_size: opts.max_torrent_file_size,
    };
    let router = roomcast::http_api::build_router(state);

    let listener = tokio::net::TcpListener::bind(opts.http_listen_addr).await?;
    info!(addr = %opts.http_listen_addr, "listening");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down, cleaning up rooms");
    };
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    sweeper.abort();
    rooms.full_cleanup().await;
    Ok(())
}
