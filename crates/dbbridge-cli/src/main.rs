//! Launcher: joins a router and serves the database procedures until the
//! session ends or the process is interrupted.

use std::process::ExitCode;

use clap::Parser;
use dbbridge::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dbbridge")]
#[command(about = "Expose a SQL database as WAMP remote procedures", long_about = None)]
struct Args {
    /// Router WebSocket endpoint
    #[arg(short, long, default_value = DEFAULT_URL)]
    websocket: String,

    /// Realm to join
    #[arg(short, long, default_value = "realm1")]
    realm: String,

    /// Authentication identity
    #[arg(short, long, default_value = "db")]
    user: String,

    /// Authentication secret
    #[arg(short, long, env = "DBBRIDGE_SECRET", default_value = "dbsecret", hide_env_values = true)]
    secret: String,

    /// Backend engine (PG, MYSQL, SQLITE, ...). Without it the session
    /// cannot attach a database.
    #[arg(short, long)]
    engine: Option<String>,

    /// Connection string to connect with as soon as the session joins
    #[arg(short, long)]
    dsn: Option<String>,

    /// Namespace the procedures are registered under
    #[arg(short, long, default_value = "com.db")]
    topic: String,

    /// Enable diagnostic logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn session_config(&self) -> Result<SessionConfig, BridgeError> {
        let mut builder = SessionConfig::builder()
            .realm(&self.realm)
            .topic_base(&self.topic)
            .authinfo(AuthInfo::new("wampcra", &self.user, &self.secret))
            .debug(self.verbose);
        if let Some(engine) = &self.engine {
            builder = builder.engine(engine);
        }
        if let Some(dsn) = &self.dsn {
            builder = builder.dsn(dsn);
        }
        Ok(builder.build()?)
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match args.session_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let mut session = DbSession::new(config, SqlEngineFactory);
    session.set_on_disconnect(|| tracing::info!("transport closed, stopping"));

    let runner = ApplicationRunner::new(&args.websocket);
    tracing::info!(url = runner.url(), realm = %args.realm, "starting");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    match runner.run(&mut session, shutdown).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
