//! repl-tunnel server entry point.

use std::sync::Arc;

use repl_tunnel::api::{self, AppState};
use repl_tunnel::cli::{self, parse_args};
use repl_tunnel::command::CommandTable;
use repl_tunnel::config::Config;
use repl_tunnel::host::{Host, LocalHost};
use repl_tunnel::script::Interpreter;
use repl_tunnel::{listener, logging, service, SessionId, SessionRegistry};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'repl-tunnel --help' for more information.");
            std::process::exit(2);
        }
    };

    if args.help {
        cli::print_help();
        return;
    }
    if args.version {
        cli::print_version("repl-tunnel");
        return;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = logging::init_with_level(config.log_filter()) {
        eprintln!("warning: logging already initialised: {}", e);
    }

    if let Err(e) = run(config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> repl_tunnel::Result<()> {
    info!("repl-tunnel v{}", env!("CARGO_PKG_VERSION"));

    let host = LocalHost::new(config.host_options());
    let registry = Arc::new(SessionRegistry::new(
        host.clone(),
        Arc::new(Interpreter),
        CommandTable::builtin(),
        config.repl.clone(),
        SessionId::new(config.default_session_id()),
    ));
    service::install(&host, &registry)?;

    let listen_addr = config
        .listen_addr()
        .map_err(|e| repl_tunnel::ReplError::Parse(e.to_string()))?;
    if config.server.listen {
        listener::bind(&registry, listen_addr).await?;
    }

    let http = if config.http.enabled {
        let addr = config
            .http_addr()
            .map_err(|e| repl_tunnel::ReplError::Parse(e.to_string()))?;
        let state = AppState::new(Arc::clone(&registry))
            .with_default_session(config.http.default_session.clone())
            .with_function(config.http.function.clone());
        let path = config.http.path.clone();
        Some(tokio::spawn(async move { api::serve(addr, state, &path).await }))
    } else {
        None
    };

    let result = match http {
        Some(mut server) => tokio::select! {
            served = &mut server => match served {
                Ok(result) => result,
                Err(e) => Err(repl_tunnel::ReplError::Io(std::io::Error::other(e.to_string()))),
            },
            _ = tokio::signal::ctrl_c() => {
                server.abort();
                Ok(())
            }
        },
        None => {
            let _ = tokio::signal::ctrl_c().await;
            Ok(())
        }
    };

    info!("Shutting down");
    host.close().await;
    result
}
