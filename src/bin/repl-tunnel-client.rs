//! repl-tunnel interactive client.

use std::process::ExitCode;

use repl_tunnel::cli::{self, parse_client_args};
use repl_tunnel::client::{Address, Client, History, Outcome, ProtocolRegistry};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_client_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'repl-tunnel-client --help' for more information.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_client_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version("repl-tunnel-client");
        return ExitCode::SUCCESS;
    }

    let address = match Address::parse(args.address.as_deref(), args.port.as_deref()) {
        Ok(address) => address,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let history = if args.no_history {
        History::in_memory()
    } else {
        History::for_name(&address.history_name()).unwrap_or_else(|e| {
            eprintln!("warning: history disabled: {}", e);
            History::in_memory()
        })
    };

    let registry = ProtocolRegistry::default();
    let mut client = match Client::connect(&registry, &address, history).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Could not connect to {}://{}: {}", address.scheme, address.authority(), e);
            return ExitCode::FAILURE;
        }
    };
    println!("Connected to {} {}", client.remote_id(), client.version());

    let input = BufReader::new(tokio::io::stdin());
    match client.run(input, tokio::io::stdout()).await {
        Ok(Outcome::Quit) | Ok(Outcome::Closed) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
