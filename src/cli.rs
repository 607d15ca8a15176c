//! Command-line interfaces for the server and the client.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

/// Server command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Listener host (overrides config).
    pub host: Option<String>,
    /// Listener port (overrides config).
    pub port: Option<u16>,
    /// HTTP port (overrides config).
    pub http_port: Option<u16>,
    /// Disable the HTTP transport.
    pub no_http: bool,
    /// Disable the raw socket listener.
    pub no_listen: bool,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse server command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse server arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('H') | Long("host") => {
                let value: String = parser.value()?.parse()?;
                if value.parse::<std::net::IpAddr>().is_err() {
                    return Err(ArgsError::InvalidValue("host", value));
                }
                result.host = Some(value);
            }
            Short('p') | Long("port") => {
                result.port = Some(port_value("port", &mut parser)?);
            }
            Long("http-port") => {
                result.http_port = Some(port_value("http-port", &mut parser)?);
            }
            Long("no-http") => {
                result.no_http = true;
            }
            Long("no-listen") => {
                result.no_listen = true;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

fn port_value(name: &'static str, parser: &mut lexopt::Parser) -> Result<u16, ArgsError> {
    use lexopt::prelude::*;

    let value: String = parser.value()?.parse()?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidValue(name, value))
}

/// Client command-line arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientArgs {
    /// Address (`telnet://host:port`, `http://...`) or bare host.
    pub address: Option<String>,
    /// Legacy `host port` form.
    pub port: Option<String>,
    /// Do not read or write the history file.
    pub no_history: bool,
    pub version: bool,
    pub help: bool,
}

/// Parse client command-line arguments.
pub fn parse_client_args() -> Result<ClientArgs, ArgsError> {
    parse_client_args_from(std::env::args_os())
}

/// Parse client arguments from an iterator (for testing).
pub fn parse_client_args_from<I>(args: I) -> Result<ClientArgs, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = ClientArgs::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => result.help = true,
            Short('V') | Long("version") => result.version = true,
            Long("no-history") => result.no_history = true,
            Value(val) => {
                let val: String = val.string()?;
                if result.address.is_none() {
                    result.address = Some(val);
                } else if result.port.is_none() {
                    result.port = Some(val);
                } else {
                    return Err(ArgsError::UnexpectedArgument(val));
                }
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print server help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"repl-tunnel {version}
Remote command evaluator: REPL sessions over TCP, HTTP and function invocation

USAGE:
    repl-tunnel [OPTIONS]

OPTIONS:
    -H, --host <ADDR>       Listener address [default: 127.0.0.1]
    -p, --port <PORT>       Listener port [default: 30303]
        --http-port <PORT>  HTTP port [default: 8888]
        --no-http           Disable the HTTP transport
        --no-listen         Disable the raw socket listener
    -c, --config <FILE>     Path to configuration file (JSON)
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    REPL_TUNNEL_HOST        Listener address (overrides config)
    REPL_TUNNEL_PORT        Listener port (overrides config)
    REPL_TUNNEL_HTTP_PORT   HTTP port (overrides config)
    REPL_TUNNEL_LOG_LEVEL   Log level (overrides config)
    RUST_LOG                Alternative log level setting

EXAMPLES:
    # Start with defaults (telnet on 30303, HTTP on 8888)
    repl-tunnel

    # Connect
    repl-tunnel-client telnet://127.0.0.1:30303
"#
    );
}

/// Print client help message.
pub fn print_client_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"repl-tunnel-client {version}
Interactive client for repl-tunnel

USAGE:
    repl-tunnel-client [ADDRESS] [PORT]

ADDRESS:
    telnet://host:port              Raw socket [default: telnet://127.0.0.1:30303]
    http://host:port/path           HTTP submissions
    https://host:port/path          HTTP over TLS
    invoke://host:port/fn?id=name   Function invocation
    host [port]                     Legacy form

OPTIONS:
        --no-history    Do not load or save command history
    -h, --help          Print help
    -V, --version       Print version
"#
    );
}

/// Print version.
pub fn print_version(name: &str) {
    println!("{} {}", name, env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
