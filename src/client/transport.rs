//! Client transports, selected by address scheme.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use super::{Address, ClientError};
use crate::api::{CommandResponse, InvokeResponse};
use crate::protocol::FrameReader;

/// Sends one command line and returns the complete response text.
#[async_trait]
pub trait ClientTransport: Send {
    async fn send(&mut self, cmd: &str) -> Result<String, ClientError>;
}

/// Opens a transport for an address.
pub type Connector =
    for<'a> fn(&'a Address) -> BoxFuture<'a, Result<Box<dyn ClientTransport>, ClientError>>;

/// Transports by scheme name.
#[derive(Clone)]
pub struct ProtocolRegistry {
    connectors: BTreeMap<String, Connector>,
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        let mut registry = Self {
            connectors: BTreeMap::new(),
        };
        registry.register("telnet", connect_telnet);
        registry.register("http", connect_http);
        registry.register("https", connect_http);
        registry.register("invoke", connect_invoke);
        registry
    }
}

impl ProtocolRegistry {
    /// Add or replace the connector for `scheme`.
    pub fn register(&mut self, scheme: &str, connector: Connector) {
        self.connectors.insert(scheme.to_ascii_lowercase(), connector);
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.connectors.keys().map(String::as_str)
    }

    pub async fn connect(&self, address: &Address) -> Result<Box<dyn ClientTransport>, ClientError> {
        let connector = self
            .connectors
            .get(&address.scheme)
            .ok_or_else(|| ClientError::UnknownProtocol(address.scheme.clone()))?;
        connector(address).await
    }
}

/// Raw TCP with zero-byte framing.
pub struct TelnetTransport {
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TelnetTransport {
    pub async fn connect(address: &Address) -> Result<Self, ClientError> {
        let authority = address.authority();
        let stream = TcpStream::connect(&authority)
            .await
            .map_err(|source| ClientError::Connect {
                address: authority,
                source,
            })?;
        let _ = stream.set_nodelay(true);
        let (read, writer) = stream.into_split();
        Ok(Self {
            reader: FrameReader::new(read),
            writer,
        })
    }
}

#[async_trait]
impl ClientTransport for TelnetTransport {
    async fn send(&mut self, cmd: &str) -> Result<String, ClientError> {
        self.writer.write_all(cmd.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        self.reader
            .next_frame()
            .await?
            .ok_or(ClientError::ConnectionClosed)
    }
}

/// JSON POST of `{id, cmd}` to the HTTP transport.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    id: Option<String>,
}

impl HttpTransport {
    pub fn new(address: &Address) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!(
                "{}://{}/{}",
                address.scheme,
                address.authority(),
                address.path
            ),
            id: address.id.clone(),
        }
    }
}

#[async_trait]
impl ClientTransport for HttpTransport {
    async fn send(&mut self, cmd: &str) -> Result<String, ClientError> {
        let res: CommandResponse = self
            .client
            .post(&self.url)
            .json(&json!({ "id": self.id, "cmd": cmd }))
            .send()
            .await?
            .json()
            .await?;
        Ok(match res {
            CommandResponse { ok: true, out, .. } => out.unwrap_or_default(),
            CommandResponse { err, .. } => {
                format!("# ERROR: {}", err.unwrap_or_else(|| "unknown".to_string()))
            }
        })
    }
}

/// Cloud-function events posted to `/invoke/<function>`.
pub struct InvokeTransport {
    client: reqwest::Client,
    url: String,
    id: String,
}

impl InvokeTransport {
    pub fn new(address: &Address) -> Result<Self, ClientError> {
        let function = address.first_segment().ok_or_else(|| {
            ClientError::Address("invoke address needs a function name".to_string())
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            url: format!("http://{}/invoke/{}", address.authority(), function),
            id: address.id.clone().unwrap_or_else(|| "invoke".to_string()),
        })
    }
}

/// Response text for an invocation result.
fn invoke_output(res: &InvokeResponse) -> String {
    let body: Value = serde_json::from_str(&res.body).unwrap_or(Value::Null);
    if res.status_code == 500 {
        match body.get("error$") {
            Some(err) => format!(
                "# ERROR: {} {}",
                err["code"].as_str().unwrap_or("unknown"),
                err["message"].as_str().unwrap_or_default()
            ),
            None => "# ERROR: unknown".to_string(),
        }
    } else {
        body["out"].as_str().unwrap_or_default().to_string()
    }
}

#[async_trait]
impl ClientTransport for InvokeTransport {
    async fn send(&mut self, cmd: &str) -> Result<String, ClientError> {
        let event = json!({
            "body": { "sys": "repl", "send": "cmd", "id": self.id, "cmd": cmd }
        });
        let res: InvokeResponse = self
            .client
            .post(&self.url)
            .json(&event)
            .send()
            .await?
            .json()
            .await?;
        Ok(invoke_output(&res))
    }
}

fn connect_telnet(address: &Address) -> BoxFuture<'_, Result<Box<dyn ClientTransport>, ClientError>> {
    async move {
        let transport = TelnetTransport::connect(address).await?;
        Ok(Box::new(transport) as Box<dyn ClientTransport>)
    }
    .boxed()
}

fn connect_http(address: &Address) -> BoxFuture<'_, Result<Box<dyn ClientTransport>, ClientError>> {
    async move { Ok(Box::new(HttpTransport::new(address)) as Box<dyn ClientTransport>) }.boxed()
}

fn connect_invoke(address: &Address) -> BoxFuture<'_, Result<Box<dyn ClientTransport>, ClientError>> {
    async move { Ok(Box::new(InvokeTransport::new(address)?) as Box<dyn ClientTransport>) }.boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schemes() {
        let registry = ProtocolRegistry::default();
        let schemes: Vec<&str> = registry.schemes().collect();
        assert_eq!(schemes, ["http", "https", "invoke", "telnet"]);
    }

    #[tokio::test]
    async fn test_unknown_protocol() {
        let registry = ProtocolRegistry::default();
        let addr = Address::parse(Some("gopher://localhost:70/"), None).unwrap();
        assert!(matches!(
            registry.connect(&addr).await,
            Err(ClientError::UnknownProtocol(s)) if s == "gopher"
        ));
    }

    #[test]
    fn test_invoke_needs_function() {
        let addr = Address::parse(Some("invoke://localhost:8888"), None).unwrap();
        assert!(matches!(InvokeTransport::new(&addr), Err(ClientError::Address(_))));

        let addr = Address::parse(Some("invoke://localhost:8888/repl?id=x"), None).unwrap();
        let transport = InvokeTransport::new(&addr).unwrap();
        assert_eq!(transport.url, "http://localhost:8888/invoke/repl");
        assert_eq!(transport.id, "x");
    }

    #[test]
    fn test_invoke_output() {
        let ok = InvokeResponse::ok(&json!({"out": "3"}));
        assert_eq!(invoke_output(&ok), "3");
        let err = InvokeResponse::error("unknown_session", "nope");
        assert_eq!(invoke_output(&err), "# ERROR: unknown_session nope");
    }

    #[tokio::test]
    async fn test_telnet_connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let addr = Address::parse(Some("127.0.0.1"), Some(&port.to_string())).unwrap();
        assert!(matches!(
            TelnetTransport::connect(&addr).await,
            Err(ClientError::Connect { .. })
        ));
    }
}
