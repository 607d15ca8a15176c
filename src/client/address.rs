//! Client address parsing.

use url::Url;

use super::ClientError;

pub const DEFAULT_ADDRESS: &str = "telnet://127.0.0.1:30303";
const DEFAULT_TELNET_PORT: u16 = 30303;
const DEFAULT_HTTP_PORT: u16 = 8888;

/// Where the client connects and through which protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Path without the leading slash; may be empty.
    pub path: String,
    /// Session id from the `id` query parameter.
    pub id: Option<String>,
}

impl Address {
    /// Parse the client's positional arguments.
    ///
    /// Accepts `scheme://host:port/path?id=..`, bare `host` or `host:port`
    /// (telnet), and the legacy two-argument `host port` form.
    pub fn parse(address: Option<&str>, port: Option<&str>) -> Result<Self, ClientError> {
        let address = address.unwrap_or(DEFAULT_ADDRESS).trim();

        if let Some(port) = port {
            let port = parse_port(port)?;
            return Ok(Self::telnet(address, port));
        }

        if !address.contains("://") {
            return match address.rsplit_once(':') {
                Some((host, port)) if !host.contains(':') => {
                    Ok(Self::telnet(host, parse_port(port)?))
                }
                _ => Ok(Self::telnet(address, DEFAULT_TELNET_PORT)),
            };
        }

        let url = Url::parse(address).map_err(|e| ClientError::Address(format!("{}: {}", address, e)))?;
        let scheme = url.scheme().to_ascii_lowercase();
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .unwrap_or("127.0.0.1")
            .to_string();
        let port = url.port_or_known_default().unwrap_or(match scheme.as_str() {
            "telnet" => DEFAULT_TELNET_PORT,
            _ => DEFAULT_HTTP_PORT,
        });
        let path = url.path().trim_matches('/').to_string();
        let id = url
            .query_pairs()
            .find(|(k, _)| k == "id")
            .map(|(_, v)| v.into_owned());

        Ok(Self {
            scheme,
            host,
            port,
            path,
            id,
        })
    }

    fn telnet(host: &str, port: u16) -> Self {
        Self {
            scheme: "telnet".to_string(),
            host: host.to_string(),
            port,
            path: String::new(),
            id: None,
        }
    }

    /// `host:port`, for socket connections.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The first path segment, if any.
    pub fn first_segment(&self) -> Option<&str> {
        self.path.split('/').next().filter(|s| !s.is_empty())
    }

    /// Name of the history file for this address.
    pub fn history_name(&self) -> String {
        let host: String = self
            .host
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        format!("history-{}-{}.txt", host, self.port)
    }
}

fn parse_port(text: &str) -> Result<u16, ClientError> {
    text.trim()
        .parse()
        .map_err(|_| ClientError::Address(format!("invalid port: {}", text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_address() {
        let addr = Address::parse(None, None).unwrap();
        assert_eq!(addr.scheme, "telnet");
        assert_eq!(addr.authority(), "127.0.0.1:30303");
    }

    #[test]
    fn test_legacy_forms() {
        let addr = Address::parse(Some("localhost"), Some("4000")).unwrap();
        assert_eq!(addr.scheme, "telnet");
        assert_eq!(addr.authority(), "localhost:4000");

        let addr = Address::parse(Some("example.com"), None).unwrap();
        assert_eq!(addr.authority(), "example.com:30303");

        let addr = Address::parse(Some("example.com:31000"), None).unwrap();
        assert_eq!(addr.authority(), "example.com:31000");

        assert!(Address::parse(Some("localhost"), Some("port")).is_err());
    }

    #[test]
    fn test_url_forms() {
        let addr = Address::parse(Some("http://localhost:8888/repl?id=w1"), None).unwrap();
        assert_eq!(addr.scheme, "http");
        assert_eq!(addr.port, 8888);
        assert_eq!(addr.path, "repl");
        assert_eq!(addr.id.as_deref(), Some("w1"));

        let addr = Address::parse(Some("https://repl.example.com/repl"), None).unwrap();
        assert_eq!(addr.port, 443);

        let addr = Address::parse(Some("invoke://127.0.0.1:8888/my-fn"), None).unwrap();
        assert_eq!(addr.scheme, "invoke");
        assert_eq!(addr.first_segment(), Some("my-fn"));
        assert_eq!(addr.id, None);
    }

    #[test]
    fn test_history_name() {
        let addr = Address::parse(Some("telnet://127.0.0.1:30303"), None).unwrap();
        assert_eq!(addr.history_name(), "history-127.0.0.1-30303.txt");
    }
}
