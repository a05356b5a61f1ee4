//! Server configuration.
//!
//! ```ignore
//! let options = ServerOptions::from_json_str(r#"{ "port": 50051, "certChain": "server.crt", "privateKey": "server.key" }"#)?;
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{CondorError, Result};

/// Default bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port.
pub const DEFAULT_PORT: u16 = 3000;

/// Options applied when the server starts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    /// Full `host:port` address; overrides `host` and `port`.
    pub listen: Option<String>,
    /// PEM certificate chain path.
    pub cert_chain: Option<PathBuf>,
    /// PEM private key path.
    pub private_key: Option<PathBuf>,
    /// PEM root certificate path, for client verification.
    pub root_cert: Option<PathBuf>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            listen: None,
            cert_chain: None,
            private_key: None,
            root_cert: None,
        }
    }
}

impl ServerOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind host.
    ///
    /// Default: "0.0.0.0"
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the bind port.
    ///
    /// Default: 3000
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the full bind address, overriding host and port.
    ///
    /// Default: none
    pub fn listen(mut self, address: impl Into<String>) -> Self {
        self.listen = Some(address.into());
        self
    }

    /// Serve over SSL with the given certificate chain and private key.
    ///
    /// Default: insecure
    pub fn ssl(mut self, cert_chain: impl Into<PathBuf>, private_key: impl Into<PathBuf>) -> Self {
        self.cert_chain = Some(cert_chain.into());
        self.private_key = Some(private_key.into());
        self
    }

    /// Require client certificates signed by `root_cert`.
    ///
    /// Default: none
    pub fn root_cert(mut self, root_cert: impl Into<PathBuf>) -> Self {
        self.root_cert = Some(root_cert.into());
        self
    }

    /// Parse options from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read options from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Address to bind: `listen`, or `host:port`.
    pub fn address(&self) -> String {
        match &self.listen {
            Some(listen) => listen.clone(),
            None => format!("{}:{}", self.host, self.port),
        }
    }

    /// Load the credentials these options describe.
    ///
    /// Insecure unless a certificate chain or private key is configured.
    /// Both must then be set and every configured file must be readable.
    pub fn credentials(&self) -> Result<Credentials> {
        let (cert_chain, private_key) = match (&self.cert_chain, &self.private_key) {
            (None, None) => return Ok(Credentials::Insecure),
            (Some(cert_chain), Some(private_key)) => (cert_chain, private_key),
            _ => {
                return Err(CondorError::Start(
                    "certChain and privateKey must be set together".to_string(),
                ))
            }
        };

        Ok(Credentials::Ssl {
            cert_chain: read_pem(cert_chain)?,
            private_key: read_pem(private_key)?,
            root_cert: self.root_cert.as_deref().map(read_pem).transpose()?,
        })
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    if !path.is_file() {
        return Err(CondorError::Start(format!(
            "{} is not a valid file",
            path.display()
        )));
    }
    std::fs::read(path)
        .map_err(|e| CondorError::Start(format!("cannot read {}: {}", path.display(), e)))
}

/// Credentials handed to the transport when binding.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Insecure,
    Ssl {
        cert_chain: Vec<u8>,
        private_key: Vec<u8>,
        root_cert: Option<Vec<u8>>,
    },
}

impl Credentials {
    pub fn is_secure(&self) -> bool {
        matches!(self, Credentials::Ssl { .. })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Insecure => f.write_str("Insecure"),
            Credentials::Ssl {
                cert_chain,
                root_cert,
                ..
            } => f
                .debug_struct("Ssl")
                .field("cert_chain", &format_args!("{} bytes", cert_chain.len()))
                .field("private_key", &"<redacted>")
                .field("root_cert", &root_cert.as_ref().map(Vec::len))
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn pem(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".pem").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let options = ServerOptions::default();
        assert_eq!(options.host, "0.0.0.0");
        assert_eq!(options.port, 3000);
        assert_eq!(options.address(), "0.0.0.0:3000");
        assert_eq!(options.credentials().unwrap(), Credentials::Insecure);
    }

    #[test]
    fn test_listen_overrides_host_and_port() {
        let options = ServerOptions::new().host("127.0.0.1").port(50051);
        assert_eq!(options.address(), "127.0.0.1:50051");

        let options = options.listen("localhost:9000");
        assert_eq!(options.address(), "localhost:9000");
    }

    #[test]
    fn test_from_json_str() {
        let options =
            ServerOptions::from_json_str(r#"{ "port": 50051, "certChain": "a.crt" }"#).unwrap();
        assert_eq!(options.port, 50051);
        assert_eq!(options.host, DEFAULT_HOST);
        assert_eq!(options.cert_chain, Some(PathBuf::from("a.crt")));
        assert!(ServerOptions::from_json_str("{ nope").is_err());
    }

    #[test]
    fn test_from_json_file() {
        let file = pem(r#"{ "listen": "0.0.0.0:7000" }"#);
        let options = ServerOptions::from_json_file(file.path()).unwrap();
        assert_eq!(options.address(), "0.0.0.0:7000");
    }

    #[test]
    fn test_ssl_credentials() {
        let cert = pem("CERT");
        let key = pem("KEY");
        let root = pem("ROOT");
        let options = ServerOptions::new()
            .ssl(cert.path(), key.path())
            .root_cert(root.path());

        let credentials = options.credentials().unwrap();
        assert!(credentials.is_secure());
        assert_eq!(
            credentials,
            Credentials::Ssl {
                cert_chain: b"CERT".to_vec(),
                private_key: b"KEY".to_vec(),
                root_cert: Some(b"ROOT".to_vec()),
            }
        );
        assert!(!format!("{credentials:?}").contains("KEY"));
    }

    #[test]
    fn test_ssl_requires_both_files() {
        let cert = pem("CERT");
        let mut options = ServerOptions::new();
        options.cert_chain = Some(cert.path().to_path_buf());
        assert!(matches!(options.credentials(), Err(CondorError::Start(_))));

        let options = ServerOptions::new().ssl(cert.path(), "/no/such/key.pem");
        let err = options.credentials().unwrap_err();
        assert!(err.to_string().starts_with("Cannot start server:"));
    }
}
