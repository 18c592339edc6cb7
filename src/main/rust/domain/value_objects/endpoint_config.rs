use crate::domain::errors::{DomainError, Result};

const DEFAULT_RTMP_PORT: u16 = 1935;
const DEFAULT_RTMPS_PORT: u16 = 443;

/// Streaming endpoint the publish session connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    url: String,
    host: String,
    port: u16,
    app: String,
    secure: bool,
}

impl EndpointConfig {
    /// Parse `rtmp[s]://host[:port]/app`
    pub fn new(url: String) -> Result<Self> {
        let (secure, rest) = if let Some(rest) = url.strip_prefix("rtmps://") {
            (true, rest)
        } else if let Some(rest) = url.strip_prefix("rtmp://") {
            (false, rest)
        } else {
            return Err(DomainError::InvalidEndpointUrl(url));
        };

        let (host_port, app) = rest
            .split_once('/')
            .ok_or_else(|| DomainError::InvalidEndpointUrl(url.clone()))?;
        let app = app.trim_end_matches('/');

        let (host, port) = match host_port.split_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| DomainError::InvalidEndpointUrl(url.clone()))?;
                (host, port)
            }
            None if secure => (host_port, DEFAULT_RTMPS_PORT),
            None => (host_port, DEFAULT_RTMP_PORT),
        };

        if host.is_empty() || app.is_empty() || port == 0 {
            return Err(DomainError::InvalidEndpointUrl(url));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            app: app.to_string(),
            secure,
            url,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// `host:port` suitable for a socket connect
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Full publish location for a stream key
    pub fn publish_location(&self, stream_key: &str) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), stream_key)
    }
}
