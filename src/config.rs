use clap::Parser;

use crate::error::ConfigError;
use crate::server::dispatcher::Audience;

/// Runtime settings for the chat server, read from flags and environment.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "server", version, about = "Kabootar broadcast chat server")]
pub struct ServerConfig {
    /// Interface to bind
    #[arg(long, env = "KABOOTAR_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// TCP port to listen on
    #[arg(long, env = "PORT", default_value_t = 4000)]
    pub port: u16,

    /// Packets buffered per connection before it is dropped as a slow consumer
    #[arg(long, default_value_t = 256)]
    pub outbox_capacity: usize,

    /// Inbound events buffered ahead of the dispatcher
    #[arg(long, default_value_t = 1024)]
    pub mailbox_capacity: usize,

    /// Longest accepted inbound line; longer lines close the connection
    #[arg(long, default_value_t = 16 * 1024)]
    pub max_line_bytes: usize,

    /// Who receives broadcasts: joined sessions only, or every open connection
    #[arg(long, value_enum, default_value_t = Audience::Joined)]
    pub audience: Audience,

    /// Log filter used when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones
    #[arg(long, env = "KABOOTAR_JSON_LOGS")]
    pub json_logs: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 4000,
            outbox_capacity: 256,
            mailbox_capacity: 1024,
            max_line_bytes: 16 * 1024,
            audience: Audience::Joined,
            log_level: "info".into(),
            json_logs: false,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbox_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("outbox capacity"));
        }
        if self.mailbox_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("mailbox capacity"));
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::ZeroCapacity("max line bytes"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let cfg = ServerConfig::try_parse_from([
            "server",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--outbox-capacity",
            "8",
            "--audience",
            "connected",
        ])
        .unwrap();
        assert_eq!(cfg.addr(), "127.0.0.1:9000");
        assert_eq!(cfg.outbox_capacity, 8);
        assert_eq!(cfg.audience, Audience::Connected);
        assert_eq!(cfg.mailbox_capacity, 1024);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_audience() {
        assert!(ServerConfig::try_parse_from(["server", "--audience", "room"]).is_err());
    }

    #[test]
    fn zero_capacity_is_invalid() {
        let cfg = ServerConfig {
            outbox_capacity: 0,
            ..ServerConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroCapacity("outbox capacity"))
        );

        let cfg = ServerConfig {
            mailbox_capacity: 0,
            ..ServerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
