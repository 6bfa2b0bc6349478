use std::net::SocketAddr;
use std::time::Duration;

use anyhow::bail;

use crate::exchange::RetransmitSchedule;

/// the default CoAP port
pub const DEFAULT_PORT: u16 = 5683;

/// a full Ethernet frame minus IP/UDP headers; datagrams beyond this are
///  truncated by the OS and will fail to parse
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 1500;

pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub recv_buffer_size: usize,
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> ServerConfig {
        ServerConfig {
            bind_addr,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.recv_buffer_size < 4 {
            bail!("receive buffer cannot hold a message header");
        }
        Ok(())
    }
}

/// Initiator-side reliability knobs. The defaults are the protocol's fixed
///  exponential backoff: 2 s initial wait, doubling, four attempts.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeConfig {
    pub initial_wait: Duration,
    pub max_attempts: u32,
}

impl Default for ExchangeConfig {
    fn default() -> ExchangeConfig {
        ExchangeConfig {
            initial_wait: Duration::from_millis(2000),
            max_attempts: 4,
        }
    }
}

impl ExchangeConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            bail!("at least one send attempt is required");
        }
        if self.initial_wait.is_zero() {
            bail!("the initial retransmission wait must be positive");
        }
        Ok(())
    }

    pub fn schedule(&self) -> RetransmitSchedule {
        RetransmitSchedule {
            initial_wait: self.initial_wait,
            max_attempts: self.max_attempts,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_validation() {
        let mut config = ServerConfig::new("127.0.0.1:0".parse().unwrap());
        assert!(config.validate().is_ok());

        config.recv_buffer_size = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_exchange_config_defaults_match_protocol_constants() {
        let config = ExchangeConfig::default();
        assert_eq!(config.initial_wait, Duration::from_millis(2000));
        assert_eq!(config.max_attempts, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_exchange_config_validation() {
        let mut config = ExchangeConfig::default();
        config.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ExchangeConfig::default();
        config.initial_wait = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
