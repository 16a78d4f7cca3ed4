use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
    time::Duration,
};

use crate::protocol::option::tag;

const DEFAULT_CONFIG_PATH: &str = "/etc/dhcpc.conf";
const CONFIG_PATH_ENV_KEY: &str = "DHCPC_CONFIG_PATH";

/// Upper bound for `timeout` and `retry-delay`, in seconds.
pub const MAX_WAIT_SECS: u64 = 3600;

#[derive(Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// UDP socket on port 68.
    #[default]
    Udp,
    /// Hand-built Ethernet frames on a packet socket.
    Raw,
}

#[derive(Deserialize, Clone, PartialEq, Eq, Debug)]
#[serde(rename_all = "kebab-case", default)]
pub struct ClientConfig {
    pub interface: Option<String>,
    /// Seconds to wait for each reply.
    pub timeout: u64,
    /// DISCOVER attempts before giving up.
    pub retries: u32,
    /// Seconds to sleep between attempts.
    pub retry_delay: u64,
    /// Sent as client identifier type 0 when set; otherwise type 1 + MAC.
    pub client_identifier: Option<String>,
    pub transport: TransportKind,
    pub parameter_request_list: Vec<u8>,
    /// Configure the interface once a lease is bound.
    pub apply: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            interface: None,
            timeout: 5,
            retries: 3,
            retry_delay: 2,
            client_identifier: None,
            transport: TransportKind::Udp,
            parameter_request_list: vec![tag::SUBNET_MASK, tag::ROUTER, tag::DNS_SERVER],
            apply: true,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    /// Reads `path`, else the file named by `DHCPC_CONFIG_PATH`, else
    /// `/etc/dhcpc.conf` when present. Falls back to defaults when none apply.
    pub fn load(path: Option<&Path>) -> Result<ClientConfig> {
        let path = match path {
            Some(path) => Some(path.to_owned()),
            None => match std::env::var(CONFIG_PATH_ENV_KEY) {
                Ok(path) => Some(PathBuf::from(path)),
                Err(_) => Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|path| path.exists()),
            },
        };
        let config = match path {
            Some(path) => Self::read(&path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ClientConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<ClientConfig> {
        let file = File::open(path)?;
        let size = file
            .metadata()
            .map(|meta| meta.len() as usize)
            .unwrap_or(1024);
        let mut reader = BufReader::new(file);
        let mut buffer = Vec::with_capacity(size);
        let size = reader.read_to_end(&mut buffer)?;
        let config: ClientConfig = toml::from_slice(&buffer[..size])?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            (1..=MAX_WAIT_SECS).contains(&self.timeout),
            "timeout must be 1 to {MAX_WAIT_SECS} seconds"
        );
        ensure!(
            self.retry_delay <= MAX_WAIT_SECS,
            "retry-delay must be at most {MAX_WAIT_SECS} seconds"
        );
        ensure!(self.retries > 0, "retries must be at least 1");
        ensure!(
            self.parameter_request_list.len() <= u8::MAX as usize,
            "parameter-request-list has {} codes, at most 255 fit",
            self.parameter_request_list.len()
        );
        if let Some(id) = &self.client_identifier {
            ensure!(
                !id.is_empty() && id.len() < u8::MAX as usize,
                "client-identifier must be 1 to 254 bytes"
            );
        }
        Ok(())
    }
}

#[test]
fn parse_test() {
    const TOML_TEXT: &str = r#"
interface = "eth0"
timeout = 10
retries = 5
retry-delay = 1
client-identifier = "lab-host-7"
transport = "raw"
parameter-request-list = [1, 3, 6, 15, 42]
apply = false
    "#;
    let expected = ClientConfig {
        interface: Some("eth0".to_string()),
        timeout: 10,
        retries: 5,
        retry_delay: 1,
        client_identifier: Some("lab-host-7".to_string()),
        transport: TransportKind::Raw,
        parameter_request_list: vec![1, 3, 6, 15, 42],
        apply: false,
    };

    let config = toml::from_str::<ClientConfig>(TOML_TEXT);
    assert_eq!(Ok(expected), config);
}

#[test]
fn partial_file_keeps_defaults_test() {
    let config = toml::from_str::<ClientConfig>("timeout = 2").unwrap();
    assert_eq!(config.timeout(), Duration::from_secs(2));
    assert_eq!(config.retries, 3);
    assert_eq!(config.retry_delay(), Duration::from_secs(2));
    assert_eq!(config.transport, TransportKind::Udp);
    assert_eq!(config.parameter_request_list, vec![1, 3, 6]);
    assert!(config.apply);

    assert!(toml::from_str::<ClientConfig>("transport = \"pcap\"").is_err());
}

#[test]
fn validate_test() {
    assert!(ClientConfig::default().validate().is_ok());
    let config = ClientConfig {
        timeout: 0,
        ..ClientConfig::default()
    };
    assert!(config.validate().is_err());
    let config = ClientConfig {
        retries: 0,
        ..ClientConfig::default()
    };
    assert!(config.validate().is_err());
    let config = ClientConfig {
        client_identifier: Some(String::new()),
        ..ClientConfig::default()
    };
    assert!(config.validate().is_err());

    let config = ClientConfig {
        timeout: MAX_WAIT_SECS,
        retry_delay: MAX_WAIT_SECS,
        ..ClientConfig::default()
    };
    assert!(config.validate().is_ok());
    let config = ClientConfig {
        timeout: u64::MAX,
        ..ClientConfig::default()
    };
    assert!(config.validate().is_err());
    let config = ClientConfig {
        retry_delay: u64::MAX,
        ..ClientConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn huge_timeout_in_file_is_rejected_test() {
    let path = std::env::temp_dir().join(format!("dhcpc-timeout-test-{}.conf", std::process::id()));
    std::fs::write(&path, "timeout = 4294967296\n").unwrap();
    let result = ClientConfig::load(Some(&path));
    std::fs::remove_file(&path).unwrap();
    assert!(result.is_err());
}

#[test]
fn load_test() {
    let path = std::env::temp_dir().join(format!("dhcpc-load-test-{}.conf", std::process::id()));
    std::fs::write(&path, "interface = \"wlan0\"\nretries = 1\n").unwrap();
    let config = ClientConfig::load(Some(&path)).unwrap();
    assert_eq!(config.interface.as_deref(), Some("wlan0"));
    assert_eq!(config.retries, 1);

    std::fs::write(&path, "retries = 0\n").unwrap();
    assert!(ClientConfig::load(Some(&path)).is_err());
    std::fs::remove_file(&path).unwrap();

    assert!(ClientConfig::load(Some(&path)).is_err());
}
