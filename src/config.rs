use std::fmt;
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr};

use serde::Deserialize;

struct Defaults {}

impl Defaults {
    fn asn() -> u32 {
        64512
    }

    fn router_id() -> Ipv4Addr {
        Ipv4Addr::new(1, 1, 1, 1)
    }

    fn listen_addr() -> IpAddr {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    }

    fn metrics_port() -> u16 {
        9179
    }

    fn delete_on_disconnect() -> bool {
        false
    }
}

/// Config (toml) representation
#[derive(Debug, Deserialize)]
struct ConfigFile {
    // Local ASN advertised in our OPEN (AS_TRANS on the wire when > 16 bits)
    #[serde(default = "Defaults::asn")]
    asn: u32,

    // Local BGP identifier advertised in our OPEN
    #[serde(default = "Defaults::router_id")]
    router_id: Ipv4Addr,

    // Address the BGP listener binds to (port is always 179)
    #[serde(default = "Defaults::listen_addr")]
    listen_addr: IpAddr,

    // Port for the /metrics HTTP endpoint
    #[serde(default = "Defaults::metrics_port")]
    metrics_port: u16,

    // Drop a peer's metric series on disconnect instead of
    // leaving them visible at zero
    #[serde(default = "Defaults::delete_on_disconnect")]
    delete_on_disconnect: bool,
}

/// Validated runtime configuration. Built once at startup and handed to
/// sessions as an immutable value; the core never reads the
/// environment, files, or flags itself.
#[derive(Debug)]
pub struct Config {
    pub asn: u32,
    pub router_id: Ipv4Addr,
    pub listen_addr: IpAddr,
    pub metrics_port: u16,
    pub delete_on_disconnect: bool,
}

impl Config {
    /// Parse a TOML config file, falling back to defaults for any
    /// missing field
    pub fn from_file(path: &str) -> io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&contents)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        Ok(file.into())
    }
}

impl From<ConfigFile> for Config {
    fn from(file: ConfigFile) -> Self {
        Self {
            asn: file.asn,
            router_id: file.router_id,
            listen_addr: file.listen_addr,
            metrics_port: file.metrics_port,
            delete_on_disconnect: file.delete_on_disconnect,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            asn: Defaults::asn(),
            router_id: Defaults::router_id(),
            listen_addr: Defaults::listen_addr(),
            metrics_port: Defaults::metrics_port(),
            delete_on_disconnect: Defaults::delete_on_disconnect(),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<Config asn={} router_id={} listen={} metrics_port={} delete_on_disconnect={}>",
            self.asn, self.router_id, self.listen_addr, self.metrics_port, self.delete_on_disconnect,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let contents = r#"
            asn = 70000
            router_id = "10.0.0.1"
            listen_addr = "127.0.0.1"
            metrics_port = 9200
            delete_on_disconnect = true
        "#;
        let file: ConfigFile = toml::from_str(contents).unwrap();
        let config = Config::from(file);
        assert_eq!(config.asn, 70000);
        assert_eq!(config.router_id, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(config.listen_addr, "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(config.metrics_port, 9200);
        assert!(config.delete_on_disconnect);
    }

    #[test]
    fn test_defaults_apply() {
        let file: ConfigFile = toml::from_str("asn = 65000").unwrap();
        let config = Config::from(file);
        assert_eq!(config.asn, 65000);
        assert_eq!(config.router_id, Ipv4Addr::new(1, 1, 1, 1));
        assert_eq!(config.metrics_port, 9179);
        assert!(!config.delete_on_disconnect);
    }

    #[test]
    fn test_invalid_router_id_is_rejected() {
        assert!(toml::from_str::<ConfigFile>(r#"router_id = "not-an-ip""#).is_err());
    }
}
