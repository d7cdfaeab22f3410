use log::debug;
use std::{
    io,
    net::{IpAddr, Ipv4Addr, ToSocketAddrs},
};
use thiserror::Error;

/// A forward lookup of a hostname failed.
#[derive(Debug, Error)]
#[error("Failed to resolve {host}: {source}")]
pub struct ResolutionError {
    host: String,
    #[source]
    source: io::Error,
}

impl ResolutionError {
    pub fn new(host: impl Into<String>, source: io::Error) -> Self {
        ResolutionError {
            host: host.into(),
            source,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

/// Turns a hostname into an IPv4 address.
///
/// Implementations are called on the request-handling path once per matching query and must not
/// cache: the answer is allowed to change between two queries.
pub trait HostResolver: Send + Sync {
    fn lookup_ipv4(&self, host: &str) -> Result<Ipv4Addr, ResolutionError>;
}

/// Blocking lookups through the operating system resolver (`getaddrinfo`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl HostResolver for SystemResolver {
    fn lookup_ipv4(&self, host: &str) -> Result<Ipv4Addr, ResolutionError> {
        let addrs = (host, 0u16)
            .to_socket_addrs()
            .map_err(|e| ResolutionError::new(host, e))?;

        let addr = addrs
            .filter_map(|addr| match addr.ip() {
                IpAddr::V4(ip) => Some(ip),
                IpAddr::V6(_) => None,
            })
            .next()
            .ok_or_else(|| {
                ResolutionError::new(
                    host,
                    io::Error::new(io::ErrorKind::NotFound, "no IPv4 address"),
                )
            })?;

        debug!("System resolver: {} -> {}", host, addr);
        Ok(addr)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn system_resolver_handles_numeric_hosts() {
        let addr = SystemResolver.lookup_ipv4("127.0.0.1").unwrap();

        assert_eq!(addr, Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn system_resolver_reports_the_failing_host() {
        let err = SystemResolver
            .lookup_ipv4("no-such-host.invalid")
            .unwrap_err();

        assert_eq!(err.host(), "no-such-host.invalid");
        assert!(err.to_string().starts_with("Failed to resolve no-such-host.invalid"));
    }
}
