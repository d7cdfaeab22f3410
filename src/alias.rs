use log::error;
use std::{fmt, net::Ipv4Addr};
use thiserror::Error;

use crate::{
    glob,
    resolver::{HostResolver, ResolutionError},
};

/// Separator between the entries of the alias environment variable.
pub const ENV_SEPARATOR: char = ':';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AliasError {
    #[error("Can't parse alias {0}: expected <pattern>=<dest>")]
    MalformedAlias(String),
}

/// Where a matching query is pointed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A numeric IPv4 address, known at startup.
    Literal(Ipv4Addr),
    /// A hostname, looked up every time an alias using it matches.
    Deferred(String),
}

impl Destination {
    pub fn parse(dest: &str) -> Destination {
        match parse_ipv4_literal(dest) {
            Some(ip) => Destination::Literal(ip),
            None => Destination::Deferred(dest.to_string()),
        }
    }

    pub fn resolve(&self, resolver: &dyn HostResolver) -> Result<Ipv4Addr, ResolutionError> {
        match self {
            Destination::Literal(ip) => Ok(*ip),
            Destination::Deferred(host) => resolver.lookup_ipv4(host),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Literal(ip) => write!(f, "{}", ip),
            Destination::Deferred(host) => write!(f, "{} (resolved per query)", host),
        }
    }
}

// Four dot-separated decimal integers, each at most 255. Unlike `Ipv4Addr::from_str`, leading
// zeros are accepted.
fn parse_ipv4_literal(dest: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = dest.split('.');

    for octet in octets.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *octet = part.parse().ok()?;
    }

    match parts.next() {
        Some(_) => None,
        None => Some(Ipv4Addr::from(octets)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasEntry {
    pattern: String,
    destination: Destination,
}

impl AliasEntry {
    /// Parses a `pattern=destination` token, splitting on the first `=` only.
    pub fn parse(token: &str) -> Result<AliasEntry, AliasError> {
        let (pattern, dest) = token
            .split_once('=')
            .ok_or_else(|| AliasError::MalformedAlias(token.to_string()))?;

        Ok(AliasEntry {
            pattern: pattern.to_string(),
            destination: Destination::parse(dest),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn matches(&self, qname: &str) -> bool {
        glob::matches(&self.pattern, qname)
    }
}

impl fmt::Display for AliasEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.pattern, self.destination)
    }
}

/// The ordered, immutable list of aliases a server answers from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    entries: Vec<AliasEntry>,
}

impl AliasTable {
    /// Builds a table in token order.
    ///
    /// Every token is parsed and each malformed one is logged; if any failed, the first failure
    /// is returned and no table is built.
    pub fn from_tokens<I, S>(tokens: I) -> Result<AliasTable, AliasError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = Vec::new();
        let mut first_error = None;

        for token in tokens {
            match AliasEntry::parse(token.as_ref()) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    error!("{}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(AliasTable { entries }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AliasEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Merges command-line aliases with the colon-separated alias environment value.
///
/// Command-line aliases come first. Environment entries are trimmed and empty ones dropped.
pub fn collect_alias_tokens(args: Vec<String>, env_value: Option<&str>) -> Vec<String> {
    let mut tokens = args;

    if let Some(value) = env_value {
        tokens.extend(
            value
                .split(ENV_SEPARATOR)
                .map(str::trim)
                .filter(|alias| !alias.is_empty())
                .map(String::from),
        );
    }

    tokens
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io;

    struct NoLookups;

    impl HostResolver for NoLookups {
        fn lookup_ipv4(&self, host: &str) -> Result<Ipv4Addr, ResolutionError> {
            Err(ResolutionError::new(
                host,
                io::Error::new(io::ErrorKind::Other, "lookups disabled"),
            ))
        }
    }

    #[test]
    fn ip_destination_is_literal() {
        let entry = AliasEntry::parse("*.example.com=10.1.2.3").unwrap();

        assert_eq!(entry.pattern(), "*.example.com");
        assert_eq!(
            entry.destination(),
            &Destination::Literal(Ipv4Addr::new(10, 1, 2, 3))
        );
        assert_eq!(
            entry.destination().resolve(&NoLookups).unwrap(),
            Ipv4Addr::new(10, 1, 2, 3)
        );
    }

    #[test]
    fn hostname_destination_is_deferred() {
        let entry = AliasEntry::parse("db.lan=db.internal.example.com").unwrap();

        assert_eq!(
            entry.destination(),
            &Destination::Deferred("db.internal.example.com".to_string())
        );
        assert!(entry.destination().resolve(&NoLookups).is_err());
    }

    #[test]
    fn splits_on_first_equals_only() {
        let entry = AliasEntry::parse("a=b=c").unwrap();

        assert_eq!(entry.pattern(), "a");
        assert_eq!(entry.destination(), &Destination::Deferred("b=c".to_string()));
    }

    #[test]
    fn missing_separator_is_malformed() {
        assert_eq!(
            AliasEntry::parse("no-equals-sign"),
            Err(AliasError::MalformedAlias("no-equals-sign".to_string()))
        );
    }

    #[test]
    fn literal_detection() {
        assert_eq!(
            parse_ipv4_literal("192.168.001.010"),
            Some(Ipv4Addr::new(192, 168, 1, 10))
        );
        assert_eq!(parse_ipv4_literal("0.0.0.0"), Some(Ipv4Addr::UNSPECIFIED));
        assert_eq!(parse_ipv4_literal("256.1.1.1"), None);
        assert_eq!(parse_ipv4_literal("1.2.3"), None);
        assert_eq!(parse_ipv4_literal("1.2.3.4.5"), None);
        assert_eq!(parse_ipv4_literal("1.2.3.-4"), None);
        assert_eq!(parse_ipv4_literal("1..3.4"), None);
        assert_eq!(parse_ipv4_literal("10.0.0.1a"), None);
        assert_eq!(parse_ipv4_literal("localhost"), None);
    }

    #[test]
    fn entries_display_their_destination_kind() {
        let table = AliasTable::from_tokens(&["*.lan=10.0.0.1", "db.lan=db.internal"]).unwrap();

        let lines: Vec<String> = table.iter().map(ToString::to_string).collect();

        assert_eq!(
            lines,
            vec!["*.lan -> 10.0.0.1", "db.lan -> db.internal (resolved per query)"]
        );
    }

    #[test]
    fn table_keeps_input_order() {
        let table = AliasTable::from_tokens(vec![
            "*.example.com=10.0.0.1",
            "foo.example.com=10.0.0.2",
            "db=db.internal",
        ])
        .unwrap();

        let patterns: Vec<&str> = table.iter().map(AliasEntry::pattern).collect();
        assert_eq!(patterns, vec!["*.example.com", "foo.example.com", "db"]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn malformed_token_is_named_without_tainting_the_others() {
        let tokens = vec!["a.lan=10.0.0.1", "no-equals-sign", "b.lan=b.internal"];

        let err = AliasTable::from_tokens(&tokens).unwrap_err();
        assert_eq!(err, AliasError::MalformedAlias("no-equals-sign".to_string()));

        let valid: Vec<&str> = tokens.iter().copied().filter(|t| *t != "no-equals-sign").collect();
        let table = AliasTable::from_tokens(valid).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn env_aliases_follow_cli_aliases() {
        let tokens = collect_alias_tokens(
            vec!["a.lan=10.0.0.1".to_string()],
            Some(" b.lan=10.0.0.2 ::c.lan=c.internal: "),
        );

        assert_eq!(
            tokens,
            vec!["a.lan=10.0.0.1", "b.lan=10.0.0.2", "c.lan=c.internal"]
        );
    }

    #[test]
    fn missing_env_value_adds_nothing() {
        assert!(collect_alias_tokens(vec![], None).is_empty());
        assert!(collect_alias_tokens(vec![], Some("  :  ")).is_empty());
    }
}
