pub use dnsparse::{
    write_packet, DnsHeader, DnsPacket, DnsQuestion, DnsRecord, QueryType, ResponseCode,
    EndOfBuffer,
};

pub mod alias;
pub mod engine;
pub mod glob;
pub mod logging;
pub mod resolver;
pub mod server;

pub use alias::{collect_alias_tokens, AliasEntry, AliasError, AliasTable, Destination};
pub use engine::{assemble, AliasResolver, EngineError, ANSWER_TTL};
pub use resolver::{HostResolver, ResolutionError, SystemResolver};
pub use server::{Listener, Server};

pub const MAX_PACKET_SIZE: usize = 512;

/// Environment variable holding extra, colon-separated aliases.
pub const ALIAS_ENV_VAR: &str = "DNS_ALIAS";
