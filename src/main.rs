use anyhow::Context;
use log::{info, warn};
use std::{
    env,
    net::{SocketAddr, ToSocketAddrs},
};
use structopt::StructOpt;

use dns_alias::{
    collect_alias_tokens,
    logging::{self, LogHooks},
    AliasResolver, AliasTable, Listener, Server, ALIAS_ENV_VAR,
};

#[derive(Debug, StructOpt)]
#[structopt(name = "dns-alias", about = "DNS Proxy")]
struct Opt {
    /// Local proxy port
    #[structopt(short, long, default_value = "5053")]
    port: u16,

    /// Local proxy listen address
    #[structopt(short, long, default_value = "localhost")]
    address: String,

    /// Log hooks to enable (recv, send, request, reply, truncated, error, data); prefix with
    /// + or - to adjust the default set
    #[structopt(long, default_value = "request,reply,truncated,error")]
    log: LogHooks,

    /// Prefix log lines with a timestamp and the module they come from
    #[structopt(long)]
    log_prefix: bool,

    /// Aliases of the form <pattern>=<dest>. Patterns may include globs (*.example.com matches
    /// example.com and foo.example.com). Dest is an IPv4 address or a hostname, looked up at
    /// query time with the system resolver. More aliases can be given in $DNS_ALIAS,
    /// colon-separated.
    aliases: Vec<String>,
}

fn listen_addr(address: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = (address, port)
        .to_socket_addrs()
        .with_context(|| format!("Unable to resolve listen address {}", address))?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .with_context(|| format!("No usable address for {}", address))
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();
    logging::init(opt.log_prefix);

    let env_aliases = env::var(ALIAS_ENV_VAR).ok();
    let aliases = collect_alias_tokens(opt.aliases, env_aliases.as_deref());
    let table = AliasTable::from_tokens(&aliases)?;
    if table.is_empty() {
        warn!("No aliases given");
    }

    info!("Starting Proxy Resolver ({}:{})", opt.address, opt.port);
    info!(
        "Aliases:{}",
        table
            .iter()
            .map(|entry| format!("\n  {}", entry))
            .collect::<String>()
    );

    let resolver = AliasResolver::builder().table(table).build();

    let addr = listen_addr(&opt.address, opt.port)?;
    let socket = Listener::from_env(addr)?.open()?;

    Server::new(socket, resolver, opt.log).serve()
}
