use anyhow::Context;
use log::debug;
use std::{
    convert::TryFrom,
    net::{SocketAddr, UdpSocket},
    time::Duration,
};
use structopt::StructOpt;

use dns_alias::{write_packet, DnsPacket, QueryType, MAX_PACKET_SIZE};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "dns-alias-query",
    about = "Send a single query to a dns-alias server and print the reply"
)]
struct Opt {
    #[structopt(short, long, default_value = "example.com")]
    query: String,

    /// Record type: A, ANY, CNAME, AAAA, MX, NS or a numeric code
    #[structopt(short = "t", long, default_value = "A")]
    qtype: QueryType,

    #[structopt(short, long, default_value = "127.0.0.1:5053")]
    server: SocketAddr,

    /// Seconds to wait for the reply
    #[structopt(long, default_value = "5")]
    timeout: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opt = Opt::from_args();
    debug!("args {:?}", opt);

    let socket = UdpSocket::bind(("0.0.0.0", 0))?;
    socket.set_read_timeout(Some(Duration::from_secs(opt.timeout)))?;

    let request = DnsPacket::query(rand::random(), &opt.query, opt.qtype);
    debug!("Request: {:#?}", request);

    let mut req_buffer = vec![0u8; MAX_PACKET_SIZE];
    let size = write_packet(&mut req_buffer, &request)?;

    socket.send_to(&req_buffer[..size], opt.server)?;

    let mut response_buffer = vec![0u8; MAX_PACKET_SIZE];
    let (size, _src) = socket
        .recv_from(&mut response_buffer)
        .with_context(|| format!("No reply from {}", opt.server))?;

    let response = DnsPacket::try_from(&response_buffer[..size]).map_err(anyhow::Error::msg)?;
    if response.header.id != request.header.id {
        anyhow::bail!(
            "Reply id {} does not match query id {}",
            response.header.id,
            request.header.id
        );
    }

    print_packet(&response);

    Ok(())
}

pub fn print_packet(packet: &DnsPacket) {
    println!("{:#?}", packet.header);

    for q in &packet.questions {
        println!("{:#?}", q);
    }
    for rec in &packet.answers {
        println!("{:#?}", rec);
    }
}
