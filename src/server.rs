use anyhow::Context;
use log::info;
use std::{
    convert::TryFrom,
    env,
    net::{SocketAddr, UdpSocket},
    os::unix::io::{FromRawFd, RawFd},
    process,
};

use crate::{
    engine::AliasResolver, logging::LogHooks, write_packet, DnsHeader, DnsPacket, EndOfBuffer,
    ResponseCode, MAX_PACKET_SIZE,
};

/// First descriptor handed over by a socket-activating supervisor.
pub const LISTEN_FDS_START: RawFd = 3;

/// How the server gets hold of its UDP socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listener {
    /// Bind a fresh socket.
    Bind(SocketAddr),
    /// Adopt an already bound socket inherited from the supervisor.
    Inherit(RawFd),
}

impl Listener {
    /// Picks socket activation when `LISTEN_PID` names this process, binding `addr` otherwise.
    pub fn from_env(addr: SocketAddr) -> anyhow::Result<Listener> {
        Listener::from_vars(
            addr,
            env::var("LISTEN_PID").ok().as_deref(),
            env::var("LISTEN_FDS").ok().as_deref(),
            process::id(),
        )
    }

    fn from_vars(
        addr: SocketAddr,
        listen_pid: Option<&str>,
        listen_fds: Option<&str>,
        pid: u32,
    ) -> anyhow::Result<Listener> {
        if listen_pid != Some(pid.to_string().as_str()) {
            return Ok(Listener::Bind(addr));
        }

        match listen_fds {
            Some("1") => Ok(Listener::Inherit(LISTEN_FDS_START)),
            other => anyhow::bail!(
                "Socket activation expects exactly one socket, LISTEN_FDS={}",
                other.unwrap_or("<unset>")
            ),
        }
    }

    pub fn open(self) -> anyhow::Result<UdpSocket> {
        match self {
            Listener::Bind(addr) => {
                UdpSocket::bind(addr).with_context(|| format!("Unable to bind {}", addr))
            }
            Listener::Inherit(fd) => {
                info!("Using socket activation");
                // SAFETY: the supervisor passes us ownership of a bound datagram socket at `fd`
                // and nothing else in this process refers to it.
                Ok(unsafe { UdpSocket::from_raw_fd(fd) })
            }
        }
    }
}

/// Blocking, single-threaded UDP front end for an [`AliasResolver`].
pub struct Server {
    socket: UdpSocket,
    resolver: AliasResolver,
    hooks: LogHooks,
}

impl Server {
    pub fn new(socket: UdpSocket, resolver: AliasResolver, hooks: LogHooks) -> Self {
        Server {
            socket,
            resolver,
            hooks,
        }
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Answers datagrams one at a time until the socket fails.
    ///
    /// A datagram that cannot be decoded, answered or sent is logged and skipped.
    pub fn serve(&self) -> anyhow::Result<()> {
        info!("Serving on {}", self.local_addr()?);

        let mut buf = [0u8; MAX_PACKET_SIZE];
        loop {
            let (size, src) = self
                .socket
                .recv_from(&mut buf)
                .context("Receiving datagram")?;

            if let Err(e) = self.serve_one(&buf[..size], src) {
                self.hooks.log_error(src, &e);
            }
        }
    }

    fn serve_one(&self, datagram: &[u8], src: SocketAddr) -> anyhow::Result<()> {
        self.hooks.log_recv(src, datagram);

        if let Some(response) = self.respond(datagram, src)? {
            self.socket
                .send_to(&response, src)
                .with_context(|| format!("Sending reply to {}", src))?;
            self.hooks.log_send(src, &response);
        }

        Ok(())
    }

    /// Turns one inbound datagram into the bytes to send back, if any.
    ///
    /// Undecodable queries get a FORMERR reply when their id and QR bit are readable. Responses
    /// are never answered, not even with FORMERR.
    pub fn respond(&self, datagram: &[u8], src: SocketAddr) -> anyhow::Result<Option<Vec<u8>>> {
        let request = match DnsPacket::try_from(datagram) {
            Ok(request) => request,
            Err(e) => {
                self.hooks.log_error(src, &anyhow::anyhow!("{}", e));
                return match format_error(datagram) {
                    Some(reply) => Ok(Some(self.encode(&reply, src)?)),
                    None => Ok(None),
                };
            }
        };

        if request.header.response {
            anyhow::bail!("Ignoring a response packet (id {})", request.header.id);
        }

        self.hooks.log_request(src, &request);
        let reply = self.resolver.handle(&request);
        let bytes = self.encode(&reply, src)?;
        self.hooks.log_reply(src, &reply);

        Ok(Some(bytes))
    }

    // Falls back to an answerless reply with the TC bit set when the full reply is too big.
    fn encode(&self, reply: &DnsPacket, dst: SocketAddr) -> anyhow::Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];

        match write_packet(&mut buf, reply) {
            Ok(size) => {
                buf.truncate(size);
                return Ok(buf);
            }
            Err(e) if e.is::<EndOfBuffer>() => {}
            Err(e) => return Err(e.context("Encoding reply")),
        }

        let mut truncated = reply.clone();
        truncated.answers.clear();
        truncated.header.answers = 0;
        truncated.header.truncated_message = true;
        self.hooks.log_truncated(dst, &truncated);

        let size = write_packet(&mut buf, &truncated).context("Encoding truncated reply")?;
        buf.truncate(size);
        Ok(buf)
    }
}

// Only queries get a FORMERR: the id must be readable and the QR bit in the third byte clear.
fn format_error(datagram: &[u8]) -> Option<DnsPacket> {
    if datagram.len() < 3 || datagram[2] & 0x80 != 0 {
        return None;
    }

    let header = DnsHeader::builder()
        .id(u16::from_be_bytes([datagram[0], datagram[1]]))
        .response(true)
        .rescode(ResponseCode::FORMERR)
        .build();

    Some(DnsPacket::builder().header(header).build())
}
