use env_logger::Env;
use log::{error, info};
use std::{fmt, net::SocketAddr, str::FromStr};

use crate::{DnsPacket, DnsRecord};

pub const DEFAULT_HOOKS: &str = "request,reply,truncated,error";

/// Sets up `env_logger`, honouring `RUST_LOG` and falling back to `info`.
///
/// Without `prefix` lines carry only the level and the message.
pub fn init(prefix: bool) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));

    if !prefix {
        builder.format_timestamp(None).format_target(false);
    }

    builder.init();
}

/// Which transport events get logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogHooks {
    pub recv: bool,
    pub send: bool,
    pub request: bool,
    pub reply: bool,
    pub truncated: bool,
    pub error: bool,
    pub data: bool,
}

impl LogHooks {
    pub fn none() -> Self {
        LogHooks {
            recv: false,
            send: false,
            request: false,
            reply: false,
            truncated: false,
            error: false,
            data: false,
        }
    }

    fn hook_mut(&mut self, name: &str) -> Option<&mut bool> {
        let hook = match name {
            "recv" => &mut self.recv,
            "send" => &mut self.send,
            "request" => &mut self.request,
            "reply" => &mut self.reply,
            "truncated" => &mut self.truncated,
            "error" => &mut self.error,
            "data" => &mut self.data,
            _ => return None,
        };

        Some(hook)
    }

    pub fn log_recv(&self, src: SocketAddr, data: &[u8]) {
        if self.recv {
            info!("Received: [{}] ({} bytes)", src, data.len());
        }
        self.log_data("Received", data);
    }

    pub fn log_send(&self, dst: SocketAddr, data: &[u8]) {
        if self.send {
            info!("Sent: [{}] ({} bytes)", dst, data.len());
        }
        self.log_data("Sent", data);
    }

    pub fn log_request(&self, src: SocketAddr, request: &DnsPacket) {
        if self.request {
            info!("Request: [{}] / {}", src, Question(request));
        }
    }

    pub fn log_reply(&self, dst: SocketAddr, reply: &DnsPacket) {
        if self.reply {
            info!(
                "Reply: [{}] / {} / {:?} / RRs: {}",
                dst,
                Question(reply),
                reply.rescode(),
                Answers(&reply.answers)
            );
        }
    }

    pub fn log_truncated(&self, dst: SocketAddr, reply: &DnsPacket) {
        if self.truncated {
            info!(
                "Truncated Reply: [{}] / {} / RRs: {}",
                dst,
                Question(reply),
                Answers(&reply.answers)
            );
        }
    }

    pub fn log_error(&self, peer: SocketAddr, e: &anyhow::Error) {
        if self.error {
            error!("Invalid Request: [{}] :: {:#}", peer, e);
        }
    }

    fn log_data(&self, what: &str, data: &[u8]) {
        if self.data {
            info!("{} data: {:x?}", what, data);
        }
    }
}

impl Default for LogHooks {
    fn default() -> Self {
        DEFAULT_HOOKS
            .parse()
            .unwrap_or_else(|_| LogHooks::none())
    }
}

impl FromStr for LogHooks {
    type Err = anyhow::Error;

    /// Parses a comma-separated hook list.
    ///
    /// Bare names replace the default set; `+name` and `-name` adjust whichever set is in effect.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let items: Vec<&str> = s
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect();

        let has_bare = items
            .iter()
            .any(|item| !item.starts_with('+') && !item.starts_with('-'));

        let mut hooks = LogHooks::none();
        if !has_bare {
            for name in DEFAULT_HOOKS.split(',') {
                if let Some(hook) = hooks.hook_mut(name) {
                    *hook = true;
                }
            }
        }

        for item in items {
            let (name, enable) = match item.as_bytes()[0] {
                b'+' => (&item[1..], true),
                b'-' => (&item[1..], false),
                _ => (item, true),
            };

            match hooks.hook_mut(name) {
                Some(hook) => *hook = enable,
                None => anyhow::bail!("Unknown log hook: {}", name),
            }
        }

        Ok(hooks)
    }
}

struct Question<'a>(&'a DnsPacket);

impl fmt::Display for Question<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.first_question() {
            Some(q) => write!(f, "'{}' ({:?})", q.name, q.qtype),
            None => write!(f, "<no question>"),
        }
    }
}

struct Answers<'a>(&'a [DnsRecord]);

impl fmt::Display for Answers<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "-");
        }

        for (i, record) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            match record {
                DnsRecord::A { addr, ttl, .. } => write!(f, "A {} (ttl {})", addr, ttl)?,
                other => write!(f, "{:?}", other)?,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::QueryType;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    #[test]
    fn default_hooks() {
        let hooks = LogHooks::default();

        assert!(hooks.request && hooks.reply && hooks.truncated && hooks.error);
        assert!(!hooks.recv && !hooks.send && !hooks.data);
    }

    #[test]
    fn bare_names_replace_the_default() {
        let hooks: LogHooks = "recv,send".parse().unwrap();

        assert_eq!(
            hooks,
            LogHooks {
                recv: true,
                send: true,
                ..LogHooks::none()
            }
        );
    }

    #[test]
    fn signed_names_adjust_the_default() {
        let hooks: LogHooks = "+data,-reply".parse().unwrap();

        assert_eq!(
            hooks,
            LogHooks {
                request: true,
                truncated: true,
                error: true,
                data: true,
                ..LogHooks::none()
            }
        );
    }

    #[test]
    fn empty_list_means_default() {
        assert_eq!("".parse::<LogHooks>().unwrap(), LogHooks::default());
    }

    #[test]
    fn unknown_hook_is_rejected() {
        let err = "request,bogus".parse::<LogHooks>().unwrap_err();

        assert_eq!(err.to_string(), "Unknown log hook: bogus");
    }

    #[test]
    fn answers_are_rendered_compactly() {
        let mut reply = DnsPacket::query(1, "a.lan", QueryType::A).reply();
        assert_eq!(Answers(&reply.answers).to_string(), "-");

        reply.add_answer(DnsRecord::A {
            domain: "a.lan".to_string(),
            addr: Ipv4Addr::new(10, 0, 0, 1),
            ttl: 10,
        });

        assert_eq!(Answers(&reply.answers).to_string(), "A 10.0.0.1 (ttl 10)");
        assert_eq!(Question(&reply).to_string(), "'a.lan' (A)");
    }
}
