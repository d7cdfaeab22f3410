use log::{debug, error};
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::{
    alias::AliasTable,
    resolver::{HostResolver, ResolutionError, SystemResolver},
    DnsPacket, DnsRecord, QueryType, ResponseCode,
};

/// TTL of every answer we hand out. Short, since deferred destinations may move.
pub const ANSWER_TTL: u32 = 10;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

/// Answers queries from an [`AliasTable`].
#[derive(TypedBuilder)]
pub struct AliasResolver {
    table: AliasTable,
    #[builder(default = Box::new(SystemResolver) as Box<dyn HostResolver>)]
    resolver: Box<dyn HostResolver>,
}

impl AliasResolver {
    pub fn table(&self) -> &AliasTable {
        &self.table
    }

    /// Resolves the primary question of `query` against the table.
    ///
    /// Entries are tried in table order and the first one whose pattern matches decides the
    /// answer, so at most one record is ever returned. Only A, ANY and CNAME questions are
    /// answered.
    pub fn resolve_query(&self, query: &DnsPacket) -> Result<Vec<DnsRecord>, EngineError> {
        let question = match query.first_question() {
            Some(question) => question,
            None => return Ok(vec![]),
        };

        let mut answers = Vec::with_capacity(1);

        for entry in self.table.iter() {
            if entry.matches(&question.name) && answers_type(question.qtype) {
                let addr = entry.destination().resolve(self.resolver.as_ref())?;
                debug!("{} matched {} -> {}", question.name, entry.pattern(), addr);

                answers.push(DnsRecord::A {
                    domain: question.name.clone(),
                    addr,
                    ttl: ANSWER_TTL,
                });
                break;
            }
        }

        Ok(answers)
    }

    /// Builds the reply for `query`. Failures are logged and answered with NXDOMAIN.
    pub fn handle(&self, query: &DnsPacket) -> DnsPacket {
        let answers = self.resolve_query(query).unwrap_or_else(|e| {
            error!("Got error: {}", e);
            vec![]
        });

        assemble(query, answers)
    }
}

fn answers_type(qtype: QueryType) -> bool {
    matches!(qtype, QueryType::A | QueryType::ANY | QueryType::CNAME)
}

/// Wraps `answers`, in order, into a reply to `query`; no answers means NXDOMAIN.
pub fn assemble(query: &DnsPacket, answers: Vec<DnsRecord>) -> DnsPacket {
    let mut reply = query.reply();

    for answer in answers {
        reply.add_answer(answer);
    }

    if !reply.has_answers() {
        reply.header.rescode = ResponseCode::NXDOMAIN;
    }

    reply
}
