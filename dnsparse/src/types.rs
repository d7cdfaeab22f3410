use std::{
    net::{Ipv4Addr, Ipv6Addr},
    str::FromStr,
};
use typed_builder::TypedBuilder;

// A message is divided into 5 sections, some of which are empty in certain cases:
//
//     +---------------------+
//     |        Header       |
//     +---------------------+
//     |       Question      | the question for the name server
//     +---------------------+
//     |        Answer       | RRs answering the question
//     +---------------------+
//     |      Authority      | RRs pointing toward an authority
//     +---------------------+
//     |      Additional     | RRs holding additional information
//     +---------------------+
#[derive(Clone, Debug, PartialEq, Eq, TypedBuilder)]
pub struct DnsPacket {
    pub header: DnsHeader,

    #[builder(default = vec![])]
    pub questions: Vec<DnsQuestion>,
    #[builder(default = vec![])]
    pub answers: Vec<DnsRecord>,
    #[builder(default = vec![])]
    pub authorities: Vec<DnsRecord>,
    #[builder(default = vec![])]
    pub resources: Vec<DnsRecord>,
}

//                                  1  1  1  1  1  1
//    0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                      ID                       |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    QDCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    ANCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    NSCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    ARCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
#[derive(Clone, Debug, PartialEq, Eq, TypedBuilder)]
pub struct DnsHeader {
    // Responses carry the id of the query they answer; UDP gives us nothing else to pair them by.
    pub id: u16,

    // 0 for queries, 1 for responses.
    #[builder(default = false)]
    pub response: bool,

    // Kind of query: 0 QUERY, 1 IQUERY, 2 STATUS, 3-15 reserved. Copied into the response.
    #[builder(default = 0)]
    pub opcode: u8,
    // The responding server is an authority for the name in the question section.
    #[builder(default = false)]
    pub authoritative_answer: bool,
    // The message was cut short to fit the transmission channel.
    #[builder(default = false)]
    pub truncated_message: bool,
    // Set in a query and copied into the response.
    #[builder(default = false)]
    pub recursion_desired: bool,
    #[builder(default = false)]
    pub recursion_available: bool,
    // Originally reserved for later use, but now used for DNSSEC queries.
    #[builder(default = false)]
    pub z: bool,
    #[builder(default = false)]
    pub authed_data: bool,
    #[builder(default = false)]
    pub checking_disabled: bool,
    #[builder(default = ResponseCode::NOERROR)]
    pub rescode: ResponseCode, // 4 bits

    #[builder(default = 0)]
    pub questions: u16,
    #[builder(default = 0)]
    pub answers: u16,
    #[builder(default = 0)]
    pub authoritative_entries: u16,
    #[builder(default = 0)]
    pub resource_entries: u16,
}

impl DnsHeader {
    pub fn flags(&self) -> u16 {
        (self.rescode as u16)
            | ((self.checking_disabled as u16) << 4)
            | ((self.authed_data as u16) << 5)
            | ((self.z as u16) << 6)
            | ((self.recursion_available as u16) << 7)
            | ((self.recursion_desired as u16) << 8)
            | ((self.truncated_message as u16) << 9)
            | ((self.authoritative_answer as u16) << 10)
            | ((self.opcode as u16) << 11)
            | ((self.response as u16) << 15)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    NOERROR = 0,
    // The name server was unable to interpret the query.
    FORMERR = 1,
    SERVFAIL = 2,
    // Only meaningful from an authoritative server: the queried name does not exist.
    NXDOMAIN = 3,
    NOTIMP = 4,
    REFUSED = 5,
    //  6-15  Reserved for future use.
}

impl ResponseCode {
    pub fn from_num(num: u8) -> ResponseCode {
        match num {
            1 => ResponseCode::FORMERR,
            2 => ResponseCode::SERVFAIL,
            3 => ResponseCode::NXDOMAIN,
            4 => ResponseCode::NOTIMP,
            5 => ResponseCode::REFUSED,
            _ => ResponseCode::NOERROR,
        }
    }
}

//                                  1  1  1  1  1  1
//    0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  /                     QNAME                     /
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                     QTYPE                     |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                     QCLASS                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: String,
    pub qtype: QueryType,
    // The class is almost always set to 1, so we will not represent it here
}

#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy)]
pub enum QueryType {
    UNKNOWN(u16),
    A,
    CNAME,
    NS,
    MX,
    AAAA,
    // Only valid in questions: "all records you have for this name".
    ANY,
}

impl QueryType {
    pub fn to_num(self) -> u16 {
        match self {
            QueryType::UNKNOWN(x) => x,
            QueryType::A => 1,
            QueryType::CNAME => 5,
            QueryType::NS => 2,
            QueryType::MX => 15,
            QueryType::AAAA => 28,
            QueryType::ANY => 255,
        }
    }

    pub fn from_num(num: u16) -> QueryType {
        match num {
            1 => QueryType::A,
            2 => QueryType::NS,
            5 => QueryType::CNAME,
            15 => QueryType::MX,
            28 => QueryType::AAAA,
            255 => QueryType::ANY,
            _ => QueryType::UNKNOWN(num),
        }
    }
}

impl FromStr for QueryType {
    type Err = String;

    /// Accepts a mnemonic (`A`, `aaaa`, `ANY`, ...) or a numeric type code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let qtype = match s.to_ascii_uppercase().as_str() {
            "A" => QueryType::A,
            "NS" => QueryType::NS,
            "CNAME" => QueryType::CNAME,
            "MX" => QueryType::MX,
            "AAAA" => QueryType::AAAA,
            "ANY" | "*" => QueryType::ANY,
            other => other
                .parse::<u16>()
                .map(QueryType::from_num)
                .map_err(|_| format!("Unknown query type: {}", s))?,
        };

        Ok(qtype)
    }
}

// Resource record layout shared by the answer, authority and additional sections:
//
//     NAME | TYPE (16) | CLASS (16) | TTL (32) | RDLENGTH (16) | RDATA
//
// | ID | Name  | Description                              | Encoding                                         |
// |----+-------+------------------------------------------+--------------------------------------------------|
// | 1  | A     | Alias - Mapping names to IP addresses    | Preamble + Four bytes for IPv4 adress            |
// | 2  | NS    | Name Server - The DNS server address     | Preamble + Label Sequence                        |
// | 5  | CNAME | Canonical Name - Maps names to names     | Preamble + Label Sequence                        |
// | 15 | MX    | Mail eXchange - mail server for a domain | Preamble + 2-bytes for priority + Label Sequence |
// | 28 | AAAA  | IPv6 alias                               | Premable + Sixteen bytes for IPv6 adress         |
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DnsRecord {
    A {
        domain: String,
        addr: Ipv4Addr,
        ttl: u32,
    },
    NS {
        domain: String,
        host: String,
        ttl: u32,
    },
    CNAME {
        domain: String,
        host: String,
        ttl: u32,
    },
    MX {
        domain: String,
        priority: u16,
        host: String,
        ttl: u32,
    },
    AAAA {
        domain: String,
        addr: Ipv6Addr,
        ttl: u32,
    },
    UNKNOWN {
        domain: String,
        qtype: u16,
        data_len: u16,
        ttl: u32,
    },
}

impl DnsPacket {
    /// A recursion-desired query with a single question.
    pub fn query(id: u16, qname: &str, qtype: QueryType) -> DnsPacket {
        let header = DnsHeader::builder()
            .id(id)
            .questions(1)
            .recursion_desired(true)
            .build();

        let question = DnsQuestion {
            name: qname.to_string(),
            qtype,
        };

        DnsPacket::builder()
            .header(header)
            .questions(vec![question])
            .build()
    }

    /// An empty, authoritative reply to this packet.
    ///
    /// The reply keeps the id, opcode and recursion-desired bit of the request and echoes its
    /// primary question. Answers are added with [`DnsPacket::add_answer`].
    pub fn reply(&self) -> DnsPacket {
        let questions: Vec<DnsQuestion> = self.first_question().cloned().into_iter().collect();

        let header = DnsHeader::builder()
            .id(self.header.id)
            .opcode(self.header.opcode)
            .recursion_desired(self.header.recursion_desired)
            .recursion_available(true)
            .authoritative_answer(true)
            .response(true)
            .questions(questions.len() as u16)
            .build();

        DnsPacket::builder()
            .header(header)
            .questions(questions)
            .build()
    }

    pub fn add_answer(&mut self, record: DnsRecord) {
        self.answers.push(record);
        self.header.answers = self.answers.len() as u16;
    }

    pub fn first_question(&self) -> Option<&DnsQuestion> {
        self.questions.get(0)
    }

    pub fn has_answers(&self) -> bool {
        !self.answers.is_empty()
    }

    pub fn rescode(&self) -> ResponseCode {
        self.header.rescode
    }

    pub fn qtype(&self) -> Option<QueryType> {
        self.first_question().map(|q| q.qtype)
    }

    pub fn qname(&self) -> Option<String> {
        self.first_question().map(|q| q.name.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn two_question_query() -> DnsPacket {
        let header = DnsHeader::builder()
            .id(4242)
            .opcode(0)
            .recursion_desired(true)
            .questions(2)
            .build();

        DnsPacket::builder()
            .header(header)
            .questions(vec![
                DnsQuestion {
                    name: "foo.example.com".to_string(),
                    qtype: QueryType::A,
                },
                DnsQuestion {
                    name: "bar.example.com".to_string(),
                    qtype: QueryType::AAAA,
                },
            ])
            .build()
    }

    #[test]
    fn reply_echoes_id_and_primary_question() {
        let query = two_question_query();

        let reply = query.reply();

        assert_eq!(reply.header.id, 4242);
        assert!(reply.header.response);
        assert!(reply.header.authoritative_answer);
        assert!(reply.header.recursion_desired);
        assert_eq!(reply.header.questions, 1);
        assert_eq!(reply.questions, vec![query.questions[0].clone()]);
        assert_eq!(reply.rescode(), ResponseCode::NOERROR);
        assert!(!reply.has_answers());
    }

    #[test]
    fn add_answer_keeps_header_count_in_sync() {
        let mut reply = two_question_query().reply();

        reply.add_answer(DnsRecord::A {
            domain: "foo.example.com".to_string(),
            addr: Ipv4Addr::new(10, 0, 0, 1),
            ttl: 10,
        });
        reply.add_answer(DnsRecord::A {
            domain: "foo.example.com".to_string(),
            addr: Ipv4Addr::new(10, 0, 0, 2),
            ttl: 10,
        });

        assert_eq!(reply.header.answers, 2);
        assert_eq!(reply.answers.len(), 2);
    }

    #[test]
    fn query_type_round_trips_through_numbers() {
        assert_eq!(QueryType::from_num(255), QueryType::ANY);
        assert_eq!(QueryType::ANY.to_num(), 255);
        assert_eq!(QueryType::from_num(16), QueryType::UNKNOWN(16));
    }

    #[test]
    fn query_type_from_str_works() {
        assert_eq!("a".parse::<QueryType>(), Ok(QueryType::A));
        assert_eq!("ANY".parse::<QueryType>(), Ok(QueryType::ANY));
        assert_eq!("16".parse::<QueryType>(), Ok(QueryType::UNKNOWN(16)));
        assert!("bogus".parse::<QueryType>().is_err());
    }
}
