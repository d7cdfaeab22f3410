use std::{
    convert::TryFrom,
    net::{Ipv4Addr, Ipv6Addr},
};

use crate::types::{DnsHeader, DnsPacket, DnsQuestion, DnsRecord, QueryType, ResponseCode};
use log::trace;
use nom::{
    bytes::complete::take as take_bytes,
    error::{ErrorKind, ParseError},
    multi::count,
    number::complete::{be_u16, be_u32, be_u8},
    IResult,
};

// The two high bits of a length byte mark a compression pointer.
const POINTER_FLAG: u8 = 0xc0;
const NULL_BYTE: u8 = 0x00;
// A legitimate name never needs more than a handful of pointers; anything past this is a loop.
const MAX_JUMPS: usize = 16;

fn ipv4<'a, E>() -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], Ipv4Addr, E>
where
    E: ParseError<&'a [u8]>,
{
    |rest| {
        let (rest, quad0) = be_u8(rest)?;
        let (rest, quad1) = be_u8(rest)?;
        let (rest, quad2) = be_u8(rest)?;
        let (rest, quad3) = be_u8(rest)?;

        let ip = Ipv4Addr::new(quad0, quad1, quad2, quad3);

        Ok((rest, ip))
    }
}

#[allow(clippy::many_single_char_names)]
fn ipv6<'a, E>() -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], Ipv6Addr, E>
where
    E: ParseError<&'a [u8]>,
{
    |rest| {
        let (rest, a) = be_u16(rest)?;
        let (rest, b) = be_u16(rest)?;
        let (rest, c) = be_u16(rest)?;
        let (rest, d) = be_u16(rest)?;
        let (rest, e) = be_u16(rest)?;
        let (rest, f) = be_u16(rest)?;
        let (rest, g) = be_u16(rest)?;
        let (rest, h) = be_u16(rest)?;

        let ip = Ipv6Addr::new(a, b, c, d, e, f, g, h);

        Ok((rest, ip))
    }
}

fn domain_fragment<'a, E>() -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], String, E>
where
    E: ParseError<&'a [u8]>,
{
    |input| {
        let (rest, size) = be_u8(input)?;
        let (rest, name) = take_bytes(size as usize)(rest)?;

        Ok((rest, escape_label(name)))
    }
}

// Presentation form of a label: `.` and `\` are backslash-escaped and anything outside printable
// ASCII becomes `\DDD`, so the name survives being written back byte for byte.
fn escape_label(bytes: &[u8]) -> String {
    let mut label = String::with_capacity(bytes.len());

    for &b in bytes {
        match b {
            b'.' | b'\\' => {
                label.push('\\');
                label.push(b as char);
            }
            0x21..=0x7e => label.push(b as char),
            _ => label.push_str(&format!("\\{:03}", b)),
        }
    }

    label
}

fn domain_name<'a, E>(original: &'a [u8]) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], String, E>
where
    E: ParseError<&'a [u8]>,
{
    move |input| labels(original, input, 0)
}

/// Reads a label sequence, following compression pointers into `original`.
///
/// The returned remainder is the input just past the terminating null byte, or just past the
/// first pointer when the name is compressed.
fn labels<'a, E>(original: &'a [u8], input: &'a [u8], jumps: usize) -> IResult<&'a [u8], String, E>
where
    E: ParseError<&'a [u8]>,
{
    let mut fragments = Vec::new();
    let mut rest = input;

    loop {
        let (after_len, len) = be_u8(rest)?;

        if len == NULL_BYTE {
            rest = after_len;
            break;
        }

        if len & POINTER_FLAG == POINTER_FLAG {
            let (after_pointer, low) = be_u8(after_len)?;
            let offset = (((len & !POINTER_FLAG) as usize) << 8) | low as usize;
            if jumps >= MAX_JUMPS || offset >= original.len() {
                return Err(nom::Err::Failure(E::from_error_kind(rest, ErrorKind::Verify)));
            }

            trace!("jumping to {} (jump #{})", offset, jumps + 1);
            let (_ignore_rest, tail) = labels::<E>(original, &original[offset..], jumps + 1)?;
            if !tail.is_empty() {
                fragments.push(tail);
            }

            rest = after_pointer;
            break;
        }

        // 0x40 and 0x80 label types are reserved.
        if len & POINTER_FLAG != 0 {
            return Err(nom::Err::Failure(E::from_error_kind(rest, ErrorKind::Tag)));
        }

        let (after_label, fragment) = domain_fragment::<E>()(rest)?;
        fragments.push(fragment);
        rest = after_label;
    }

    let domain = fragments.join(".");
    trace!("domain: {}, remaining: {:x?}", domain, rest);

    Ok((rest, domain))
}

fn header<'a, E>() -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], DnsHeader, E>
where
    E: ParseError<&'a [u8]>,
{
    |input| {
        // network order is big endian
        let (rest, id) = be_u16(input)?;

        let (rest, a) = be_u8(rest)?;
        let (rest, b) = be_u8(rest)?;

        // Not sure how to do this bit fiddling with nom
        let recursion_desired = (a & (1 << 0)) > 0;
        let truncated_message = (a & (1 << 1)) > 0;
        let authoritative_answer = (a & (1 << 2)) > 0;
        let opcode = (a >> 3) & 0x0F;
        let response = (a & (1 << 7)) > 0;
        let rescode = ResponseCode::from_num(b & 0x0F);
        let checking_disabled = (b & (1 << 4)) > 0;
        let authed_data = (b & (1 << 5)) > 0;
        let z = (b & (1 << 6)) > 0;
        let recursion_available = (b & (1 << 7)) > 0;

        let (rest, questions) = be_u16(rest)?;
        let (rest, answers) = be_u16(rest)?;
        let (rest, authoritative_entries) = be_u16(rest)?;
        let (rest, resource_entries) = be_u16(rest)?;

        let dns_header = DnsHeader {
            id,

            response,
            opcode,
            authoritative_answer,
            truncated_message,
            recursion_desired,

            recursion_available,
            z,
            authed_data,
            checking_disabled,
            rescode,

            questions,
            answers,
            authoritative_entries,
            resource_entries,
        };

        Ok((rest, dns_header))
    }
}

fn question<'a, E>(original: &'a [u8]) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], DnsQuestion, E>
where
    E: ParseError<&'a [u8]>,
{
    move |input| {
        let (rest, domain) = domain_name(original)(input)?;
        let (rest, qtype) = be_u16(rest)?;
        let (rest, _qclass) = be_u16(rest)?;

        let question = DnsQuestion {
            name: domain,
            qtype: QueryType::from_num(qtype),
        };

        Ok((rest, question))
    }
}

fn answer<'a, E>(original: &'a [u8]) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], DnsRecord, E>
where
    E: ParseError<&'a [u8]>,
{
    move |input| {
        let (rest, domain) = domain_name(original)(input)?;
        let (rest, qnum) = be_u16(rest)?;
        let (rest, _qclass) = be_u16(rest)?;
        let (rest, ttl) = be_u32(rest)?;
        let (rest, data_len) = be_u16(rest)?;

        let qtype = QueryType::from_num(qnum);
        let (rest, record_bytes) = take_bytes(data_len as usize)(rest)?;

        let record = match qtype {
            QueryType::UNKNOWN(_) => DnsRecord::UNKNOWN {
                domain,
                qtype: qnum,
                data_len,
                ttl,
            },
            QueryType::A => {
                let (_rest, addr) = ipv4()(record_bytes)?;
                DnsRecord::A { domain, addr, ttl }
            }
            QueryType::CNAME => {
                let (_rest, host) = domain_name(original)(record_bytes)?;
                DnsRecord::CNAME { domain, host, ttl }
            }
            QueryType::NS => {
                let (_rest, host) = domain_name(original)(record_bytes)?;
                DnsRecord::NS { domain, host, ttl }
            }
            QueryType::MX => {
                let (rest, priority) = be_u16(record_bytes)?;
                let (_rest, host) = domain_name(original)(rest)?;
                DnsRecord::MX {
                    domain,
                    host,
                    ttl,
                    priority,
                }
            }
            QueryType::AAAA => {
                let (_rest, addr) = ipv6()(record_bytes)?;
                DnsRecord::AAAA { domain, addr, ttl }
            }
            // ANY never appears as a record type on the wire; keep it opaque.
            QueryType::ANY => DnsRecord::UNKNOWN {
                domain,
                qtype: qnum,
                data_len,
                ttl,
            },
        };

        Ok((rest, record))
    }
}

pub fn packet<'a>(input: &'a [u8], original: &'a [u8]) -> IResult<&'a [u8], DnsPacket> {
    let (rest, header) = header()(input)?;
    let (rest, questions) = count(question(original), header.questions as usize)(rest)?;
    let (rest, answers) = count(answer(original), header.answers as usize)(rest)?;
    let (rest, authorities) = count(answer(original), header.authoritative_entries as usize)(rest)?;
    let (rest, resources) = count(answer(original), header.resource_entries as usize)(rest)?;

    let dns_packet = DnsPacket {
        header,
        questions,
        answers,
        authorities,
        resources,
    };

    Ok((rest, dns_packet))
}

impl<'a> TryFrom<&'a [u8]> for DnsPacket {
    type Error = String;

    fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
        match packet(value, value) {
            Ok(([], cl)) => Ok(cl),
            Ok((s, _)) => Err(format!(
                "Parsing Error: Unable to parse the whole dns packet\nRemaining Tokens: {:?}",
                s
            )),
            Err(e) => Err(format!("Parsing Error: {:?}", e)),
        }
    }
}
