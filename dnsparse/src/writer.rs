use log::warn;
use thiserror::Error;

use crate::types::{DnsHeader, DnsPacket, DnsQuestion, DnsRecord, QueryType};

// The longest label a length byte can describe; the top two bits are reserved for pointers.
const MAX_LABEL_LEN: usize = 0x3f;

/// The packet does not fit in the output buffer.
#[derive(Debug, Error)]
#[error("End of buffer")]
pub struct EndOfBuffer;

struct BytePacketBuffer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> BytePacketBuffer<'a> {
    pub fn new(buffer: &'a mut [u8]) -> BytePacketBuffer<'a> {
        BytePacketBuffer {
            buf: buffer,
            pos: 0,
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            return Err(EndOfBuffer.into());
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;

        Ok(())
    }

    fn write_u8(&mut self, val: u8) -> anyhow::Result<()> {
        self.write_bytes(&[val])
    }

    fn write_u16(&mut self, val: u16) -> anyhow::Result<()> {
        self.write_bytes(&val.to_be_bytes())
    }

    fn write_u32(&mut self, val: u32) -> anyhow::Result<()> {
        self.write_bytes(&val.to_be_bytes())
    }

    // Names are written uncompressed. An empty name is the root.
    fn write_qname(&mut self, qname: &str) -> anyhow::Result<()> {
        for label in labels(qname)? {
            if label.len() > MAX_LABEL_LEN {
                anyhow::bail!("Single label exceeds 63 characters")
            }

            self.write_u8(label.len() as u8)?;
            self.write_bytes(&label)?;
        }

        self.write_u8(0)
    }

    /// Runs `body` behind a 16-bit length prefix that is patched once the body is written.
    fn write_with_length<F>(&mut self, body: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut Self) -> anyhow::Result<()>,
    {
        let pos = self.pos;
        self.write_u16(0)?;

        body(self)?;

        let size = (self.pos - (pos + 2)) as u16;
        self.buf[pos..pos + 2].copy_from_slice(&size.to_be_bytes());

        Ok(())
    }
}

/// Splits a presentation-form name into raw labels, undoing `\\.`, `\\\\` and `\\DDD` escapes.
fn labels(qname: &str) -> anyhow::Result<Vec<Vec<u8>>> {
    let mut labels = Vec::new();
    let mut current = Vec::new();
    let mut bytes = qname.bytes();

    while let Some(b) = bytes.next() {
        match b {
            b'.' => labels.push(std::mem::take(&mut current)),
            b'\\' => match bytes.next() {
                Some(d) if d.is_ascii_digit() => {
                    let mut value = u16::from(d - b'0');
                    for _ in 0..2 {
                        match bytes.next() {
                            Some(d) if d.is_ascii_digit() => value = value * 10 + u16::from(d - b'0'),
                            _ => anyhow::bail!("Bad \\DDD escape in {}", qname),
                        }
                    }
                    if value > 255 {
                        anyhow::bail!("Bad \\DDD escape in {}", qname)
                    }
                    current.push(value as u8);
                }
                Some(escaped) => current.push(escaped),
                None => anyhow::bail!("Dangling escape in {}", qname),
            },
            _ => current.push(b),
        }
    }
    labels.push(current);

    labels.retain(|label| !label.is_empty());
    Ok(labels)
}

/// Serializes `packet` into `buf`, returning the number of bytes written.
///
/// Fails with "End of buffer" when the packet does not fit; callers size `buf` to the transport
/// limit (512 bytes for plain UDP).
pub fn write(buf: &mut [u8], packet: &DnsPacket) -> anyhow::Result<usize> {
    let mut buffer = BytePacketBuffer::new(buf);

    write_header(&packet.header, &mut buffer)?;

    for question in &packet.questions {
        write_question(question, &mut buffer)?;
    }

    for rec in packet
        .answers
        .iter()
        .chain(&packet.authorities)
        .chain(&packet.resources)
    {
        write_record(rec, &mut buffer)?;
    }

    Ok(buffer.pos)
}

fn write_header(header: &DnsHeader, buffer: &mut BytePacketBuffer) -> anyhow::Result<()> {
    buffer.write_u16(header.id)?;
    buffer.write_u16(header.flags())?;
    buffer.write_u16(header.questions)?;
    buffer.write_u16(header.answers)?;
    buffer.write_u16(header.authoritative_entries)?;
    buffer.write_u16(header.resource_entries)?;

    Ok(())
}

fn write_question(question: &DnsQuestion, buffer: &mut BytePacketBuffer) -> anyhow::Result<()> {
    buffer.write_qname(&question.name)?;
    buffer.write_u16(question.qtype.to_num())?;
    buffer.write_u16(1)?;

    Ok(())
}

// NAME, TYPE, CLASS (always IN) and TTL; RDLENGTH and RDATA follow.
fn write_preamble(
    buffer: &mut BytePacketBuffer,
    domain: &str,
    qtype: QueryType,
    ttl: u32,
) -> anyhow::Result<()> {
    buffer.write_qname(domain)?;
    buffer.write_u16(qtype.to_num())?;
    buffer.write_u16(1)?;
    buffer.write_u32(ttl)?;

    Ok(())
}

fn write_record(record: &DnsRecord, buffer: &mut BytePacketBuffer) -> anyhow::Result<usize> {
    let start_pos = buffer.pos;

    match record {
        DnsRecord::A { domain, addr, ttl } => {
            write_preamble(buffer, domain, QueryType::A, *ttl)?;
            buffer.write_u16(4)?;
            buffer.write_bytes(&addr.octets())?;
        }
        DnsRecord::NS { domain, host, ttl } => {
            write_preamble(buffer, domain, QueryType::NS, *ttl)?;
            buffer.write_with_length(|b| b.write_qname(host))?;
        }
        DnsRecord::CNAME { domain, host, ttl } => {
            write_preamble(buffer, domain, QueryType::CNAME, *ttl)?;
            buffer.write_with_length(|b| b.write_qname(host))?;
        }
        DnsRecord::MX {
            domain,
            priority,
            host,
            ttl,
        } => {
            write_preamble(buffer, domain, QueryType::MX, *ttl)?;
            buffer.write_with_length(|b| {
                b.write_u16(*priority)?;
                b.write_qname(host)
            })?;
        }
        DnsRecord::AAAA { domain, addr, ttl } => {
            write_preamble(buffer, domain, QueryType::AAAA, *ttl)?;
            buffer.write_u16(16)?;
            buffer.write_bytes(&addr.octets())?;
        }
        DnsRecord::UNKNOWN { .. } => {
            warn!("Skipping record: {:?}", record);
        }
    }

    Ok(buffer.pos - start_pos)
}
