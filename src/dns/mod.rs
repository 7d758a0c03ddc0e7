pub mod common;
pub mod constants;
pub mod enums;
pub mod header;
pub mod question;
pub mod resource;

use bitstream_io::{BigEndian, BitWriter};
use common::{PacketComponent, labels_from_name};
use constants::DNSRcode;
use enums::{DNSResourceClass, DNSResourceType};
use header::{DNSHeader, HEADER_LEN};
use question::DNSQuestion;
use resource::DNSResource;
use tracing::trace;

use crate::error::Result;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSPacket {
    pub header: DNSHeader,
    pub questions: Vec<DNSQuestion>,
    pub answers: Vec<DNSResource>,
    pub authorities: Vec<DNSResource>,
    pub resources: Vec<DNSResource>,
}

impl DNSPacket {
    /// Build a recursive query for a single IN-class question
    pub fn query(id: u16, name: &str, qtype: DNSResourceType) -> Result<Self> {
        let labels = labels_from_name(name)?;
        Ok(DNSPacket {
            header: DNSHeader {
                id,
                rd: true,
                qdcount: 1,
                ..Default::default()
            },
            questions: vec![DNSQuestion {
                labels,
                qtype,
                qclass: DNSResourceClass::IN,
            }],
            ..Default::default()
        })
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        trace!("Parsing DNS packet, size: {} bytes", buf.len());
        let (header, mut offset) = DNSHeader::read(buf, 0)?;
        let mut packet = DNSPacket {
            header,
            ..Default::default()
        };

        for _ in 0..packet.header.qdcount {
            let (question, next) = DNSQuestion::read(buf, offset)?;
            packet.questions.push(question);
            offset = next;
        }

        let sections = [
            packet.header.ancount,
            packet.header.nscount,
            packet.header.arcount,
        ];
        for (section, count) in sections.into_iter().enumerate() {
            for _ in 0..count {
                let (resource, next) = DNSResource::read(buf, offset)?;
                offset = next;
                match section {
                    0 => packet.answers.push(resource),
                    1 => packet.authorities.push(resource),
                    _ => packet.resources.push(resource),
                }
            }
        }

        Ok(packet)
    }

    /// Serialize with section counts taken from the section vectors
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(HEADER_LEN + 64);
        let mut writer: BitWriter<&mut Vec<u8>, BigEndian> = BitWriter::new(&mut buf);

        let header = DNSHeader {
            qdcount: self.questions.len() as u16,
            ancount: self.answers.len() as u16,
            nscount: self.authorities.len() as u16,
            arcount: self.resources.len() as u16,
            ..self.header.clone()
        };
        header.write(&mut writer)?;

        for question in &self.questions {
            question.write(&mut writer)?;
        }
        for resource in self
            .answers
            .iter()
            .chain(&self.authorities)
            .chain(&self.resources)
        {
            resource.write(&mut writer)?;
        }

        drop(writer);
        Ok(buf)
    }

    /// Turn a query into an empty response carrying the given rcode
    pub fn response(&self, rcode: u8) -> Self {
        let mut packet = self.clone();
        packet.header.qr = true;
        packet.header.ra = true;
        packet.header.rcode = rcode;
        packet
    }

    pub fn is_nxdomain(&self) -> bool {
        self.header.rcode == DNSRcode::NXDOMAIN
    }

    pub fn is_success(&self) -> bool {
        self.header.rcode == DNSRcode::NOERROR
    }
}
