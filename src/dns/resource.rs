use std::net::{Ipv4Addr, Ipv6Addr};

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::{
    common::{PacketComponent, name_from_labels, read_name, slice_at, write_name},
    enums::{DNSResourceClass, DNSResourceType},
};
use crate::error::{DnsError, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSResource {
    pub labels: Vec<String>,
    pub rtype: DNSResourceType,
    pub rclass: DNSResourceClass,
    pub ttl: u32,
    pub rdata: RData,
}

/// Decoded record payload, tagged by record kind
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    CNAME(Vec<String>),
    MX {
        preference: u16,
        exchange: Vec<String>,
    },
    NS(Vec<String>),
    PTR(Vec<String>),
    SOA(Soa),
    TXT(Vec<String>),
    Unknown(Vec<u8>),
}

impl Default for RData {
    fn default() -> Self {
        RData::Unknown(Vec::new())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Soa {
    pub mname: Vec<String>,
    pub rname: Vec<String>,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

impl DNSResource {
    /// Owner name in presentation format
    pub fn name(&self) -> String {
        name_from_labels(&self.labels)
    }

    fn encode_rdata(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut writer: BitWriter<&mut Vec<u8>, BigEndian> = BitWriter::new(&mut buf);
        match &self.rdata {
            RData::A(addr) => writer.write_bytes(&addr.octets())?,
            RData::AAAA(addr) => writer.write_bytes(&addr.octets())?,
            RData::CNAME(target) | RData::NS(target) | RData::PTR(target) => {
                write_name(&mut writer, target)?
            }
            RData::MX {
                preference,
                exchange,
            } => {
                writer.write_var::<u16>(16, *preference)?;
                write_name(&mut writer, exchange)?;
            }
            RData::SOA(soa) => {
                write_name(&mut writer, &soa.mname)?;
                write_name(&mut writer, &soa.rname)?;
                for field in [soa.serial, soa.refresh, soa.retry, soa.expire, soa.minimum] {
                    writer.write_var::<u32>(32, field)?;
                }
            }
            RData::TXT(chunks) => {
                for chunk in chunks {
                    let bytes = chunk.as_bytes();
                    if bytes.len() > u8::MAX as usize {
                        return Err(DnsError::InvalidRecordData {
                            rtype: self.rtype.into(),
                            reason: "text chunk longer than 255 octets",
                        });
                    }
                    writer.write_var::<u8>(8, bytes.len() as u8)?;
                    writer.write_bytes(bytes)?;
                }
            }
            RData::Unknown(bytes) => writer.write_bytes(bytes)?,
        }
        drop(writer);
        Ok(buf)
    }
}

impl PacketComponent for DNSResource {
    fn write<E: Endianness>(&self, writer: &mut BitWriter<&mut Vec<u8>, E>) -> Result<()> {
        let rdata = self.encode_rdata()?;
        self.write_labels(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.rtype.into())?;
        writer.write_var::<u16>(16, self.rclass.into())?;
        writer.write_var::<u32>(32, self.ttl)?;
        writer.write_var::<u16>(16, rdata.len() as u16)?;
        writer.write_bytes(&rdata)?;
        Ok(())
    }

    fn read(packet: &[u8], offset: usize) -> Result<(Self, usize)> {
        let (labels, pos) = read_name(packet, offset)?;
        let mut reader = BitReader::<_, BigEndian>::new(slice_at(packet, pos, 10)?);
        let rtype: DNSResourceType = reader.read_var::<u16>(16)?.into();
        let rclass = reader.read_var::<u16>(16)?.into();
        let ttl = reader.read_var::<u32>(32)?;
        let rdlength = reader.read_var::<u16>(16)? as usize;

        let rdata_start = pos + 10;
        let raw = slice_at(packet, rdata_start, rdlength)?;
        let rdata = decode_rdata(packet, rdata_start, raw, rtype)?;

        Ok((
            DNSResource {
                labels,
                rtype,
                rclass,
                ttl,
                rdata,
            },
            rdata_start + rdlength,
        ))
    }
}

/// Names inside RDATA may be compressed, so decoding needs the whole packet
fn decode_rdata(
    packet: &[u8],
    start: usize,
    raw: &[u8],
    rtype: DNSResourceType,
) -> Result<RData> {
    let invalid = |reason| DnsError::InvalidRecordData {
        rtype: rtype.into(),
        reason,
    };

    let rdata = match rtype {
        DNSResourceType::A => {
            let octets: [u8; 4] = raw.try_into().map_err(|_| invalid("expected 4 octets"))?;
            RData::A(Ipv4Addr::from(octets))
        }
        DNSResourceType::AAAA => {
            let octets: [u8; 16] = raw.try_into().map_err(|_| invalid("expected 16 octets"))?;
            RData::AAAA(Ipv6Addr::from(octets))
        }
        DNSResourceType::CNAME => RData::CNAME(read_name(packet, start)?.0),
        DNSResourceType::NS => RData::NS(read_name(packet, start)?.0),
        DNSResourceType::PTR => RData::PTR(read_name(packet, start)?.0),
        DNSResourceType::MX => {
            if raw.len() < 3 {
                return Err(invalid("missing preference or exchange"));
            }
            let preference = u16::from_be_bytes([raw[0], raw[1]]);
            let (exchange, _) = read_name(packet, start + 2)?;
            RData::MX {
                preference,
                exchange,
            }
        }
        DNSResourceType::SOA => {
            let (mname, pos) = read_name(packet, start)?;
            let (rname, pos) = read_name(packet, pos)?;
            let mut reader = BitReader::<_, BigEndian>::new(slice_at(packet, pos, 20)?);
            RData::SOA(Soa {
                mname,
                rname,
                serial: reader.read_var::<u32>(32)?,
                refresh: reader.read_var::<u32>(32)?,
                retry: reader.read_var::<u32>(32)?,
                expire: reader.read_var::<u32>(32)?,
                minimum: reader.read_var::<u32>(32)?,
            })
        }
        DNSResourceType::TXT => {
            let mut chunks = Vec::new();
            let mut pos = 0;
            while pos < raw.len() {
                let len = raw[pos] as usize;
                let chunk = raw
                    .get(pos + 1..pos + 1 + len)
                    .ok_or_else(|| invalid("text chunk overruns record"))?;
                chunks.push(String::from_utf8_lossy(chunk).into_owned());
                pos += len + 1;
            }
            RData::TXT(chunks)
        }
        DNSResourceType::OPT | DNSResourceType::Unknown(_) => RData::Unknown(raw.to_vec()),
    };
    Ok(rdata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::common::labels_from_name;

    fn roundtrip(resource: &DNSResource) -> DNSResource {
        let mut buf = Vec::new();
        let mut writer: BitWriter<&mut Vec<u8>, BigEndian> = BitWriter::new(&mut buf);
        resource.write(&mut writer).unwrap();
        drop(writer);
        let (parsed, next) = DNSResource::read(&buf, 0).unwrap();
        assert_eq!(next, buf.len());
        parsed
    }

    #[test]
    fn test_soa_keeps_all_fields() {
        let resource = DNSResource {
            labels: labels_from_name("steve.fi").unwrap(),
            rtype: DNSResourceType::SOA,
            rclass: DNSResourceClass::IN,
            ttl: 3600,
            rdata: RData::SOA(Soa {
                mname: labels_from_name("ns1.steve.fi").unwrap(),
                rname: labels_from_name("hostmaster.steve.fi").unwrap(),
                serial: 2024010101,
                refresh: 7200,
                retry: 900,
                expire: 1209600,
                minimum: 300,
            }),
        };
        assert_eq!(roundtrip(&resource), resource);
    }

    #[test]
    fn test_multi_chunk_txt() {
        let resource = DNSResource {
            labels: labels_from_name("steve.fi").unwrap(),
            rtype: DNSResourceType::TXT,
            rclass: DNSResourceClass::IN,
            ttl: 60,
            rdata: RData::TXT(vec!["v=spf1 -all".into(), "second".into()]),
        };
        assert_eq!(roundtrip(&resource), resource);
    }

    #[test]
    fn test_mx_with_compressed_exchange() {
        // owner "example.com" at 0, MX record whose exchange points back at it
        let mut packet = vec![7];
        packet.extend_from_slice(b"example");
        packet.push(3);
        packet.extend_from_slice(b"com");
        packet.push(0);
        let owner_len = packet.len();
        packet.extend_from_slice(&[0xC0, 0x00]); // owner: pointer to example.com
        packet.extend_from_slice(&[0, 15, 0, 1, 0, 0, 0, 60, 0, 4]);
        packet.extend_from_slice(&[0, 10, 0xC0, 0x00]);

        let (resource, next) = DNSResource::read(&packet, owner_len).unwrap();
        assert_eq!(next, packet.len());
        assert_eq!(resource.name(), "example.com.");
        assert_eq!(
            resource.rdata,
            RData::MX {
                preference: 10,
                exchange: vec!["example".into(), "com".into()],
            }
        );
    }

    #[test]
    fn test_bad_a_length() {
        let mut packet = vec![0];
        packet.extend_from_slice(&[0, 1, 0, 1, 0, 0, 0, 60, 0, 3, 1, 2, 3]);
        assert!(matches!(
            DNSResource::read(&packet, 0),
            Err(DnsError::InvalidRecordData { rtype: 1, .. })
        ));
    }

    #[test]
    fn test_unknown_type_is_opaque() {
        let mut packet = vec![0];
        packet.extend_from_slice(&[0, 33, 0, 1, 0, 0, 0, 60, 0, 2, 0xAB, 0xCD]);
        let (resource, _) = DNSResource::read(&packet, 0).unwrap();
        assert_eq!(resource.rtype, DNSResourceType::Unknown(33));
        assert_eq!(resource.rdata, RData::Unknown(vec![0xAB, 0xCD]));
    }
}
