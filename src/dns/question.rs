use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::{
    common::{PacketComponent, name_from_labels, read_name, slice_at},
    enums::{DNSResourceClass, DNSResourceType},
};
use crate::error::Result;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSQuestion {
    pub labels: Vec<String>,
    pub qtype: DNSResourceType,
    pub qclass: DNSResourceClass,
}

impl DNSQuestion {
    pub fn name(&self) -> String {
        name_from_labels(&self.labels)
    }
}

impl PacketComponent for DNSQuestion {
    fn write<E: Endianness>(&self, writer: &mut BitWriter<&mut Vec<u8>, E>) -> Result<()> {
        self.write_labels(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.qtype.into())?;
        writer.write_var::<u16>(16, self.qclass.into())?;
        Ok(())
    }

    fn read(packet: &[u8], offset: usize) -> Result<(Self, usize)> {
        let (labels, pos) = read_name(packet, offset)?;
        let mut reader = BitReader::<_, BigEndian>::new(slice_at(packet, pos, 4)?);
        let qtype = reader.read_var::<u16>(16)?.into();
        let qclass = reader.read_var::<u16>(16)?.into();
        Ok((
            DNSQuestion {
                labels,
                qtype,
                qclass,
            },
            pos + 4,
        ))
    }
}
