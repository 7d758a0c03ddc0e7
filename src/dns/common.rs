use bitstream_io::{BitWrite, BitWriter, Endianness};

use crate::error::{DnsError, Result};

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_LABEL_LEN: usize = 63;
const MAX_POINTER_HOPS: usize = 16;

pub trait PacketComponent: Sized {
    fn write<E: Endianness>(&self, writer: &mut BitWriter<&mut Vec<u8>, E>) -> Result<()>;

    /// Decode the component starting at `offset` of the full packet, returning
    /// it together with the offset of the first byte after it.
    fn read(packet: &[u8], offset: usize) -> Result<(Self, usize)>;

    fn write_labels<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
        labels: &[String],
    ) -> Result<()> {
        write_name(writer, labels)
    }
}

/// Borrow `len` bytes at `offset`, failing if the packet is too short
pub fn slice_at(packet: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset + len;
    packet.get(offset..end).ok_or(DnsError::Truncated {
        need: end,
        have: packet.len(),
    })
}

/// Read a domain name at `offset`, following compression pointers.
///
/// The returned offset is the position right after the name as it appears
/// at `offset`, i.e. after the first pointer when the name is compressed.
pub fn read_name(packet: &[u8], offset: usize) -> Result<(Vec<String>, usize)> {
    let mut labels = Vec::new();
    let mut pos = offset;
    let mut resume_at = None;
    let mut hops = 0;
    let mut wire_len = 1;

    loop {
        let len = slice_at(packet, pos, 1)?[0] as usize;
        match len & 0xC0 {
            0xC0 => {
                let low = slice_at(packet, pos + 1, 1)?[0] as usize;
                let target = ((len & 0x3F) << 8) | low;
                if resume_at.is_none() {
                    resume_at = Some(pos + 2);
                }
                hops += 1;
                // Pointers may only refer to earlier data
                if hops > MAX_POINTER_HOPS || target >= pos {
                    return Err(DnsError::BadPointer(pos));
                }
                pos = target;
            }
            0x00 if len == 0 => {
                return Ok((labels, resume_at.unwrap_or(pos + 1)));
            }
            0x00 => {
                let bytes = slice_at(packet, pos + 1, len)?;
                wire_len += len + 1;
                if wire_len > MAX_NAME_LEN {
                    return Err(DnsError::NameTooLong);
                }
                labels.push(String::from_utf8_lossy(bytes).into_owned());
                pos += len + 1;
            }
            _ => return Err(DnsError::InvalidLabel),
        }
    }
}

/// Write labels uncompressed, terminated by the root label
pub fn write_name<E: Endianness>(
    writer: &mut BitWriter<&mut Vec<u8>, E>,
    labels: &[String],
) -> Result<()> {
    for label in labels {
        writer.write_var::<u8>(8, label.len() as u8)?;
        writer.write_bytes(label.as_bytes())?;
    }
    writer.write_var::<u8>(8, 0)?;
    Ok(())
}

/// Split a presentation-format name into validated wire labels.
///
/// A trailing dot is accepted and the root name is `.` or the empty string.
pub fn labels_from_name(name: &str) -> Result<Vec<String>> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let mut wire_len = 1;
    let mut labels = Vec::new();
    for label in trimmed.split('.') {
        if label.is_empty() {
            return Err(DnsError::InvalidLabel);
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(DnsError::LabelTooLong(label.len()));
        }
        wire_len += label.len() + 1;
        if wire_len > MAX_NAME_LEN {
            return Err(DnsError::NameTooLong);
        }
        labels.push(label.to_string());
    }
    Ok(labels)
}

/// Render labels as a fully-qualified name with a trailing dot
pub fn name_from_labels(labels: &[String]) -> String {
    if labels.is_empty() {
        return ".".to_string();
    }
    let mut name = labels.join(".");
    name.push('.');
    name
}

/// Append the root dot unless the name already ends with one
pub fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}
