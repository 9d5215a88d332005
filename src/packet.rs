use crate::constants::{HEADER_LEN, LENGTH_CONTINUATION_MASK, MAX_RX_PAYLOAD};

/// The 4-byte SHTP header carried in front of every packet.
///
/// Wire layout: little-endian 16-bit total length (header included, top bit
/// reserved as a continuation flag), channel byte, sequence byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShtpHeader {
    /// Total packet length in bytes, header included.
    pub length: u16,
    /// SHTP channel number (0-5).
    pub channel: u8,
    /// Per-channel send sequence number.
    pub sequence: u8,
}

impl ShtpHeader {
    /// Builds a header for a payload of `payload_len` bytes.
    pub fn new(channel: u8, sequence: u8, payload_len: usize) -> ShtpHeader {
        ShtpHeader {
            length: (payload_len + HEADER_LEN) as u16,
            channel,
            sequence,
        }
    }

    /// Serializes the header into its 4-byte wire form.
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let len = self.length.to_le_bytes();
        [len[0], len[1], self.channel, self.sequence]
    }

    /// Parses a header from its 4-byte wire form.
    pub fn from_bytes(bytes: &[u8; HEADER_LEN]) -> ShtpHeader {
        ShtpHeader {
            length: u16::from_le_bytes([bytes[0], bytes[1]]),
            channel: bytes[2],
            sequence: bytes[3],
        }
    }

    /// Payload length in bytes: the lower 15 bits of the length field (the
    /// top bit flags a continued packet) minus the header, clamped to zero.
    pub fn payload_len(self) -> usize {
        usize::from(self.length & LENGTH_CONTINUATION_MASK).saturating_sub(HEADER_LEN)
    }

    /// True when the length field carries no packet at all (bus idle reads
    /// return all-zero or all-ones headers).
    pub fn is_empty(self) -> bool {
        self.length & LENGTH_CONTINUATION_MASK == 0 || self.length == 0xFFFF
    }
}

/// One received SHTP packet, stored in the per-device buffer.
pub struct Packet {
    pub(crate) channel: u8,
    pub(crate) sequence: u8,
    pub(crate) len: usize,
    pub(crate) payload: [u8; MAX_RX_PAYLOAD],
}

impl Packet {
    pub(crate) const fn new() -> Packet {
        Packet {
            channel: 0,
            sequence: 0,
            len: 0,
            payload: [0; MAX_RX_PAYLOAD],
        }
    }

    /// Channel the packet arrived on.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Sequence number the device stamped on the packet.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// The payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len]
    }
}

/// Bounds-checked little-endian cursor over a received payload.
///
/// Every decode in this crate goes through this type so that short or
/// truncated packets surface as `None` instead of out-of-bounds reads.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> ByteReader<'a> {
        ByteReader { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn skip(&mut self, n: usize) -> Option<()> {
        if self.remaining() < n {
            return None;
        }
        self.pos += n;
        Some(())
    }

    pub(crate) fn read_u8(&mut self) -> Option<u8> {
        let b = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    pub(crate) fn read_u16_le(&mut self) -> Option<u16> {
        if self.remaining() < 2 {
            return None;
        }
        let v = u16::from_le_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        Some(v)
    }

    pub(crate) fn read_i16_le(&mut self) -> Option<i16> {
        self.read_u16_le().map(|v| v as i16)
    }

    pub(crate) fn read_u32_le(&mut self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        let lo = self.read_u16_le()?;
        let hi = self.read_u16_le()?;
        Some(u32::from(lo) | u32::from(hi) << 16)
    }
}
