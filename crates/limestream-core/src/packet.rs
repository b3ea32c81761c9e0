//! Sample packet codec for the bulk data path.
//!
//! Each bulk transfer carries one channel's run of IQ samples behind a fixed
//! 16-byte little-endian header. This module is a pure encoder/parser with no
//! I/O dependencies; transports use [`parse_header`] and
//! [`PacketHeader::encoded_len`] to delimit packets on
//! byte-stream links and the streaming workers use [`encode_packet`] /
//! [`parse_packet`] for the payload.
//!
//! # Packet format
//!
//! ```text
//! offset  size  field
//!      0     1  flags         bit 0: timestamp valid (synchronized mode)
//!      1     1  channel       channel index
//!      2     2  sample_count  number of IQ samples in the payload
//!      4     4  sequence      per-channel rolling packet counter
//!      8     8  timestamp     device tick of the first sample
//!     16   4*n  payload       n x (I: i16, Q: i16)
//! ```
//!
//! The largest packet is 4096 bytes, i.e. [`MAX_SAMPLES_PER_PACKET`] samples.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

/// Header size in bytes.
pub const HEADER_SIZE: usize = 16;

/// Largest encoded packet in bytes.
pub const MAX_PACKET_SIZE: usize = 4096;

/// Bytes per IQ sample on the wire (two little-endian `i16`).
pub const BYTES_PER_SAMPLE: usize = 4;

/// Most IQ samples a single packet can carry.
pub const MAX_SAMPLES_PER_PACKET: usize = (MAX_PACKET_SIZE - HEADER_SIZE) / BYTES_PER_SAMPLE;

/// Flag bit: the timestamp field is meaningful.
pub const FLAG_TIMESTAMP_VALID: u8 = 0x01;

/// Parsed packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Whether the timestamp was stamped in synchronized mode.
    pub timestamp_valid: bool,
    /// Channel index.
    pub channel: u8,
    /// Number of IQ samples in the payload.
    pub sample_count: u16,
    /// Rolling packet counter.
    pub sequence: u32,
    /// Device tick of the first sample.
    pub timestamp: u64,
}

impl PacketHeader {
    /// Bytes occupied by the packet this header introduces.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.sample_count as usize * BYTES_PER_SAMPLE
    }
}

/// A parsed packet: header plus a reference to the payload bytes.
#[derive(Debug, PartialEq)]
pub struct SamplePacket<'a> {
    /// The parsed 16-byte header.
    pub header: PacketHeader,
    /// Payload bytes after the header, exactly `sample_count * 4` long.
    pub payload: &'a [u8],
}

impl SamplePacket<'_> {
    /// Decode the payload into interleaved `i16` components.
    pub fn iq(&self) -> Vec<i16> {
        self.payload
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }

    /// Decode the payload, appending components to `out`.
    pub fn extend_iq(&self, out: &mut Vec<i16>) {
        out.reserve(self.payload.len() / 2);
        out.extend(
            self.payload
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]])),
        );
    }
}

/// Encode one packet.
///
/// `iq` holds interleaved components; a trailing unpaired component is
/// ignored. Fails if the run exceeds [`MAX_SAMPLES_PER_PACKET`].
pub fn encode_packet(header: &PacketHeader, iq: &[i16]) -> Result<Vec<u8>> {
    let samples = iq.len() / 2;
    if samples > MAX_SAMPLES_PER_PACKET {
        return Err(Error::Protocol(format!(
            "{samples} samples exceed packet limit of {MAX_SAMPLES_PER_PACKET}"
        )));
    }
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + samples * BYTES_PER_SAMPLE);
    let flags = if header.timestamp_valid {
        FLAG_TIMESTAMP_VALID
    } else {
        0
    };
    buf.put_u8(flags);
    buf.put_u8(header.channel);
    buf.put_u16_le(samples as u16);
    buf.put_u32_le(header.sequence);
    buf.put_u64_le(header.timestamp);
    for v in &iq[..samples * 2] {
        buf.put_i16_le(*v);
    }
    Ok(buf.to_vec())
}

/// Parse the header fields without touching the payload.
pub fn parse_header(data: &[u8]) -> Result<PacketHeader> {
    if data.len() < HEADER_SIZE {
        return Err(Error::Protocol(format!(
            "sample packet too short: {} bytes, minimum is {}",
            data.len(),
            HEADER_SIZE
        )));
    }
    let flags = data[0];
    let channel = data[1];
    let sample_count = u16::from_le_bytes([data[2], data[3]]);
    let sequence = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    let timestamp = u64::from_le_bytes([
        data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
    ]);

    if flags & !FLAG_TIMESTAMP_VALID != 0 {
        return Err(Error::Protocol(format!(
            "reserved flag bits set: {flags:#04x}"
        )));
    }
    if sample_count as usize > MAX_SAMPLES_PER_PACKET {
        return Err(Error::Protocol(format!(
            "sample_count {sample_count} exceeds packet limit of {MAX_SAMPLES_PER_PACKET}"
        )));
    }

    Ok(PacketHeader {
        timestamp_valid: flags & FLAG_TIMESTAMP_VALID != 0,
        channel,
        sample_count,
        sequence,
        timestamp,
    })
}

/// Parse a packet from a raw bulk transfer.
///
/// The declared sample count is validated against the buffer length. Bytes
/// after the declared payload are ignored (USB transfers may be padded).
pub fn parse_packet(data: &[u8]) -> Result<SamplePacket<'_>> {
    let header = parse_header(data)?;
    let end = header.encoded_len();
    if end > data.len() {
        return Err(Error::Protocol(format!(
            "declared payload ({} samples = {} bytes) exceeds buffer length ({} bytes)",
            header.sample_count,
            end,
            data.len()
        )));
    }
    Ok(SamplePacket {
        header,
        payload: &data[HEADER_SIZE..end],
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
