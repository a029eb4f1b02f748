//! Split-message framing used by calendar days, power-consumption history
//! and monitoring data.
//!
//! Each packet starts with a header byte: `0x80` marks the first packet and
//! bit `0x40` marks the last one. The remaining bytes are payload.

use crate::characteristics::Field;
use crate::error::{EnstoError, Result};

pub const FIRST_PACKET: u8 = 0x80;
pub const LAST_PACKET: u8 = 0x40;

const MAX_MESSAGE_SIZE: usize = 1024;
/// Payload bytes per packet when emitting notifications-sized chunks.
pub const MAX_PACKET_PAYLOAD: usize = 19;

#[derive(Debug)]
pub struct SplitReassembler {
    field: Field,
    message: Vec<u8>,
    packets: usize,
    complete: bool,
}

impl SplitReassembler {
    pub fn new(field: Field) -> Self {
        Self {
            field,
            message: Vec::new(),
            packets: 0,
            complete: false,
        }
    }

    /// Adds one packet. Returns `true` once the last packet has been seen.
    pub fn push(&mut self, packet: &[u8]) -> Result<bool> {
        if self.complete {
            return Err(EnstoError::malformed(self.field, "packet after the last one"));
        }
        let Some((&header, payload)) = packet.split_first() else {
            return Err(EnstoError::malformed(self.field, "empty packet"));
        };
        if self.packets == 0 && header & FIRST_PACKET == 0 {
            return Err(EnstoError::malformed(
                self.field,
                format!("first packet header {header:#04x} lacks the start bit"),
            ));
        }
        if self.message.len() + payload.len() > MAX_MESSAGE_SIZE {
            return Err(EnstoError::malformed(
                self.field,
                format!("message larger than {MAX_MESSAGE_SIZE} bytes"),
            ));
        }

        self.message.extend_from_slice(payload);
        self.packets += 1;
        self.complete = header & LAST_PACKET != 0;
        Ok(self.complete)
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        if !self.complete {
            return Err(EnstoError::malformed(self.field, "message ended early"));
        }
        Ok(self.message)
    }
}

/// Two-packet form the device expects when a split field is written.
pub fn split_for_write(payload: &[u8]) -> Vec<Vec<u8>> {
    let middle = payload.len().div_ceil(2);
    let (head, tail) = payload.split_at(middle);

    let mut first = Vec::with_capacity(head.len() + 1);
    first.push(FIRST_PACKET);
    first.extend_from_slice(head);

    let mut last = Vec::with_capacity(tail.len() + 1);
    last.push(LAST_PACKET);
    last.extend_from_slice(tail);

    vec![first, last]
}

/// Chunks a payload into headed packets of at most `MAX_PACKET_PAYLOAD`
/// bytes, the way the device answers reads of split fields.
pub fn split_for_read(payload: &[u8]) -> Vec<Vec<u8>> {
    let chunks: Vec<&[u8]> = if payload.is_empty() {
        vec![&payload[..0]]
    } else {
        payload.chunks(MAX_PACKET_PAYLOAD).collect()
    };
    let count = chunks.len();

    chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| {
            let mut header = 0;
            if index == 0 {
                header |= FIRST_PACKET;
            }
            if index + 1 == count {
                header |= LAST_PACKET;
            }
            let mut packet = Vec::with_capacity(chunk.len() + 1);
            packet.push(header);
            packet.extend_from_slice(chunk);
            packet
        })
        .collect()
}

/// Joins the packets of a complete message.
pub fn reassemble(field: Field, packets: &[Vec<u8>]) -> Result<Vec<u8>> {
    let mut reassembler = SplitReassembler::new(field);
    for packet in packets {
        reassembler.push(packet)?;
    }
    reassembler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_form_has_start_and_end_headers() {
        let payload: Vec<u8> = (0..49).collect();
        let packets = split_for_write(&payload);

        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0][0], FIRST_PACKET);
        assert_eq!(packets[1][0], LAST_PACKET);
        assert_eq!(packets[0].len() - 1 + packets[1].len() - 1, 49);
        assert_eq!(reassemble(Field::CalendarDay, &packets).unwrap(), payload);
    }

    #[test]
    fn read_chunks_reassemble_in_order() {
        let payload: Vec<u8> = (0..54).collect();
        let packets = split_for_read(&payload);

        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0][0], FIRST_PACKET);
        assert_eq!(packets[1][0], 0);
        assert_eq!(packets[2][0], LAST_PACKET);
        assert_eq!(reassemble(Field::PowerConsumption, &packets).unwrap(), payload);
    }

    #[test]
    fn single_packet_carries_both_bits() {
        let packets = split_for_read(&[1, 2, 3]);
        assert_eq!(packets, vec![vec![FIRST_PACKET | LAST_PACKET, 1, 2, 3]]);
    }

    #[test]
    fn rejects_missing_start_bit_and_trailing_packets() {
        let mut reassembler = SplitReassembler::new(Field::CalendarDay);
        assert!(reassembler.push(&[0x00, 1]).is_err());

        let mut reassembler = SplitReassembler::new(Field::CalendarDay);
        assert_eq!(reassembler.push(&[0xc0, 1]), Ok(true));
        assert!(reassembler.push(&[0x40, 2]).is_err());
    }

    #[test]
    fn incomplete_message_fails() {
        let mut reassembler = SplitReassembler::new(Field::CalendarDay);
        assert_eq!(reassembler.push(&[FIRST_PACKET, 1, 2]), Ok(false));
        assert!(!reassembler.is_complete());
        assert!(reassembler.finish().is_err());
    }

    #[test]
    fn oversized_message_is_rejected() {
        let mut reassembler = SplitReassembler::new(Field::PowerConsumption);
        let mut packet = vec![FIRST_PACKET];
        packet.extend(std::iter::repeat(0u8).take(MAX_MESSAGE_SIZE + 1));
        assert!(reassembler.push(&packet).unwrap_err().is_malformed());
    }
}
