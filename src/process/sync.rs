//! Frame boundary synchronization.
//!
//! Scans buffered stream data for the sync pattern, validates the header
//! behind it and delimits the frame span. The scanner consumes garbage it
//! has ruled out but leaves candidate bytes in place, so a sync word or
//! frame body split across input refills survives until more data arrives.

use std::collections::VecDeque;

use log::{debug, trace};

use crate::structs::header::{FrameHeader, SYNC_BYTE, SYNC_SECOND_MASK};
use crate::utils::errors::SyncError;

/// A located frame: its parsed header and the byte span it occupies at the
/// front of the buffer. Borrowed per driver iteration, never retained.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub header: FrameHeader,
}

/// Searches the buffer for the next complete frame.
///
/// On success the frame starts at the buffer front and spans
/// `header.frame_len` bytes. Ruled-out prefix bytes are consumed:
///
/// - [`SyncError::Lost`]: no sync pattern remains; everything except the
///   final byte is consumed (a pattern may straddle the refill boundary).
/// - [`SyncError::OutOfData`]: a pattern sits at the front but the header
///   or frame body is not fully buffered yet; nothing more is consumed.
/// - [`SyncError::Malformed`]: the pattern at the front has invalid header
///   fields. The caller must discard one byte before retrying so the same
///   position is never reused.
pub fn search(buffer: &mut VecDeque<u8>) -> Result<Candidate, SyncError> {
    let Some(offset) = find_sync(buffer) else {
        let keep = buffer.len().min(1);
        buffer.drain(..buffer.len() - keep);
        return Err(SyncError::Lost);
    };

    buffer.drain(..offset);

    if buffer.len() < 4 {
        return Err(SyncError::OutOfData);
    }

    let word = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
    let header = match FrameHeader::parse(word) {
        Ok(header) => header,
        Err(e) => {
            trace!("Rejected header {word:#010X}: {e}");
            return Err(SyncError::Malformed(e));
        }
    };

    if buffer.len() < header.frame_len {
        return Err(SyncError::OutOfData);
    }

    debug!(
        "Synchronized: {:?} {:?} {} Hz, {} bytes",
        header.layer, header.version, header.sample_rate, header.frame_len
    );

    Ok(Candidate { header })
}

fn find_sync(buffer: &VecDeque<u8>) -> Option<usize> {
    if buffer.len() < 2 {
        return None;
    }

    let mut prev = buffer[0];
    for (i, &byte) in buffer.iter().enumerate().skip(1) {
        if prev == SYNC_BYTE && byte & SYNC_SECOND_MASK == SYNC_SECOND_MASK {
            return Some(i - 1);
        }
        prev = byte;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::header::build_header;

    fn frame_bytes(header_word: u32) -> Vec<u8> {
        let header = FrameHeader::parse(header_word).unwrap();
        let mut bytes = header_word.to_be_bytes().to_vec();
        bytes.resize(header.frame_len, 0);
        bytes
    }

    #[test]
    fn locates_frame_after_garbage() {
        let word = build_header(3, 3, 1, 1, 2, 0, 3);
        let mut buffer: VecDeque<u8> = [0x00, 0x12, 0xFF, 0x00].into_iter().collect();
        buffer.extend(frame_bytes(word));

        let candidate = search(&mut buffer).unwrap();

        assert_eq!(candidate.header.frame_len, 48);
        assert_eq!(buffer.len(), 48);
        assert_eq!(buffer[0], 0xFF);
    }

    #[test]
    fn garbage_only_keeps_one_byte() {
        let mut buffer: VecDeque<u8> = vec![0x01; 300].into_iter().collect();

        assert!(matches!(search(&mut buffer), Err(SyncError::Lost)));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn trailing_sync_byte_survives_refill() {
        // 0xFF at the end may be the first byte of a sync pattern.
        let mut buffer: VecDeque<u8> = vec![0x01, 0x02, 0xFF].into_iter().collect();

        assert!(matches!(search(&mut buffer), Err(SyncError::Lost)));
        assert_eq!(buffer, VecDeque::from(vec![0xFF]));

        buffer.extend(frame_bytes(build_header(3, 3, 1, 1, 2, 0, 3)));
        // The stale 0xFF pairs with the frame's first byte into a false
        // sync whose header fields are invalid; discarding one byte per
        // the resync policy recovers the real frame.
        assert!(matches!(search(&mut buffer), Err(SyncError::Malformed(_))));
        buffer.pop_front();
        let candidate = search(&mut buffer).unwrap();
        assert_eq!(candidate.header.frame_len, 48);
    }

    #[test]
    fn incomplete_frame_reports_out_of_data() {
        let word = build_header(3, 3, 1, 1, 2, 0, 3);
        let full = frame_bytes(word);
        let mut buffer: VecDeque<u8> = full[..20].iter().copied().collect();

        assert!(matches!(search(&mut buffer), Err(SyncError::OutOfData)));
        assert_eq!(buffer.len(), 20);

        buffer.extend(full[20..].iter().copied());
        assert!(search(&mut buffer).is_ok());
    }

    #[test]
    fn malformed_header_is_flagged_not_consumed() {
        // Sync pattern followed by reserved bitrate index 15.
        let word = build_header(3, 1, 1, 15, 0, 0, 0);
        let mut buffer: VecDeque<u8> = word.to_be_bytes().into_iter().collect();
        buffer.extend([0u8; 16]);

        assert!(matches!(search(&mut buffer), Err(SyncError::Malformed(_))));
        assert_eq!(buffer[0], 0xFF);
    }

    #[test]
    fn header_fields_match_the_encoded_frame() {
        let word = build_header(3, 1, 1, 9, 0, 1, 0);
        let mut buffer: VecDeque<u8> = frame_bytes(word).into_iter().collect();

        let header = search(&mut buffer).unwrap().header;

        assert_eq!(header.bitrate, 128_000);
        assert_eq!(header.sample_rate, 44100);
        assert!(header.padding);
        assert_eq!(header.frame_len, 418);
        assert_eq!(header.frame_len, buffer.len());
    }
}
