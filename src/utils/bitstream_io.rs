//! Bitstream I/O utilities for audio parsing.
//!
//! Provides bitstream reading, cursor-preserving peeks and CRC validation
//! over bit ranges for frame parsing.

use std::io;
use std::io::SeekFrom;

use bitstream_io::{BigEndian, BitRead, BitReader, UnsignedInteger};

use crate::utils::crc::Crc16;

const STACK_BUF_SIZE: usize = 256;

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read + io::Seek> {
    bs: BitReader<R, BigEndian>,
    len: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<R> BitstreamIoReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        match self.bs.read_unsigned_var(n) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                // Only call position() on error path to avoid overhead
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "get_n({}): out of bounds bits at {}",
                        n,
                        self.bs.position_in_bits().unwrap_or(0)
                    ),
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Reads `n` bits without advancing the cursor.
    #[inline(always)]
    pub fn peek_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        let position = self.bs.position_in_bits()?;
        let value = self.get_n(n);
        self.bs.seek_bits(SeekFrom::Start(position))?;

        value
    }

    #[inline(always)]
    pub fn seek(&mut self, offset: i64) -> io::Result<u64> {
        if (offset < 0 && self.position()? as i64 + offset >= 0)
            || (offset >= 0 && self.available()? as i64 >= offset)
        {
            return self.bs.seek_bits(SeekFrom::Current(offset));
        }

        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "seek({}): out of bounds bits at {}",
                offset,
                self.position()?
            ),
        ))
    }

    /// Runs a CRC-16 over the bit range `[start, start + len)` and returns the
    /// checksum. The cursor is restored afterwards.
    #[inline(always)]
    pub fn crc16_check(&mut self, crc: &Crc16, start: u64, len: u64) -> io::Result<u16> {
        let position = self.position()?;

        if start + len > self.len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "crc16_check: out of bounds bits",
            ));
        }

        self.bs.seek_bits(SeekFrom::Start(start))?;

        let mut checksum = crc.init;

        let prefix_len = start & 7;
        let suffix_len = (len - prefix_len) & 7;
        let middle_len = (len - prefix_len - suffix_len) as usize;

        if prefix_len != 0 {
            let prefix: u16 = self.bs.read_var(prefix_len as u32)?;
            checksum = crc.update_bits(checksum, prefix, prefix_len as usize);
        }

        let bytes_len = middle_len >> 3;
        if bytes_len <= STACK_BUF_SIZE {
            let mut stack_buf = [0u8; STACK_BUF_SIZE];
            let buf = &mut stack_buf[..bytes_len];
            self.bs.read_bytes(buf)?;
            checksum = crc.update(checksum, buf);
        } else {
            let mut heap_buf = vec![0; bytes_len];
            self.bs.read_bytes(&mut heap_buf)?;
            checksum = crc.update(checksum, &heap_buf);
        };

        if suffix_len != 0 {
            let suffix: u16 = self.bs.read_var(suffix_len as u32)?;
            checksum = crc.update_bits(checksum, suffix, suffix_len as usize);
        }

        self.bs.seek_bits(SeekFrom::Start(position))?;

        Ok(checksum)
    }

    #[inline(always)]
    pub fn align_byte(&mut self) {
        self.bs.byte_align();
    }

    #[inline(always)]
    pub fn available(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits().map(|pos| self.len - pos)
    }

    #[inline(always)]
    pub fn skip_n(&mut self, n: u32) -> io::Result<()> {
        // Skip bounds check for small skips - bitstream_io handles EOF internally
        if n <= 64 {
            self.bs.skip(n)
        } else {
            // For larger skips, keep bounds check
            self.available().and_then(|avail| {
                if n as u64 > avail {
                    Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "skip_n: out of bounds bits",
                    ))
                } else {
                    self.bs.skip(n)
                }
            })
        }
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        let len = buf.len() as u64;
        let read = io::Cursor::new(buf);

        Self::new(read, len)
    }
}

impl Default for BsIoSliceReader<'_> {
    fn default() -> Self {
        Self::from_slice(&[])
    }
}

#[test]
fn read_peek_skip() -> io::Result<()> {
    let mut reader = BsIoSliceReader::from_slice(&[0b1011_0011, 0b1100_0001]);

    assert_eq!(reader.get_n::<u32>(3)?, 0b101);
    assert_eq!(reader.peek_n::<u32>(4)?, 0b1001);
    assert_eq!(reader.get_n::<u32>(4)?, 0b1001);
    assert!(reader.get()?);
    reader.skip_n(2)?;
    assert_eq!(reader.available()?, 6);
    assert_eq!(reader.get_n::<u32>(6)?, 0b000001);

    assert!(reader.get().is_err());
    Ok(())
}

#[test]
fn out_of_bounds_reads() {
    let mut reader = BsIoSliceReader::from_slice(&[0xFF]);

    assert_eq!(reader.get_n::<u32>(8).unwrap(), 0xFF);
    assert!(reader.get_n::<u32>(1).is_err());
}
