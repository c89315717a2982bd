/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use byteorder::{ByteOrder, LittleEndian};

use std::io::Read;

use crate::consts::{DATE_TIME_TIMEZONE_OFFSET, DATE_TIME_YEAR_OFFSET, DEFAULT_BUFFER_LEN, FLOAT_SPECIAL_EXPONENT};
use crate::exi_error::{err_exit_code, ErrorKind, Result};
use crate::structs::exi_value::{DateTimeKind, ExiDateTime, ExiDecimal, ExiFloat};

const BITS_IN_BYTE: u8 = 8;

/// Cursor over a bit-packed (or byte-aligned) stream of bytes pulled on
/// demand from an upstream reader. Bits are consumed MSB-first within each
/// byte; an n-bit field may span byte boundaries.
///
/// In byte-aligned mode every n-bit field first skips to the next byte
/// boundary and then occupies whole bytes, little-endian by byte. All other
/// codecs are byte-layout agnostic and identical across modes.
pub struct BitReader<R> {
    buffer: Vec<u8>,
    buf_content: usize,
    byte_idx: usize,
    bit_in_byte: u8, // 0 = the next read takes the MSB of buffer[byte_idx]
    byte_aligned: bool,
    upstream_reader: R,
}

impl<R: Read> BitReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_buffer_len(reader, DEFAULT_BUFFER_LEN)
    }

    pub fn with_buffer_len(reader: R, buf_len: usize) -> Self {
        assert!(buf_len >= 16);
        BitReader {
            buffer: vec![0; buf_len],
            buf_content: 0,
            byte_idx: 0,
            bit_in_byte: 0,
            byte_aligned: false,
            upstream_reader: reader,
        }
    }

    pub fn set_byte_aligned(&mut self, aligned: bool) {
        self.byte_aligned = aligned;
    }

    /// Hands the still-unconsumed buffered bytes plus the upstream reader to
    /// `rewrap` and continues over whatever source it builds. The cursor must
    /// sit on a byte boundary.
    pub fn map_source<S: Read>(mut self, rewrap: impl FnOnce(Vec<u8>, R) -> S) -> BitReader<S> {
        debug_assert!(self.bit_in_byte == 0);
        let leftover = self.buffer[self.byte_idx..self.buf_content].to_vec();
        let byte_aligned = self.byte_aligned;
        let buf_len = self.buffer.len();
        self.buffer.clear();

        let mut r = BitReader::with_buffer_len(rewrap(leftover, self.upstream_reader), buf_len);
        r.byte_aligned = byte_aligned;
        r
    }

    /// Makes at least `wanted` bytes available starting at the current byte,
    /// preserving the partially consumed byte across the refill.
    #[cold]
    fn fill(&mut self, wanted: usize) -> Result<()> {
        debug_assert!(wanted <= self.buffer.len());

        self.buffer.copy_within(self.byte_idx..self.buf_content, 0);
        self.buf_content -= self.byte_idx;
        self.byte_idx = 0;

        while self.buf_content < wanted {
            let got = self.upstream_reader.read(&mut self.buffer[self.buf_content..])?;
            if got == 0 {
                return err_exit_code(ErrorKind::BufferEnd, "byte source exhausted mid-value");
            }
            self.buf_content += got;
        }
        Ok(())
    }

    #[inline(always)]
    fn ensure_bytes(&mut self, wanted: usize) -> Result<()> {
        if self.buf_content - self.byte_idx >= wanted {
            return Ok(());
        }
        self.fill(wanted)
    }

    #[inline(always)]
    fn advance_bits(&mut self, n: u8) {
        let pos = self.bit_in_byte + n;
        self.byte_idx += (pos / BITS_IN_BYTE) as usize;
        self.bit_in_byte = pos % BITS_IN_BYTE;
    }

    /// Reads a single raw bit, alignment-agnostic.
    #[inline(always)]
    pub fn read_bit(&mut self) -> Result<u32> {
        self.ensure_bytes(1)?;
        let bit = (self.buffer[self.byte_idx] >> (7 - self.bit_in_byte)) & 1;
        self.advance_bits(1);
        Ok(u32::from(bit))
    }

    /// Reads `n` raw bits MSB-first, crossing byte boundaries as needed.
    pub fn read_bits(&mut self, n: u8) -> Result<u32> {
        debug_assert!(n <= 32);
        if n == 0 {
            return Ok(0);
        }

        let bytes_spanned = (usize::from(n) + usize::from(self.bit_in_byte) + 7) / 8;
        self.ensure_bytes(bytes_spanned)?;

        let mut result = 0u32;
        let mut remaining = n;
        while remaining > 0 {
            let avail = BITS_IN_BYTE - self.bit_in_byte;
            let take = remaining.min(avail);
            let shift = avail - take;
            let mask = ((1u16 << take) - 1) as u8;
            let chunk = (self.buffer[self.byte_idx] >> shift) & mask;
            result = (result << take) | u32::from(chunk);
            self.advance_bits(take);
            remaining -= take;
        }

        Ok(result)
    }

    pub fn skip_to_byte_boundary(&mut self) {
        if self.bit_in_byte != 0 {
            self.byte_idx += 1;
            self.bit_in_byte = 0;
        }
    }

    /// n-bit unsigned integer per the format: direct bits when bit-packed,
    /// whole little-endian bytes when aligned.
    pub fn read_n_bits(&mut self, n: u8) -> Result<u32> {
        if !self.byte_aligned {
            return self.read_bits(n);
        }

        if n == 0 {
            return Ok(0);
        }
        self.skip_to_byte_boundary();
        let nbytes = (usize::from(n) + 7) / 8;
        self.ensure_bytes(nbytes)?;
        let v = LittleEndian::read_uint(&self.buffer[self.byte_idx..self.byte_idx + nbytes], nbytes);
        self.byte_idx += nbytes;
        Ok(v as u32)
    }

    /// Unsigned integer: 7 bits of magnitude per octet, continuation flag in
    /// the octet's MSB, least significant group first.
    pub fn read_unsigned_integer(&mut self) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let octet = self.read_bits(8)?;
            value |= u64::from(octet & 0x7F) << shift;
            if octet & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return err_exit_code(ErrorKind::InconsistentState, "unsigned integer wider than 64 bits");
            }
        }
    }

    /// Signed integer: sign in a single boolean field, magnitude follows.
    pub fn read_integer(&mut self) -> Result<i64> {
        let negative = self.read_boolean()?;
        let magnitude = self.read_unsigned_integer()?;
        if negative {
            if magnitude > i64::MAX as u64 {
                return err_exit_code(ErrorKind::InconsistentState, "integer out of range");
            }
            // negative zero is accepted and collapses to zero
            Ok(-(magnitude as i64))
        } else {
            if magnitude > i64::MAX as u64 {
                return err_exit_code(ErrorKind::InconsistentState, "integer out of range");
            }
            Ok(magnitude as i64)
        }
    }

    pub fn read_boolean(&mut self) -> Result<bool> {
        Ok(self.read_n_bits(1)? != 0)
    }

    pub fn read_decimal(&mut self) -> Result<ExiDecimal> {
        let negative = self.read_boolean()?;
        let integral = self.read_unsigned_integer()?;
        let fractional_reversed = self.read_unsigned_integer()?;
        Ok(ExiDecimal {
            negative,
            integral,
            fractional_reversed,
        })
    }

    pub fn read_float(&mut self) -> Result<ExiFloat> {
        let mantissa = self.read_integer()?;
        let exponent = self.read_integer()?;
        if exponent != FLOAT_SPECIAL_EXPONENT && (exponent < -16383 || exponent > 16383) {
            return err_exit_code(ErrorKind::InconsistentState, "float exponent out of range");
        }
        Ok(ExiFloat { mantissa, exponent: exponent as i32 })
    }

    /// Length-prefixed string of UCS code points.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_unsigned_integer()?;
        self.read_string_only(len as usize)
    }

    /// String content when the length (in code points) is already known.
    pub fn read_string_only(&mut self, code_points: usize) -> Result<String> {
        let mut s = String::with_capacity(code_points);
        for _ in 0..code_points {
            let cp = self.read_unsigned_integer()?;
            let ch = u32::try_from(cp)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InvalidExiInput, "invalid UCS code point"))?;
            s.push(ch);
        }
        Ok(s)
    }

    pub fn read_binary(&mut self) -> Result<Vec<u8>> {
        let len = self.read_unsigned_integer()? as usize;
        let mut bytes = Vec::with_capacity(len);
        for _ in 0..len {
            bytes.push(self.read_n_bits(8)? as u8);
        }
        Ok(bytes)
    }

    /// Date-time family: the fields present are fixed by the schema type,
    /// fractional seconds and timezone each announce themselves with a
    /// presence bit.
    pub fn read_date_time(&mut self, kind: DateTimeKind) -> Result<ExiDateTime> {
        let mut dt = ExiDateTime::new(kind);

        if kind.has_year() {
            dt.year = self.read_integer()? + DATE_TIME_YEAR_OFFSET;
        }
        if kind.has_month_day() {
            let month_day = self.read_n_bits(9)?;
            dt.month = (month_day / 32) as u8;
            dt.day = (month_day % 32) as u8;
            if dt.month > 12 || dt.day > 31 {
                return err_exit_code(ErrorKind::InconsistentState, "month-day out of range");
            }
        }
        if kind.has_time() {
            let time = self.read_n_bits(17)?;
            dt.hour = (time / 4096) as u8;
            dt.minute = ((time / 64) % 64) as u8;
            dt.second = (time % 64) as u8;
            if dt.hour > 24 {
                return err_exit_code(ErrorKind::InconsistentState, "time out of range");
            }
            if self.read_boolean()? {
                dt.fractional_secs = Some(self.read_unsigned_integer()?);
            }
        }
        if self.read_boolean()? {
            let biased = self.read_n_bits(11)?;
            dt.timezone_minutes = Some(biased as i32 - DATE_TIME_TIMEZONE_OFFSET as i32);
        }

        Ok(dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(bytes: &[u8]) -> BitReader<Cursor<Vec<u8>>> {
        BitReader::new(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn single_bits_msb_first() {
        let mut r = reader(&[0b1010_0000]);
        assert_eq!(r.read_bit().unwrap(), 1);
        assert_eq!(r.read_bit().unwrap(), 0);
        assert_eq!(r.read_bit().unwrap(), 1);
        assert_eq!(r.read_bit().unwrap(), 0);
    }

    #[test]
    fn n_bits_cross_byte_boundary() {
        // 12-bit value 0xABC spread over two bytes
        let mut r = reader(&[0xAB, 0xC0]);
        assert_eq!(r.read_bits(12).unwrap(), 0xABC);
    }

    #[test]
    fn aligned_n_bits_little_endian() {
        let mut r = reader(&[0x11, 0x22, 0x33]);
        r.set_byte_aligned(true);
        assert_eq!(r.read_n_bits(5).unwrap(), 0x11);
        assert_eq!(r.read_n_bits(16).unwrap(), 0x3322);
    }

    #[test]
    fn unsigned_integer_multi_octet() {
        // 128 = 0x80 0x01 in 7-bit little-endian groups
        let mut r = reader(&[0x80, 0x01]);
        assert_eq!(r.read_unsigned_integer().unwrap(), 128);

        let mut r = reader(&[0x00]);
        assert_eq!(r.read_unsigned_integer().unwrap(), 0);
    }

    #[test]
    fn starved_source_reports_buffer_end() {
        let mut r = reader(&[0xFF]);
        assert_eq!(r.read_bits(8).unwrap(), 0xFF);
        let err = r.read_bit().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BufferEnd);
    }

    #[test]
    fn negative_zero_decodes_as_zero() {
        // sign bit 1, magnitude 0
        let mut r = reader(&[0b1000_0000, 0]);
        assert_eq!(r.read_integer().unwrap(), 0);
    }
}
