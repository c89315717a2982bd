/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use log::warn;

use std::io::{Read, Write};

use crate::consts::*;
use crate::exi_error::{err_exit_code, ErrorKind, Result};
use crate::options::{Alignment, DatatypeRepresentation, ExiOptions, SchemaIdMode};
use crate::structs::bit_reader::BitReader;
use crate::structs::bit_writer::BitWriter;

/// Namespace of the options document vocabulary
pub const URI_EXI_OPTIONS: &str = "http://www.w3.org/2009/exi";

/// The decoded stream preamble.
#[derive(Debug, Clone, Default)]
pub struct ExiHeader {
    pub has_cookie: bool,
    pub opts: ExiOptions,
    /// True when the options were present in the header bits rather than
    /// supplied out of band
    pub opts_in_header: bool,
}

/// Writes cookie (optional), distinguishing bits, presence flag, version
/// and, when the options differ from the defaults, the options document.
/// Ends aligned to a byte boundary whenever the body needs one.
pub fn encode_header<W: Write>(writer: &mut BitWriter<W>, header: &ExiHeader) -> Result<()> {
    if header.has_cookie {
        for b in EXI_COOKIE {
            writer.write_bits(u32::from(b), 8)?;
        }
    }

    writer.write_bits(EXI_DISTINGUISHING_BITS, 2)?;

    let with_options = header.opts_in_header && !header.opts.is_default();
    writer.write_bit(u32::from(with_options))?;

    encode_version(writer, EXI_FORMAT_VERSION)?;

    if with_options {
        encode_options_document(writer, &header.opts)?;
    }

    if header.opts.byte_aligned() {
        writer.pad_to_byte_boundary()?;
    }
    Ok(())
}

/// Reads the preamble. `out_of_band` supplies the options when the header
/// carries none (callers that agreed on options outside the stream).
pub fn decode_header<R: Read>(reader: &mut BitReader<R>, out_of_band: Option<&ExiOptions>) -> Result<ExiHeader> {
    let mut header = ExiHeader::default();

    let first = reader.read_bits(2)?;
    if first == 0b00 {
        // could be the "$EXI" cookie; '$' starts with two zero bits
        let rest = reader.read_bits(6)?;
        if (first << 6 | rest) as u8 != EXI_COOKIE[0] {
            return err_exit_code(ErrorKind::HeaderMismatch, "stream is neither cookie nor EXI header");
        }
        for expected in &EXI_COOKIE[1..] {
            if reader.read_bits(8)? as u8 != *expected {
                return err_exit_code(ErrorKind::HeaderMismatch, "corrupted stream cookie");
            }
        }
        header.has_cookie = true;
        if reader.read_bits(2)? != EXI_DISTINGUISHING_BITS {
            return err_exit_code(ErrorKind::HeaderMismatch, "missing distinguishing bits after cookie");
        }
    } else if first != EXI_DISTINGUISHING_BITS {
        return err_exit_code(ErrorKind::HeaderMismatch, "missing distinguishing bits");
    }

    let with_options = reader.read_bit()? != 0;

    let version = decode_version(reader)?;
    if version != EXI_FORMAT_VERSION {
        return err_exit_code(ErrorKind::UnsupportedOption, "unsupported format version");
    }

    if with_options {
        header.opts = decode_options_document(reader)?;
        header.opts_in_header = true;
        if out_of_band.is_some() {
            warn!("out-of-band options ignored: the header carries its own");
        }
    } else if let Some(opts) = out_of_band {
        header.opts = opts.clone();
    }

    if header.opts.byte_aligned() {
        reader.skip_to_byte_boundary();
    }
    Ok(header)
}

/// Version field: a preview flag, then 4-bit chunks summed until a chunk
/// below 15; the version is the sum plus one.
fn encode_version<W: Write>(writer: &mut BitWriter<W>, version: u32) -> Result<()> {
    writer.write_bit(0)?; // final, not preview
    let mut remaining = version - 1;
    loop {
        let chunk = remaining.min(15);
        writer.write_bits(chunk, 4)?;
        if chunk < 15 {
            return Ok(());
        }
        remaining -= 15;
    }
}

fn decode_version<R: Read>(reader: &mut BitReader<R>) -> Result<u32> {
    let preview = reader.read_bit()?;
    if preview != 0 {
        return err_exit_code(ErrorKind::UnsupportedOption, "preview format versions are not supported");
    }
    let mut version = 1u32;
    loop {
        let chunk = reader.read_bits(4)?;
        version += chunk;
        if chunk < 15 {
            return Ok(version);
        }
    }
}

/*
 * The options document is a tiny EXI body over the hard-coded options
 * vocabulary, always bit-packed and strict. The field widths below are the
 * event-code widths of the compiled options grammar:
 *
 *   header      := lesscommon? common? strict?           (2/2/1 bits)
 *   lesscommon  := uncommon? preserve? blockSize?        (2/2/1 bits)
 *   uncommon    := alignment? selfContained? valueMaxLength?
 *                  valuePartitionCapacity? dtrm*         (3/3/2/2/1 bits)
 *   alignment   := byte | pre-compress                   (1 bit)
 *   preserve    := dtd? prefixes? lexicalValues? comments? pis?
 *                                                        (3/3/2/2/1 bits)
 *   common      := compression? fragment? schemaId?      (2/2/1 bits)
 *   schemaId    := nillable string                       (1 bit + content)
 */

fn encode_options_document<W: Write>(writer: &mut BitWriter<W>, opts: &ExiOptions) -> Result<()> {
    let lesscommon = !matches!(opts.alignment, Alignment::BitPacked)
        || opts.self_contained
        || opts.value_max_length != INDEX_MAX
        || opts.value_partition_capacity != INDEX_MAX
        || !opts.datatype_representation_map.is_empty()
        || opts.preserve.any()
        || opts.block_size != 1_000_000;
    let common = opts.compression || opts.fragment || !matches!(opts.schema_id, SchemaIdMode::Absent);

    // header rule 0: lesscommon 0, common 1, strict 2, EE 3
    if lesscommon {
        writer.write_bits(0, 2)?;
        encode_lesscommon(writer, opts)?;
    }
    if common {
        writer.write_bits(if lesscommon { 0 } else { 1 }, 2)?;
        encode_common(writer, opts)?;
    }
    if opts.strict {
        match (lesscommon, common) {
            (_, true) => writer.write_bits(0, 1)?,         // after common
            (true, false) => writer.write_bits(1, 2)?,     // after lesscommon
            (false, false) => writer.write_bits(2, 2)?,    // at rule 0
        }
    } else {
        // EE from whichever rule we are in
        match (lesscommon, common) {
            (_, true) => writer.write_bits(1, 1)?,
            (true, false) => writer.write_bits(2, 2)?,
            (false, false) => writer.write_bits(3, 2)?,
        }
    }
    // after strict only EE remains, zero bits
    Ok(())
}

fn encode_lesscommon<W: Write>(writer: &mut BitWriter<W>, opts: &ExiOptions) -> Result<()> {
    let uncommon = !matches!(opts.alignment, Alignment::BitPacked)
        || opts.self_contained
        || opts.value_max_length != INDEX_MAX
        || opts.value_partition_capacity != INDEX_MAX
        || !opts.datatype_representation_map.is_empty();
    let preserve = opts.preserve.any();
    let block_size = opts.block_size != 1_000_000;

    if uncommon {
        writer.write_bits(0, 2)?;
        encode_uncommon(writer, opts)?;
    }
    if preserve {
        writer.write_bits(if uncommon { 0 } else { 1 }, 2)?;
        encode_preserve(writer, opts)?;
    }
    if block_size {
        match (uncommon, preserve) {
            (_, true) => writer.write_bits(0, 1)?,
            (true, false) => writer.write_bits(1, 2)?,
            (false, false) => writer.write_bits(2, 2)?,
        }
        // blockSize content: a single unsignedInt chardata, zero-bit codes
        writer.write_unsigned_integer(opts.block_size as u64)?;
    }
    // EE of lesscommon
    match (uncommon, preserve, block_size) {
        (_, _, true) => {}                                  // after blockSize: EE is zero bits
        (_, true, false) => writer.write_bits(1, 1)?,
        (true, false, false) => writer.write_bits(2, 2)?,
        (false, false, false) => writer.write_bits(3, 2)?,
    }
    Ok(())
}

fn encode_uncommon<W: Write>(writer: &mut BitWriter<W>, opts: &ExiOptions) -> Result<()> {
    // state: which rule of `uncommon` we sit in (0..=4)
    let mut state = 0u8;
    let widths = [3u8, 3, 2, 2, 1];

    if !matches!(opts.alignment, Alignment::BitPacked) && !opts.compression {
        writer.write_bits(0, widths[0])?;
        // alignment := byte | pre-compress, then EE of alignment
        match opts.alignment {
            Alignment::ByteAligned => writer.write_bits(0, 1)?,
            Alignment::PreCompression => writer.write_bits(1, 1)?,
            Alignment::BitPacked => unreachable!(),
        }
        state = 1;
    }
    if opts.self_contained {
        // selfContained is an empty element; its EE costs no bits
        writer.write_bits(u32::from(1 - state), widths[usize::from(state)])?;
        state = 2;
    }
    if opts.value_max_length != INDEX_MAX {
        let code = [2u32, 1, 0][usize::from(state.min(2))];
        writer.write_bits(code, widths[usize::from(state)])?;
        writer.write_unsigned_integer(opts.value_max_length as u64)?;
        state = 3;
    }
    if opts.value_partition_capacity != INDEX_MAX {
        let code = [3u32, 2, 1, 0][usize::from(state.min(3))];
        writer.write_bits(code, widths[usize::from(state)])?;
        writer.write_unsigned_integer(opts.value_partition_capacity as u64)?;
        state = 4;
    }
    for map in &opts.datatype_representation_map {
        let code = [4u32, 3, 2, 1, 0][usize::from(state)];
        writer.write_bits(code, widths[usize::from(state)])?;
        encode_dtrm_entry(writer, map)?;
        state = 4;
    }
    // EE of uncommon
    let code = [5u32, 4, 3, 2, 1][usize::from(state)];
    writer.write_bits(code, widths[usize::from(state)])?;
    Ok(())
}

fn encode_preserve<W: Write>(writer: &mut BitWriter<W>, opts: &ExiOptions) -> Result<()> {
    let mut state = 0u8;
    let widths = [3u8, 3, 2, 2, 1];
    let flags = [
        opts.preserve.dtd,
        opts.preserve.prefixes,
        opts.preserve.lexical_values,
        opts.preserve.comments,
        opts.preserve.pis,
    ];
    for (i, &set) in flags.iter().enumerate() {
        if set {
            let code = (i as u32) - u32::from(state);
            writer.write_bits(code, widths[usize::from(state)])?;
            state = i as u8 + 1;
        }
    }
    if state < 5 {
        let ee_code = [5u32, 4, 3, 2, 1][usize::from(state)];
        writer.write_bits(ee_code, widths[usize::from(state)])?;
    }
    Ok(())
}

fn encode_common<W: Write>(writer: &mut BitWriter<W>, opts: &ExiOptions) -> Result<()> {
    let mut state = 0u8;
    let widths = [2u8, 2, 1];

    if opts.compression {
        writer.write_bits(0, widths[0])?;
        state = 1;
    }
    if opts.fragment {
        writer.write_bits(u32::from(1 - state), widths[usize::from(state)])?;
        state = 2;
    }
    match &opts.schema_id {
        SchemaIdMode::Absent => {
            // EE of common
            let ee_code = [3u32, 2, 1][usize::from(state)];
            writer.write_bits(ee_code, widths[usize::from(state)])?;
        }
        mode => {
            let code = [2u32, 1, 0][usize::from(state)];
            writer.write_bits(code, widths[usize::from(state)])?;
            // schemaId rule 0: CH 0, AT(xsi:nil) 1.0
            match mode {
                SchemaIdMode::Nil => {
                    writer.write_bits(1, 1)?; // escape into part two
                    writer.write_boolean(true)?;
                }
                SchemaIdMode::Empty => {
                    writer.write_bits(0, 1)?;
                    write_miss_string(writer, "")?;
                }
                SchemaIdMode::Set(id) => {
                    writer.write_bits(0, 1)?;
                    write_miss_string(writer, id)?;
                }
                SchemaIdMode::Absent => unreachable!(),
            }
            // EE of schemaId and EE of common are both zero bits here
        }
    }
    Ok(())
}

fn encode_dtrm_entry<W: Write>(writer: &mut BitWriter<W>, map: &DatatypeRepresentation) -> Result<()> {
    // two wildcard children, each SE(*) with a qname and empty content;
    // the options stream has its own fresh partitions, so both qnames miss
    write_miss_qname(writer, &map.type_uri, &map.type_ln)?;
    write_miss_qname(writer, &map.representation_uri, &map.representation_ln)?;
    Ok(())
}

/// A value string that cannot hit any partition in the fresh options
/// stream: always length+2 then the code points.
fn write_miss_string<W: Write>(writer: &mut BitWriter<W>, s: &str) -> Result<()> {
    writer.write_unsigned_integer(s.chars().count() as u64 + 2)?;
    writer.write_string_only(s)
}

fn write_miss_qname<W: Write>(writer: &mut BitWriter<W>, uri: &str, ln: &str) -> Result<()> {
    // uri partition of the options stream: 4 initial entries + options ns
    writer.write_bits(0, 3)?; // miss
    writer.write_string(uri)?;
    writer.write_unsigned_integer(ln.chars().count() as u64 + 1)?;
    writer.write_string_only(ln)
}

fn decode_options_document<R: Read>(reader: &mut BitReader<R>) -> Result<ExiOptions> {
    let mut opts = ExiOptions::default();

    // header rule 0: lesscommon 0, common 1, strict 2, EE 3
    let mut code = reader.read_bits(2)?;
    if code == 0 {
        decode_lesscommon(reader, &mut opts)?;
        code = reader.read_bits(2)? + 1; // shift into the rule-1 coding
    }
    if code == 1 {
        decode_common(reader, &mut opts)?;
        code = reader.read_bits(1)? + 2; // rule 2: strict 0, EE 1
    }
    if code == 2 {
        opts.strict = true;
        // strict is empty and the trailing EEs cost no bits
    } else if code != 3 {
        return err_exit_code(ErrorKind::InvalidExiInput, "options document is malformed");
    }

    Ok(opts)
}

fn decode_lesscommon<R: Read>(reader: &mut BitReader<R>, opts: &mut ExiOptions) -> Result<()> {
    let mut code = reader.read_bits(2)?;
    if code == 0 {
        decode_uncommon(reader, opts)?;
        code = reader.read_bits(2)? + 1;
    }
    if code == 1 {
        decode_preserve(reader, opts)?;
        code = reader.read_bits(1)? + 2;
    }
    if code == 2 {
        opts.block_size = reader.read_unsigned_integer()? as usize;
    } else if code != 3 {
        return err_exit_code(ErrorKind::InvalidExiInput, "lesscommon options are malformed");
    }
    Ok(())
}

fn decode_uncommon<R: Read>(reader: &mut BitReader<R>, opts: &mut ExiOptions) -> Result<()> {
    let widths = [3u8, 3, 2, 2, 1];
    let mut state = 0usize;

    loop {
        let code = reader.read_bits(widths[state])?;
        // absolute child index: alignment 0, selfContained 1, vml 2, vpc 3, dtrm 4, EE 5
        let child = code as usize + if state == 4 { 4 } else { state };
        match child {
            0 => {
                opts.alignment = if reader.read_bits(1)? == 0 {
                    Alignment::ByteAligned
                } else {
                    Alignment::PreCompression
                };
                state = 1;
            }
            1 => {
                opts.self_contained = true;
                state = 2;
            }
            2 => {
                opts.value_max_length = reader.read_unsigned_integer()? as usize;
                state = 3;
            }
            3 => {
                opts.value_partition_capacity = reader.read_unsigned_integer()? as usize;
                state = 4;
            }
            4 => {
                let entry = decode_dtrm_entry(reader)?;
                opts.datatype_representation_map.push(entry);
                state = 4;
            }
            5 => return Ok(()),
            _ => return err_exit_code(ErrorKind::InvalidExiInput, "uncommon options are malformed"),
        }
    }
}

fn decode_preserve<R: Read>(reader: &mut BitReader<R>, opts: &mut ExiOptions) -> Result<()> {
    let widths = [3u8, 3, 2, 2, 1];
    let mut state = 0usize;

    loop {
        if state >= 5 {
            return Ok(()); // rule 5 holds only a zero-bit EE
        }
        let code = reader.read_bits(widths[state])?;
        let child = code as usize + state;
        match child {
            0 => opts.preserve.dtd = true,
            1 => opts.preserve.prefixes = true,
            2 => opts.preserve.lexical_values = true,
            3 => opts.preserve.comments = true,
            4 => opts.preserve.pis = true,
            5 => return Ok(()),
            _ => return err_exit_code(ErrorKind::InvalidExiInput, "preserve options are malformed"),
        }
        state = child + 1;
    }
}

fn decode_common<R: Read>(reader: &mut BitReader<R>, opts: &mut ExiOptions) -> Result<()> {
    let widths = [2u8, 2, 1];
    let mut state = 0usize;

    loop {
        let code = reader.read_bits(widths[state])?;
        let child = code as usize + state;
        match child {
            0 => {
                opts.compression = true;
                state = 1;
            }
            1 => {
                opts.fragment = true;
                state = 2;
            }
            2 => {
                // schemaId rule 0: CH 0, AT(xsi:nil) 1.0
                if reader.read_bits(1)? == 0 {
                    let s = read_miss_string(reader)?;
                    opts.schema_id = if s.is_empty() {
                        SchemaIdMode::Empty
                    } else {
                        SchemaIdMode::Set(s)
                    };
                } else {
                    let nil = reader.read_boolean()?;
                    if !nil {
                        return err_exit_code(ErrorKind::InvalidExiInput, "schemaId nil must be true");
                    }
                    opts.schema_id = SchemaIdMode::Nil;
                }
                return Ok(());
            }
            3 => return Ok(()),
            _ => return err_exit_code(ErrorKind::InvalidExiInput, "common options are malformed"),
        }
    }
}

fn decode_dtrm_entry<R: Read>(reader: &mut BitReader<R>) -> Result<DatatypeRepresentation> {
    let (type_uri, type_ln) = read_miss_qname(reader)?;
    let (representation_uri, representation_ln) = read_miss_qname(reader)?;
    Ok(DatatypeRepresentation {
        type_uri,
        type_ln,
        representation_uri,
        representation_ln,
    })
}

fn read_miss_string<R: Read>(reader: &mut BitReader<R>) -> Result<String> {
    let len = reader.read_unsigned_integer()?;
    if len < 2 {
        return err_exit_code(ErrorKind::InvalidExiInput, "options string hit an empty partition");
    }
    reader.read_string_only((len - 2) as usize)
}

fn read_miss_qname<R: Read>(reader: &mut BitReader<R>) -> Result<(String, String)> {
    let slot = reader.read_bits(3)?;
    if slot != 0 {
        return err_exit_code(ErrorKind::InvalidExiInput, "options qname hit an empty partition");
    }
    let uri = reader.read_string()?;
    let len = reader.read_unsigned_integer()?;
    if len < 1 {
        return err_exit_code(ErrorKind::InvalidExiInput, "options qname local name is a hit");
    }
    let ln = reader.read_string_only((len - 1) as usize)?;
    Ok((uri, ln))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Preserve;
    use std::io::Cursor;

    fn roundtrip_header(header: &ExiHeader) -> ExiHeader {
        let mut w = BitWriter::new(Vec::new());
        encode_header(&mut w, header).unwrap();
        let bytes = w.finish().unwrap();
        let mut r = BitReader::new(Cursor::new(bytes));
        decode_header(&mut r, None).unwrap()
    }

    #[test]
    fn default_header_is_a_single_byte() {
        let mut w = BitWriter::new(Vec::new());
        encode_header(
            &mut w,
            &ExiHeader {
                has_cookie: false,
                opts: ExiOptions::default(),
                opts_in_header: true,
            },
        )
        .unwrap();
        let bytes = w.finish().unwrap();
        // 10 (distinguishing) 0 (no options) 0 (final) 0000 (version 1)
        assert_eq!(bytes, vec![0b1000_0000]);
    }

    #[test]
    fn cookie_survives_the_trip() {
        let h = roundtrip_header(&ExiHeader {
            has_cookie: true,
            opts: ExiOptions::default(),
            opts_in_header: true,
        });
        assert!(h.has_cookie);
        assert!(h.opts.is_default());
    }

    #[test]
    fn options_document_round_trips() {
        let opts = ExiOptions {
            alignment: Alignment::ByteAligned,
            strict: true,
            fragment: true,
            self_contained: false,
            value_partition_capacity: 0,
            preserve: Preserve {
                comments: true,
                pis: false,
                dtd: false,
                prefixes: true,
                lexical_values: false,
            },
            schema_id: SchemaIdMode::Set("urn:example:sch".to_owned()),
            ..Default::default()
        };
        let h = roundtrip_header(&ExiHeader {
            has_cookie: false,
            opts: opts.clone(),
            opts_in_header: true,
        });
        assert!(h.opts_in_header);
        assert_eq!(h.opts, opts);
    }

    #[test]
    fn out_of_band_options_apply_when_header_is_bare() {
        let oob = ExiOptions {
            fragment: true,
            ..Default::default()
        };
        let mut w = BitWriter::new(Vec::new());
        encode_header(
            &mut w,
            &ExiHeader {
                has_cookie: false,
                opts: oob.clone(),
                opts_in_header: false,
            },
        )
        .unwrap();
        let bytes = w.finish().unwrap();
        let mut r = BitReader::new(Cursor::new(bytes));
        let h = decode_header(&mut r, Some(&oob)).unwrap();
        assert!(!h.opts_in_header);
        assert!(h.opts.fragment);
    }
}
