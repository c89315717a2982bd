/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use flate2::write::DeflateEncoder;
use flate2::Compression;

use std::io::Write;
use std::sync::Arc;

use crate::exi_error::{err_exit_code, ErrorKind, Result};
use crate::options::ExiOptions;
use crate::structs::bit_writer::BitWriter;
use crate::structs::body_encoder::{
    encode_attribute, encode_end_document, encode_end_element, encode_misc_event, encode_namespace_declaration,
    encode_start_document, encode_start_element, encode_typed_value,
};
use crate::structs::events::EventType;
use crate::structs::exi_value::{ExiDateTime, ExiDecimal, ExiFloat, ExiValue};
use crate::structs::header::{encode_header, ExiHeader};
use crate::structs::schema::{ExiSchema, TypeClass};
use crate::structs::stream::StreamContext;

/// Byte sink of the body: raw, or routed through a deflate channel when
/// the compression option is on.
pub enum BodySink<W: Write> {
    Plain(W),
    Deflate(DeflateEncoder<W>),
}

impl<W: Write> Write for BodySink<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            BodySink::Plain(w) => w.write(buf),
            BodySink::Deflate(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            BodySink::Plain(w) => w.flush(),
            BodySink::Deflate(w) => w.flush(),
        }
    }
}

/// Push serializer enforcing infoset emission order: header, SD, a
/// properly nested element tree with attributes before content, ED.
pub struct Serializer<W: Write> {
    writer: Option<BitWriter<BodySink<W>>>,
    ctx: StreamContext,
    header: ExiHeader,
    header_written: bool,
}

impl<W: Write> Serializer<W> {
    /// `opts_in_header` controls whether non-default options are written
    /// into the stream or agreed out of band.
    pub fn new(sink: W, schema: Option<Arc<ExiSchema>>, opts: ExiOptions, with_cookie: bool, opts_in_header: bool) -> Self {
        let header = ExiHeader {
            has_cookie: with_cookie,
            opts: opts.clone(),
            opts_in_header,
        };
        Serializer {
            writer: Some(BitWriter::new(BodySink::Plain(sink))),
            ctx: StreamContext::new(schema, opts),
            header,
            header_written: false,
        }
    }

    fn writer(&mut self) -> Result<&mut BitWriter<BodySink<W>>> {
        self.writer
            .as_mut()
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InconsistentState, "stream already closed"))
    }

    /// Writes the header; must precede every event.
    pub fn exi_header(&mut self) -> Result<()> {
        if self.header_written {
            return err_exit_code(ErrorKind::InconsistentState, "header already written");
        }
        let header = self.header.clone();
        let w = self.writer()?;
        encode_header(w, &header)?;
        w.set_byte_aligned(header.opts.byte_aligned());

        if header.opts.compression {
            let w = self.writer.take().unwrap();
            self.writer = Some(w.map_sink(|sink| match sink {
                BodySink::Plain(inner) => BodySink::Deflate(DeflateEncoder::new(inner, Compression::default())),
                compressed => compressed,
            })?);
        }

        self.header_written = true;
        self.ctx.start();
        Ok(())
    }

    pub fn start_document(&mut self) -> Result<()> {
        if !self.header_written {
            return err_exit_code(ErrorKind::InconsistentState, "events before the header");
        }
        let w = self.writer.as_mut().unwrap();
        encode_start_document(w, &mut self.ctx)
    }

    /// Opens an element; returns the content type its grammar expects for
    /// character data, when the schema pins one down.
    pub fn start_element(&mut self, uri: &str, local_name: &str) -> Result<Option<TypeClass>> {
        self.start_element_pfx(uri, local_name, None)
    }

    pub fn start_element_pfx(&mut self, uri: &str, local_name: &str, prefix: Option<&str>) -> Result<Option<TypeClass>> {
        let w = self
            .writer
            .as_mut()
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InconsistentState, "stream already closed"))?;
        encode_start_element(w, &mut self.ctx, uri, local_name, prefix)
    }

    /// Emits the attribute event; its value must follow through one of the
    /// data entry points before any further event.
    pub fn attribute(&mut self, uri: &str, local_name: &str) -> Result<()> {
        self.attribute_pfx(uri, local_name, None)
    }

    pub fn attribute_pfx(&mut self, uri: &str, local_name: &str, prefix: Option<&str>) -> Result<()> {
        let w = self
            .writer
            .as_mut()
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InconsistentState, "stream already closed"))?;
        encode_attribute(w, &mut self.ctx, uri, local_name, prefix)
    }

    pub fn value_data(&mut self, value: &ExiValue) -> Result<()> {
        let w = self
            .writer
            .as_mut()
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InconsistentState, "stream already closed"))?;
        encode_typed_value(w, &mut self.ctx, value)
    }

    pub fn string_data(&mut self, value: &str) -> Result<()> {
        self.value_data(&ExiValue::String(value.to_owned()))
    }

    pub fn int_data(&mut self, value: i64) -> Result<()> {
        self.value_data(&ExiValue::Integer(value))
    }

    pub fn boolean_data(&mut self, value: bool) -> Result<()> {
        self.value_data(&ExiValue::Boolean(value))
    }

    pub fn decimal_data(&mut self, value: ExiDecimal) -> Result<()> {
        self.value_data(&ExiValue::Decimal(value))
    }

    pub fn float_data(&mut self, value: ExiFloat) -> Result<()> {
        self.value_data(&ExiValue::Float(value))
    }

    pub fn binary_data(&mut self, value: &[u8]) -> Result<()> {
        self.value_data(&ExiValue::Binary(value.to_vec()))
    }

    pub fn date_time_data(&mut self, value: ExiDateTime) -> Result<()> {
        self.value_data(&ExiValue::DateTime(value))
    }

    pub fn qname_data(&mut self, uri: &str, local_name: &str) -> Result<()> {
        self.value_data(&ExiValue::QName(uri.to_owned(), local_name.to_owned()))
    }

    pub fn namespace_declaration(&mut self, uri: &str, prefix: &str, is_local_elem: bool) -> Result<()> {
        let w = self
            .writer
            .as_mut()
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InconsistentState, "stream already closed"))?;
        encode_namespace_declaration(w, &mut self.ctx, uri, prefix, is_local_elem)
    }

    pub fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        let w = self
            .writer
            .as_mut()
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InconsistentState, "stream already closed"))?;
        encode_misc_event(w, &mut self.ctx, EventType::ProcessingInstruction, &[target, data])
    }

    pub fn comment(&mut self, text: &str) -> Result<()> {
        let w = self
            .writer
            .as_mut()
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InconsistentState, "stream already closed"))?;
        encode_misc_event(w, &mut self.ctx, EventType::Comment, &[text])
    }

    pub fn self_contained(&mut self) -> Result<()> {
        err_exit_code(ErrorKind::NotImplemented, "selfContained regions")
    }

    pub fn end_element(&mut self) -> Result<()> {
        let w = self
            .writer
            .as_mut()
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InconsistentState, "stream already closed"))?;
        encode_end_element(w, &mut self.ctx)
    }

    pub fn end_document(&mut self) -> Result<()> {
        let w = self
            .writer
            .as_mut()
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InconsistentState, "stream already closed"))?;
        encode_end_document(w, &mut self.ctx)
    }

    /// Flushes everything (the deflate trailer included) and hands the
    /// sink back.
    pub fn close(mut self) -> Result<W> {
        let w = self
            .writer
            .take()
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InconsistentState, "stream already closed"))?;
        match w.finish()? {
            BodySink::Plain(inner) => Ok(inner),
            BodySink::Deflate(enc) => Ok(enc.finish()?),
        }
    }
}
