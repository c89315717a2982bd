/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use flate2::read::DeflateDecoder;

use std::io::{Chain, Cursor, Read};
use std::sync::Arc;

use crate::exi_error::{ErrorKind, ExiError, Result};
use crate::options::ExiOptions;
use crate::structs::bit_reader::BitReader;
use crate::structs::body_decoder::{decode_next_event, ParseStatus};
use crate::structs::content_handler::ContentHandler;
use crate::structs::header::{decode_header, ExiHeader};
use crate::structs::schema::ExiSchema;
use crate::structs::stream::StreamContext;

type Tail<R> = Chain<Cursor<Vec<u8>>, R>;

/// Byte source of the body: the raw stream, or the same stream routed
/// through the inflate channel once a compressed header was seen.
pub enum BodySource<R: Read> {
    Plain(Tail<R>),
    Inflate(DeflateDecoder<Tail<R>>),
}

impl<R: Read> Read for BodySource<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            BodySource::Plain(r) => r.read(buf),
            BodySource::Inflate(r) => r.read(buf),
        }
    }
}

/// Pull parser over any byte source. Drive it with `parse_header` once and
/// then `parse_next` until it reports `Complete`.
pub struct Parser<R: Read> {
    reader: Option<BitReader<BodySource<R>>>,
    ctx: Option<StreamContext>,
    schema: Option<Arc<ExiSchema>>,
    header: Option<ExiHeader>,
}

impl<R: Read> Parser<R> {
    pub fn new(source: R, schema: Option<Arc<ExiSchema>>) -> Self {
        let tail = Cursor::new(Vec::new()).chain(source);
        Parser {
            reader: Some(BitReader::new(BodySource::Plain(tail))),
            ctx: None,
            schema,
            header: None,
        }
    }

    /// Decodes the preamble and prepares the grammar machine. Options not
    /// present in the header bits can be supplied out of band.
    pub fn parse_header(&mut self, out_of_band: Option<&ExiOptions>) -> Result<&ExiHeader> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| ExiError::new(ErrorKind::InconsistentState, "parser already closed"))?;

        let header = decode_header(reader, out_of_band)?;

        reader.set_byte_aligned(header.opts.byte_aligned());

        if header.opts.compression {
            // the body continues in a deflate channel, starting at the
            // byte boundary the header left us on
            let r = self.reader.take().unwrap();
            self.reader = Some(r.map_source(|leftover, source| {
                let tail = match source {
                    BodySource::Plain(t) => t,
                    BodySource::Inflate(_) => unreachable!("header is never compressed"),
                };
                let (_, raw) = tail.into_inner();
                BodySource::Inflate(DeflateDecoder::new(Cursor::new(leftover).chain(raw)))
            }));
        }

        let mut ctx = StreamContext::new(self.schema.clone(), header.opts.clone());
        ctx.start();
        self.ctx = Some(ctx);
        self.header = Some(header);
        Ok(self.header.as_ref().unwrap())
    }

    /// Decodes one event and feeds the handler. `Ok(Continue)` asks for the
    /// next call; `Ok(Complete)` follows the ED event. A `BufferEnd` error
    /// is retryable once the source has more bytes.
    pub fn parse_next<H: ContentHandler>(&mut self, handler: &mut H) -> Result<ParseStatus> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| ExiError::new(ErrorKind::InconsistentState, "parser already closed"))?;
        let ctx = self
            .ctx
            .as_mut()
            .ok_or_else(|| ExiError::new(ErrorKind::InconsistentState, "parse_header was not called"))?;

        match decode_next_event(reader, ctx, handler) {
            Ok(status) => Ok(status),
            Err(e) => {
                if e.kind() != ErrorKind::HandlerStop && e.kind() != ErrorKind::BufferEnd {
                    handler.fatal_error(&e);
                }
                Err(e)
            }
        }
    }

    /// Runs the stream to completion.
    pub fn parse_all<H: ContentHandler>(&mut self, handler: &mut H) -> Result<()> {
        loop {
            match self.parse_next(handler)? {
                ParseStatus::Continue => {}
                ParseStatus::Complete => return Ok(()),
            }
        }
    }

    pub fn header(&self) -> Option<&ExiHeader> {
        self.header.as_ref()
    }

    /// A balanced parse leaves no grammar on the stack.
    pub fn is_balanced(&self) -> bool {
        self.ctx.as_ref().map(|c| c.stack.is_empty()).unwrap_or(false)
    }

    /// Releases the stream's memory. Dropping does the same; this mirrors
    /// the explicit close the error contract asks for after a failure.
    pub fn destroy(mut self) {
        self.reader = None;
        self.ctx = None;
    }
}
