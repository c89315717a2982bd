/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Embeddable processor for the W3C Efficient XML Interchange (EXI) 1.0
//! binary format.
//!
//! The crate covers the EXI grammar machine (built-in learning grammars and
//! schema-informed compiled grammars), the string-table subsystem assigning
//! compact identifiers to uris, names, prefixes and values, the bit-level
//! codec for the EXI scalar types, the schema-to-grammar compiler over a
//! pre-parsed declaration forest, and the stream header with its nested
//! options document.
//!
//! Encoding goes through [`Serializer`], which enforces infoset emission
//! order; decoding through [`Parser`], which feeds a [`ContentHandler`].
//! Both run over any `std::io` byte stream and share a schema object
//! compiled once with [`generate_schema`].

pub mod consts;
pub mod exi_error;
pub mod helpers;
pub mod options;
pub mod structs;

pub use crate::exi_error::{ErrorKind, ExiError, Result};
pub use crate::options::{Alignment, ExiOptions, Preserve, SchemaIdMode};
pub use crate::structs::body_decoder::ParseStatus;
pub use crate::structs::content_handler::{ContentHandler, HandlerAction};
pub use crate::structs::exi_value::{DateTimeKind, ExiDateTime, ExiDecimal, ExiFloat, ExiValue};
pub use crate::structs::grammar_gen::generate_schema;
pub use crate::structs::header::ExiHeader;
pub use crate::structs::parser::Parser;
pub use crate::structs::schema::{ExiSchema, TypeClass};
pub use crate::structs::serializer::Serializer;
pub use crate::structs::tree_table::{AttributeTag, ElementKind, TreeTable};
