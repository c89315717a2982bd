/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::consts::INDEX_MAX;

/// How value content is laid out relative to byte boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    BitPacked,
    ByteAligned,
    /// Byte alignment without the deflate pass, so a later compressor
    /// sees the same channel layout as compression mode
    PreCompression,
}

/// State of the schemaId header option.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SchemaIdMode {
    /// No statement is made about the schema in use
    #[default]
    Absent,
    /// Explicitly schema-less ("nil" in the options document)
    Nil,
    /// Schema-informed, but built-in XSD types only (empty schema id)
    Empty,
    /// Schema-informed with an identifier agreed out of band
    Set(String),
}

/// Fidelity switches. Each enables events the default grammars prune away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Preserve {
    pub comments: bool,
    pub pis: bool,
    pub dtd: bool,
    pub prefixes: bool,
    pub lexical_values: bool,
}

impl Preserve {
    pub fn any(&self) -> bool {
        self.comments || self.pis || self.dtd || self.prefixes || self.lexical_values
    }
}

/// Entry of the datatypeRepresentationMap option: the schema type qname and
/// the representation type qname, both as (uri, local-name) string pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatatypeRepresentation {
    pub type_uri: String,
    pub type_ln: String,
    pub representation_uri: String,
    pub representation_ln: String,
}

/// All knobs an EXI header can carry. Defaults are the format defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExiOptions {
    pub alignment: Alignment,
    pub compression: bool,
    pub strict: bool,
    pub fragment: bool,
    pub self_contained: bool,
    pub preserve: Preserve,
    pub schema_id: SchemaIdMode,
    /// Values per compression/pre-compression block
    pub block_size: usize,
    /// Longest string that may still be added to the value partitions
    pub value_max_length: usize,
    /// Bound of the global value partition; INDEX_MAX means unbounded
    pub value_partition_capacity: usize,
    pub datatype_representation_map: Vec<DatatypeRepresentation>,
}

impl Default for ExiOptions {
    fn default() -> Self {
        ExiOptions {
            alignment: Alignment::BitPacked,
            compression: false,
            strict: false,
            fragment: false,
            self_contained: false,
            preserve: Preserve::default(),
            schema_id: SchemaIdMode::Absent,
            block_size: 1_000_000,
            value_max_length: INDEX_MAX,
            value_partition_capacity: INDEX_MAX,
            datatype_representation_map: Vec::new(),
        }
    }
}

impl ExiOptions {
    /// True when every option still holds its default, in which case the
    /// header options document can be omitted entirely.
    pub fn is_default(&self) -> bool {
        *self == ExiOptions::default()
    }

    /// Bit-packed n-bit fields degrade to whole bytes in the other two
    /// alignments; the primitive codecs branch on this.
    pub fn byte_aligned(&self) -> bool {
        self.compression || !matches!(self.alignment, Alignment::BitPacked)
    }
}
