/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

/// Optional stream cookie preceding the distinguishing bits
pub const EXI_COOKIE: [u8; 4] = [b'$', b'E', b'X', b'I'];

/// First two bits of every EXI stream after the cookie
pub const EXI_DISTINGUISHING_BITS: u32 = 0b10;

/// Format version implemented by this crate (EXI 1.0, final)
pub const EXI_FORMAT_VERSION: u32 = 1;

/// Sentinel for "no index assigned" in all tables
pub const INDEX_MAX: usize = usize::MAX;

/// A prefix partition never grows beyond this many entries
pub const MAXIMUM_NUMBER_OF_PREFIXES_PER_URI: usize = 256;

pub const URI_XML: &str = "http://www.w3.org/XML/1998/namespace";
pub const URI_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const URI_XSD: &str = "http://www.w3.org/2001/XMLSchema";

pub const PREFIX_XML: &str = "xml";
pub const PREFIX_XSI: &str = "xsi";

/// Initial ids of the four pre-populated uri partitions. The order is
/// mandated by the format and must never change.
pub const URI_EMPTY_ID: usize = 0;
pub const URI_XML_ID: usize = 1;
pub const URI_XSI_ID: usize = 2;
pub const URI_XSD_ID: usize = 3;

pub const XML_INITIAL_LOCAL_NAMES: [&str; 4] = ["base", "id", "lang", "space"];

pub const XSI_INITIAL_LOCAL_NAMES: [&str; 2] = ["nil", "type"];

pub const XSI_NIL_ID: usize = 0;
pub const XSI_TYPE_ID: usize = 1;

/// The 46 XML Schema built-in type names, alphabetically, as mandated for
/// the initial local-name partition of the XSD namespace.
pub const XSD_INITIAL_LOCAL_NAMES: [&str; 46] = [
    "ENTITIES",
    "ENTITY",
    "ID",
    "IDREF",
    "IDREFS",
    "NCName",
    "NMTOKEN",
    "NMTOKENS",
    "NOTATION",
    "Name",
    "QName",
    "anySimpleType",
    "anyType",
    "anyURI",
    "base64Binary",
    "boolean",
    "byte",
    "date",
    "dateTime",
    "decimal",
    "double",
    "duration",
    "float",
    "gDay",
    "gMonth",
    "gMonthDay",
    "gYear",
    "gYearMonth",
    "hexBinary",
    "int",
    "integer",
    "language",
    "long",
    "negativeInteger",
    "nonNegativeInteger",
    "nonPositiveInteger",
    "normalizedString",
    "positiveInteger",
    "short",
    "string",
    "time",
    "token",
    "unsignedByte",
    "unsignedInt",
    "unsignedLong",
    "unsignedShort",
];

/// Exponent value reserved for infinities and NaN in the float codec
pub const FLOAT_SPECIAL_EXPONENT: i64 = -(1 << 14);

/// Year bias of the date-time codec
pub const DATE_TIME_YEAR_OFFSET: i64 = 2000;

/// Timezone minutes are biased by this before the 11-bit write
pub const DATE_TIME_TIMEZONE_OFFSET: u32 = 896;

/// Default size of the scratch buffer the bit cursors run over
pub const DEFAULT_BUFFER_LEN: usize = 4096;

/// Non-terminal ids of the built-in document grammar
pub const GR_DOCUMENT: usize = 0;
pub const GR_DOC_CONTENT: usize = 1;
pub const GR_DOC_END: usize = 2;

/// Non-terminal ids of the built-in element grammar
pub const GR_START_TAG_CONTENT: usize = 0;
pub const GR_ELEMENT_CONTENT: usize = 1;

/// Non-terminal ids of the fragment grammar
pub const GR_FRAGMENT: usize = 0;
pub const GR_FRAGMENT_CONTENT: usize = 1;

/// Marks "no right-hand-side non-terminal" (the rule pops its grammar)
pub const GR_VOID_NON_TERMINAL: usize = usize::MAX;
