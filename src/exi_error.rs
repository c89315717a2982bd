/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::fmt::Display;

use thiserror::Error;

/// Classifies every failure the processor can report. The set is part of the
/// public contract: callers match on it to decide whether an operation is
/// retryable (`BufferEnd` only) or terminal for the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Allocation or capacity failure
    Memory,
    /// The byte source/sink could not deliver more data; retryable
    BufferEnd,
    /// The stream does not start with a valid EXI header
    HeaderMismatch,
    /// The bits read do not form a valid EXI body
    InvalidExiInput,
    /// Internal state and stream contents disagree
    InconsistentState,
    /// A required collaborator was absent
    NullRef,
    /// An index fell outside its table
    OutOfBounds,
    /// A header option is recognized but not supported
    UnsupportedOption,
    NotImplemented,
    /// A content handler asked to abort parsing
    HandlerStop,
    /// The document was fully consumed
    ParsingComplete,
    /// The caller configured the stream in a contradictory way
    InvalidConfig,
    /// No production in the active rule matches the event
    NoProductionMatch,
    TooManyPrefixes,
    LnNotFound,
    LanguageElemUnknown,
    /// A schema-strict stream carried a deviation
    StrictViolation,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ExiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ExiError {
    pub fn new(kind: ErrorKind, message: &str) -> Self {
        ExiError {
            kind,
            message: message.to_owned(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<ErrorKind> for ExiError {
    fn from(kind: ErrorKind) -> Self {
        ExiError {
            kind,
            message: String::new(),
        }
    }
}

impl From<std::io::Error> for ExiError {
    fn from(e: std::io::Error) -> Self {
        // all I/O trouble surfaces to callers as a starved/blocked byte stream
        ExiError {
            kind: ErrorKind::BufferEnd,
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExiError>;

/// Helper to return an error code as the result of a function
pub fn err_exit_code<T>(kind: ErrorKind, message: &str) -> Result<T> {
    Err(ExiError::new(kind, message))
}
