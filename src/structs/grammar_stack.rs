/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::exi_error::{err_exit_code, ErrorKind, Result};
use crate::structs::string_tables::QNameId;

/// Where grammars live during a stream's lifetime. Document and learned
/// element grammars are stream-local, schema grammars come from the shared
/// table; an address keeps the two spaces apart without pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarAddr {
    /// Index into the stream's own pool (document grammar, built-in
    /// element grammars created while learning)
    Local(usize),
    /// Index into the schema's grammar table
    Schema(usize),
}

/// One level of element nesting: the active grammar plus the rule to resume
/// on the matching EE.
#[derive(Debug, Clone, Copy)]
pub struct GrammarFrame {
    pub grammar: GrammarAddr,
    /// Rule of the *enclosing* grammar to restore when this frame pops
    pub saved_non_term: usize,
    /// Element that opened this frame, for qname-aware content decisions
    pub elem_qname: QNameId,
}

/// LIFO of active grammars; the bottom frame is the document (or fragment)
/// grammar. Balanced push/pop is an invariant checked by the facades.
#[derive(Debug, Clone, Default)]
pub struct GrammarStack {
    frames: Vec<GrammarFrame>,
}

impl GrammarStack {
    pub fn push(&mut self, grammar: GrammarAddr, saved_non_term: usize, elem_qname: QNameId) {
        self.frames.push(GrammarFrame {
            grammar,
            saved_non_term,
            elem_qname,
        });
    }

    pub fn pop(&mut self) -> Result<GrammarFrame> {
        self.frames
            .pop()
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InconsistentState, "grammar stack underflow"))
    }

    pub fn top(&self) -> Result<&GrammarFrame> {
        self.frames
            .last()
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InconsistentState, "grammar stack is empty"))
    }

    /// Swaps the grammar of the top frame, used by xsi:type and xsi:nil.
    pub fn retarget_top(&mut self, grammar: GrammarAddr) -> Result<()> {
        match self.frames.last_mut() {
            Some(f) => {
                f.grammar = grammar;
                Ok(())
            }
            None => err_exit_code(ErrorKind::InconsistentState, "no active grammar to retarget"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
