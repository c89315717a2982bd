/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::collections::HashMap;
use std::sync::Arc;

use crate::consts::*;
use crate::exi_error::{err_exit_code, ErrorKind, Result};
use crate::options::ExiOptions;
use crate::structs::grammar::{
    augment_schema_grammar, create_built_in_element_grammar, create_doc_grammar, create_fragment_grammar, ExiGrammar,
};
use crate::structs::grammar_stack::{GrammarAddr, GrammarStack};
use crate::structs::schema::ExiSchema;
use crate::structs::string_tables::{QNameId, UriTable, ValueTable};

/// Per-stream mutable state shared by the encode and decode loops: the
/// cloned string tables, the grammar stack, the learned grammar pool and
/// the current parsing context. The bit cursor lives next to it in the
/// facade that owns the byte stream.
pub struct StreamContext {
    pub opts: ExiOptions,
    pub schema: Option<Arc<ExiSchema>>,

    /// Stream-local copy of the (initial) uri partitions; grows as the
    /// stream learns strings
    pub uri_table: UriTable,
    /// Global value partition, always stream-local
    pub value_table: ValueTable,

    pub stack: GrammarStack,
    /// Document grammar plus every built-in element grammar learned here
    pub local_grammars: Vec<ExiGrammar>,
    /// qname -> local grammar index, the built-in element grammar pool
    elem_pool: HashMap<QNameId, usize>,
    /// schema grammar index -> locally augmented copy (non-strict streams)
    augmented_pool: HashMap<usize, usize>,

    /// Active rule within the top grammar
    pub non_term: usize,
    /// Element whose content is being processed
    pub current_elem: QNameId,
    /// Qname the next attribute/character value is accounted under
    pub current_value_qname: QNameId,
    /// Simple type of the pending attribute value (serializer side)
    pub expect_at_type: usize,
    pub expect_at_data: bool,
    pub is_nil_type: bool,
}

impl StreamContext {
    pub fn new(schema: Option<Arc<ExiSchema>>, opts: ExiOptions) -> Self {
        let uri_table = match &schema {
            Some(s) => s.uri_table.clone(),
            None => UriTable::with_initial_entries(false),
        };

        StreamContext {
            opts,
            schema,
            uri_table,
            value_table: ValueTable::default(),
            stack: GrammarStack::default(),
            local_grammars: Vec::new(),
            elem_pool: HashMap::new(),
            augmented_pool: HashMap::new(),
            non_term: GR_DOCUMENT,
            current_elem: QNameId::VOID,
            current_value_qname: QNameId::VOID,
            expect_at_type: INDEX_MAX,
            expect_at_data: false,
            is_nil_type: false,
        }
    }

    /// Builds the bottom grammar (document or fragment) and pushes it.
    pub fn start(&mut self) {
        let doc = if self.opts.fragment {
            create_fragment_grammar(&self.opts)
        } else {
            let globals: &[(QNameId, usize)] = match &self.schema {
                Some(s) => &s.global_elements,
                None => &[],
            };
            create_doc_grammar(&self.opts, globals)
        };
        self.local_grammars.push(doc);
        self.stack
            .push(GrammarAddr::Local(0), GR_VOID_NON_TERMINAL, QNameId::VOID);
        self.non_term = GR_DOCUMENT;
    }

    pub fn grammar(&self, addr: GrammarAddr) -> Result<&ExiGrammar> {
        match addr {
            GrammarAddr::Local(i) => self
                .local_grammars
                .get(i)
                .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::OutOfBounds, "local grammar index")),
            GrammarAddr::Schema(i) => match &self.schema {
                Some(s) => s.grammar_table.get(i),
                None => err_exit_code(ErrorKind::NullRef, "schema grammar referenced without a schema"),
            },
        }
    }

    pub fn top_grammar(&self) -> Result<&ExiGrammar> {
        self.grammar(self.stack.top()?.grammar)
    }

    /// Learning mutates only local grammars; schema grammars are shared.
    pub fn top_grammar_mut(&mut self) -> Result<&mut ExiGrammar> {
        let addr = self.stack.top()?.grammar;
        match addr {
            GrammarAddr::Local(i) => Ok(&mut self.local_grammars[i]),
            GrammarAddr::Schema(_) => {
                err_exit_code(ErrorKind::InconsistentState, "attempt to mutate a shared schema grammar")
            }
        }
    }

    /// The grammar to push for an element with this qname: the compiled
    /// schema grammar when one exists, otherwise the cached or fresh
    /// built-in element grammar.
    pub fn element_grammar_for(&mut self, qname: QNameId) -> Result<GrammarAddr> {
        let declared = self.schema.as_ref().and_then(|s| {
            if qname.uri < s.uri_table.uris.len() && qname.ln < s.uri_table.uris[qname.uri].ln_table.len() {
                s.element_grammar(qname)
            } else {
                None
            }
        });
        if let Some(idx) = declared {
            return self.schema_grammar_addr(idx);
        }
        if self.schema.is_some() && self.opts.strict {
            return err_exit_code(ErrorKind::StrictViolation, "undeclared element in a strict stream");
        }

        Ok(self.built_in_element_grammar_for(qname))
    }

    /// Schema grammars pass through augmentation (copied into the local
    /// pool) unless the stream is strict.
    pub fn schema_grammar_addr(&mut self, schema_idx: usize) -> Result<GrammarAddr> {
        if self.opts.strict {
            return Ok(GrammarAddr::Schema(schema_idx));
        }
        if let Some(&local) = self.augmented_pool.get(&schema_idx) {
            return Ok(GrammarAddr::Local(local));
        }

        let schema = self
            .schema
            .as_ref()
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::NullRef, "no schema"))?;
        let mut copy = schema.grammar_table.get(schema_idx)?.clone();
        augment_schema_grammar(&mut copy, &self.opts);
        self.local_grammars.push(copy);
        let local = self.local_grammars.len() - 1;
        self.augmented_pool.insert(schema_idx, local);
        Ok(GrammarAddr::Local(local))
    }

    pub fn built_in_element_grammar_for(&mut self, qname: QNameId) -> GrammarAddr {
        if let Some(&idx) = self.elem_pool.get(&qname) {
            return GrammarAddr::Local(idx);
        }
        let g = create_built_in_element_grammar(&self.opts);
        self.local_grammars.push(g);
        let idx = self.local_grammars.len() - 1;
        self.elem_pool.insert(qname, idx);
        GrammarAddr::Local(idx)
    }

    /// Pushes the grammar for an opening element and enters its start rule.
    pub fn push_element(&mut self, addr: GrammarAddr, qname: QNameId) {
        self.stack.push(addr, self.non_term, qname);
        self.non_term = GR_START_TAG_CONTENT;
        self.current_elem = qname;
        self.current_value_qname = qname;
        self.is_nil_type = false;
    }

    /// Pops on EE and restores the enclosing rule. Returns true while
    /// grammars remain on the stack.
    pub fn pop_element(&mut self) -> Result<bool> {
        let frame = self.stack.pop()?;
        self.non_term = frame.saved_non_term;
        if let Ok(top) = self.stack.top() {
            self.current_elem = top.elem_qname;
            self.current_value_qname = top.elem_qname;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
