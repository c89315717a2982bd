/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

#[cfg(feature = "hash_index")]
use std::collections::HashMap;

use crate::consts::*;
use crate::exi_error::{err_exit_code, ErrorKind, Result};

/// Identifies a (uri, local-name) pair by its compact table indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QNameId {
    pub uri: usize,
    pub ln: usize,
}

impl QNameId {
    pub const VOID: QNameId = QNameId {
        uri: INDEX_MAX,
        ln: INDEX_MAX,
    };
}

/// One slot of a local value partition: the index of the interned string in
/// the global value table, or INDEX_MAX once the global slot was recycled.
/// Dead slots keep their position so earlier compact ids stay stable.
#[derive(Debug, Clone, Copy)]
pub struct VxEntry {
    pub global_id: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LnEntry {
    pub ln: String,
    /// Grammar-table index of the global element declared with this name
    pub elem_grammar: usize,
    /// Grammar-table index of the global type declared with this name
    pub type_grammar: usize,
    pub vx_table: Vec<VxEntry>,
}

impl LnEntry {
    fn new(ln: String) -> Self {
        LnEntry {
            ln,
            elem_grammar: INDEX_MAX,
            type_grammar: INDEX_MAX,
            vx_table: Vec::new(),
        }
    }

    /// Live entries of the local partition; dead slots still count, their
    /// ids must remain addressable.
    pub fn vx_count(&self) -> usize {
        self.vx_table.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct UriEntry {
    pub uri: String,
    pub prefixes: Vec<String>,
    pub ln_table: Vec<LnEntry>,
}

/// The uri partition plus its nested local-name and prefix partitions.
#[derive(Debug, Clone, Default)]
pub struct UriTable {
    pub uris: Vec<UriEntry>,
}

impl UriTable {
    /// Builds the mandated initial partitions. The first four uris and
    /// their local names are fixed by the format and must keep this order.
    pub fn with_initial_entries(with_schema: bool) -> Self {
        let mut table = UriTable::default();

        table.create_entry("", Some(""), &[]);
        table.create_entry(URI_XML, Some(PREFIX_XML), &XML_INITIAL_LOCAL_NAMES);
        table.create_entry(URI_XSI, Some(PREFIX_XSI), &XSI_INITIAL_LOCAL_NAMES);
        if with_schema {
            table.create_entry(URI_XSD, None, &XSD_INITIAL_LOCAL_NAMES);
        }

        table
    }

    fn create_entry(&mut self, uri: &str, prefix: Option<&str>, local_names: &[&str]) {
        let id = self.add_uri(uri.to_owned());
        if let Some(p) = prefix {
            self.uris[id].prefixes.push(p.to_owned());
        }
        for ln in local_names {
            self.add_ln(id, (*ln).to_owned());
        }
    }

    pub fn add_uri(&mut self, uri: String) -> usize {
        self.uris.push(UriEntry {
            uri,
            prefixes: Vec::new(),
            ln_table: Vec::new(),
        });
        self.uris.len() - 1
    }

    pub fn add_ln(&mut self, uri_id: usize, ln: String) -> usize {
        let lns = &mut self.uris[uri_id].ln_table;
        lns.push(LnEntry::new(ln));
        lns.len() - 1
    }

    pub fn add_prefix(&mut self, uri_id: usize, prefix: String) -> Result<usize> {
        let prefixes = &mut self.uris[uri_id].prefixes;
        if prefixes.len() >= MAXIMUM_NUMBER_OF_PREFIXES_PER_URI {
            return err_exit_code(ErrorKind::TooManyPrefixes, "prefix partition is full");
        }
        prefixes.push(prefix);
        Ok(prefixes.len() - 1)
    }

    pub fn lookup_uri(&self, uri: &str) -> Option<usize> {
        self.uris.iter().position(|e| e.uri == uri)
    }

    pub fn lookup_ln(&self, uri_id: usize, ln: &str) -> Option<usize> {
        self.uris[uri_id].ln_table.iter().position(|e| e.ln == ln)
    }

    pub fn lookup_prefix(&self, uri_id: usize, prefix: &str) -> Option<usize> {
        self.uris[uri_id].prefixes.iter().position(|p| p == prefix)
    }

    pub fn ln_entry(&self, qname: QNameId) -> &LnEntry {
        &self.uris[qname.uri].ln_table[qname.ln]
    }

    pub fn ln_entry_mut(&mut self, qname: QNameId) -> &mut LnEntry {
        &mut self.uris[qname.uri].ln_table[qname.ln]
    }

    pub fn qname_strings(&self, qname: QNameId) -> (&str, &str) {
        (
            &self.uris[qname.uri].uri,
            &self.uris[qname.uri].ln_table[qname.ln].ln,
        )
    }

    /// Resolves a (uri, local-name) string pair, e.g. an xsi:type value.
    pub fn lookup_qname(&self, uri: &str, ln: &str) -> Option<QNameId> {
        let uri_id = self.lookup_uri(uri)?;
        let ln_id = self.lookup_ln(uri_id, ln)?;
        Some(QNameId { uri: uri_id, ln: ln_id })
    }
}

#[derive(Debug, Clone)]
pub struct ValueEntry {
    pub value: String,
    /// Back-reference into the local partition this entry is cross-linked
    /// from, so wrap-around can sever the old link
    pub qname_id: QNameId,
    pub vx_entry_id: usize,
}

/// The global value partition. Bounded by `valuePartitionCapacity`; once the
/// rolling counter wraps, new values overwrite the oldest slots.
#[derive(Debug, Clone, Default)]
pub struct ValueTable {
    pub values: Vec<ValueEntry>,
    /// Rolling insertion position, always < capacity
    pub global_id: usize,
    #[cfg(feature = "hash_index")]
    hash: HashMap<String, usize>,
}

impl ValueTable {
    pub fn count(&self) -> usize {
        self.values.len()
    }

    pub fn lookup(&self, value: &str) -> Option<usize> {
        #[cfg(feature = "hash_index")]
        {
            self.hash.get(value).copied()
        }
        #[cfg(not(feature = "hash_index"))]
        {
            self.values.iter().position(|e| e.value == value)
        }
    }

    /// Looks `value` up in the local partition of `ln_entry`, skipping
    /// logically deleted slots. Returns the local compact id.
    pub fn lookup_vx(&self, ln_entry: &LnEntry, value: &str) -> Option<usize> {
        ln_entry.vx_table.iter().position(|vx| {
            vx.global_id != INDEX_MAX && self.values[vx.global_id].value == value
        })
    }

    /// Interns `value` under `qname_id`, honoring the partition capacity:
    /// at capacity the rolling counter overwrites the oldest entry and its
    /// local back-reference is severed first.
    pub fn add_value(&mut self, uri_table: &mut UriTable, qname_id: QNameId, value: String, capacity: usize) {
        if capacity == 0 {
            return;
        }

        let vx_entry_id = {
            let ln_entry = uri_table.ln_entry_mut(qname_id);
            ln_entry.vx_table.push(VxEntry { global_id: self.global_id });
            ln_entry.vx_table.len() - 1
        };

        if self.global_id < self.values.len() {
            // wrapped around: recycle the slot under the rolling counter
            let old = &self.values[self.global_id];
            let (old_qname, old_vx) = (old.qname_id, old.vx_entry_id);
            uri_table.ln_entry_mut(old_qname).vx_table[old_vx].global_id = INDEX_MAX;

            #[cfg(feature = "hash_index")]
            self.hash.remove(&self.values[self.global_id].value);

            self.values[self.global_id] = ValueEntry {
                value,
                qname_id,
                vx_entry_id,
            };
        } else {
            self.values.push(ValueEntry {
                value,
                qname_id,
                vx_entry_id,
            });
        }

        #[cfg(feature = "hash_index")]
        self.hash.insert(self.values[self.global_id].value.clone(), self.global_id);

        self.global_id += 1;
        if self.global_id == capacity {
            self.global_id = 0;
        }
    }
}
