/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use log::debug;

use std::collections::HashMap;

use crate::consts::*;
use crate::exi_error::{err_exit_code, ErrorKind, Result};
use crate::helpers::bits_needed;
use crate::structs::events::EventType;
use crate::structs::exi_value::ExiValue;
use crate::structs::grammar::{ExiGrammar, GrammarKind, GrammarRule, GrammarTable, Production};
use crate::structs::proto_grammar::*;
use crate::structs::schema::{built_in_simple_types, EnumDefinition, ExiSchema, SimpleType, TypeClass};
use crate::structs::string_tables::{QNameId, UriTable};
use crate::structs::tree_table::{AttributeTag, ElementKind, TreeTable};

/// Work state of one generation run.
struct Builder {
    uri_table: UriTable,
    grammar_table: GrammarTable,
    simple_types: Vec<SimpleType>,
    enum_table: Vec<EnumDefinition>,
    global_elements: Vec<(QNameId, usize)>,
    /// Global simple-type qname -> simple-type table id
    type_ids: HashMap<QNameId, usize>,
    empty_gr_index: usize,
}

/// Compiles a forest of parsed schema documents into the grammars, simple
/// types and initial string tables of a schema object. Single pass;
/// recursive types go through reserved placeholder slots.
pub fn generate_schema(tables: &mut [TreeTable]) -> Result<ExiSchema> {
    let mut b = Builder {
        uri_table: UriTable::with_initial_entries(true),
        grammar_table: GrammarTable::default(),
        simple_types: built_in_simple_types(),
        enum_table: Vec::new(),
        global_elements: Vec::new(),
        type_ids: HashMap::new(),
        empty_gr_index: 0,
    };

    b.empty_gr_index = b.grammar_table.add(ExiGrammar::empty_type_grammar());
    register_built_in_type_grammars(&mut b.uri_table, &mut b.grammar_table);
    for i in 0..XSD_INITIAL_LOCAL_NAMES.len() {
        b.type_ids.insert(QNameId { uri: URI_XSD_ID, ln: i }, i);
    }

    populate_string_tables(&mut b, tables);

    for t in 0..tables.len() {
        for r in 0..tables[t].roots.len() {
            let e = tables[t].roots[r];
            match tables[t].entries[e].kind {
                ElementKind::Element => {
                    handle_element(&mut b, tables, t, e, true)?;
                }
                ElementKind::SimpleType => handle_simple_type(&mut b, tables, t, e)?,
                ElementKind::ComplexType => handle_complex_type(&mut b, tables, t, e)?,
                // groups and attribute groups matter only when referenced;
                // imports and the like carry no grammars of their own
                _ => {}
            }
        }
    }

    b.global_elements
        .sort_by(|a, c| compare_qname_id(a.0, c.0, &b.uri_table));
    debug!(
        "schema generation done: {} grammars, {} simple types, {} global elements",
        b.grammar_table.count(),
        b.simple_types.len(),
        b.global_elements.len()
    );

    Ok(ExiSchema {
        uri_table: b.uri_table,
        grammar_table: b.grammar_table,
        simple_types: b.simple_types,
        enum_table: b.enum_table,
        global_elements: b.global_elements,
        empty_grammar: b.empty_gr_index,
    })
}

/// Gives every XSD built-in its two-rule typed-content grammar and links
/// it from the initial local-name partition.
pub fn register_built_in_type_grammars(uri_table: &mut UriTable, grammar_table: &mut GrammarTable) {
    for type_id in 0..XSD_INITIAL_LOCAL_NAMES.len() {
        let mut g = ExiGrammar::new(GrammarKind::SchemaInformed);
        let mut r0 = GrammarRule::new();
        r0.parts[0].push(Production::with_qname(EventType::Characters, 1, type_id, QNameId::VOID));
        r0.recompute_bits();
        let mut r1 = GrammarRule::new();
        r1.parts[0].push(Production::new(EventType::EndElement, GR_VOID_NON_TERMINAL));
        r1.recompute_bits();
        g.rules.push(r0);
        g.rules.push(r1);
        g.has_content2 = true;

        let idx = grammar_table.add(g);
        uri_table.uris[URI_XSD_ID].ln_table[type_id].type_grammar = idx;
    }
}

/// Interns every namespace and declared name before any grammar is built,
/// sorting fresh local-name partitions so qname-id comparisons follow
/// lexicographic order.
fn populate_string_tables(b: &mut Builder, tables: &mut [TreeTable]) {
    for table in tables.iter_mut() {
        let ns = table.global_defs.target_ns.clone();
        let id = match b.uri_table.lookup_uri(&ns) {
            Some(id) => id,
            None => b.uri_table.add_uri(ns),
        };
        table.global_defs.target_ns_id = id;
    }

    let mut names: HashMap<usize, Vec<String>> = HashMap::new();
    for table in tables.iter() {
        let target = table.global_defs.target_ns_id;
        for (i, entry) in table.entries.iter().enumerate() {
            let Some(name) = entry.attr(AttributeTag::Name) else {
                continue;
            };
            let is_global = table.roots.contains(&i);
            let uri_id = match entry.kind {
                ElementKind::Element => {
                    if is_global || table.global_defs.elem_form_qualified || entry.attr_is(AttributeTag::Form, "qualified") {
                        target
                    } else {
                        URI_EMPTY_ID
                    }
                }
                ElementKind::Attribute => {
                    if is_global || table.global_defs.attr_form_qualified || entry.attr_is(AttributeTag::Form, "qualified") {
                        target
                    } else {
                        URI_EMPTY_ID
                    }
                }
                ElementKind::SimpleType | ElementKind::ComplexType | ElementKind::Group | ElementKind::AttributeGroup => {
                    target
                }
                _ => continue,
            };
            names.entry(uri_id).or_default().push(name.to_owned());
        }
    }

    for (uri_id, mut lns) in names {
        lns.sort();
        lns.dedup();
        for ln in lns {
            if b.uri_table.lookup_ln(uri_id, &ln).is_none() {
                b.uri_table.add_ln(uri_id, ln);
            }
        }
    }

}

/// QName attribute values arrive either bare or in Clark notation
/// ("{uri}name"). Bare names resolve to the XSD namespace when they name a
/// built-in, otherwise to the document's target namespace.
fn resolve_type_qname(b: &Builder, table: &TreeTable, literal: &str) -> Result<QNameId> {
    let (uri_id, name) = if let Some(rest) = literal.strip_prefix('{') {
        let Some((uri, name)) = rest.split_once('}') else {
            return err_exit_code(ErrorKind::LanguageElemUnknown, "malformed qname literal");
        };
        let uri_id = b
            .uri_table
            .lookup_uri(uri)
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::LanguageElemUnknown, "qname names an unknown namespace"))?;
        (uri_id, name)
    } else if XSD_INITIAL_LOCAL_NAMES.contains(&literal) {
        (URI_XSD_ID, literal)
    } else {
        (table.global_defs.target_ns_id, literal)
    };

    let ln = b
        .uri_table
        .lookup_ln(uri_id, name)
        .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::LnNotFound, "qname names an undeclared local name"))?;
    Ok(QNameId { uri: uri_id, ln })
}

fn element_qname(b: &Builder, table: &TreeTable, entry_idx: usize, is_global: bool) -> Result<QNameId> {
    let entry = &table.entries[entry_idx];
    let name = entry
        .attr(AttributeTag::Name)
        .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "element declaration without a name"))?;
    let uri_id = if is_global || table.global_defs.elem_form_qualified || entry.attr_is(AttributeTag::Form, "qualified") {
        table.global_defs.target_ns_id
    } else {
        URI_EMPTY_ID
    };
    let ln = b
        .uri_table
        .lookup_ln(uri_id, name)
        .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::LnNotFound, "element name missing from the string tables"))?;
    Ok(QNameId { uri: uri_id, ln })
}

/// Locates the global declaration of `kind` named by `qname` anywhere in
/// the forest.
fn find_global(b: &Builder, tables: &[TreeTable], kind: ElementKind, qname: QNameId) -> Option<(usize, usize)> {
    let name = &b.uri_table.uris[qname.uri].ln_table[qname.ln].ln;
    for (t, table) in tables.iter().enumerate() {
        if table.global_defs.target_ns_id != qname.uri {
            continue;
        }
        for &r in &table.roots {
            if table.entries[r].kind == kind && table.entries[r].attr(AttributeTag::Name) == Some(name) {
                return Some((t, r));
            }
        }
    }
    None
}

fn parse_occurs_attrs(table: &TreeTable, entry_idx: usize) -> Result<(usize, Option<usize>)> {
    let entry = &table.entries[entry_idx];
    let min = match entry.attr(AttributeTag::MinOccurs) {
        None | Some("") => 1,
        Some(s) => s
            .parse::<usize>()
            .map_err(|_| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "bad minOccurs"))?,
    };
    let max = match entry.attr(AttributeTag::MaxOccurs) {
        None | Some("") => Some(1),
        Some("unbounded") => None,
        Some(s) => Some(
            s.parse::<usize>()
                .map_err(|_| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "bad maxOccurs"))?,
        ),
    };
    if let Some(max) = max {
        if max < min {
            return err_exit_code(ErrorKind::InvalidConfig, "maxOccurs below minOccurs");
        }
    }
    Ok((min, max))
}

fn children_of(table: &TreeTable, entry_idx: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut cur = table.entries[entry_idx].child;
    while let Some(c) = cur {
        out.push(c);
        cur = table.entries[c].next;
    }
    out
}

/// Converts a finished proto-grammar (or the shared empty grammar when
/// there is none) into the grammar table.
fn store_grammar(b: &mut Builder, pg: Option<ProtoGrammar>, nillable: bool) -> usize {
    match pg {
        None => b.empty_gr_index,
        Some(mut pg) => {
            normalize(&mut pg);
            assign_codes(&mut pg, &b.uri_table);
            let mut g = convert_proto_grammar(&pg);
            g.nillable = nillable;
            b.grammar_table.add(g)
        }
    }
}

/// Writes a finished grammar into the slot a recursive type reserved.
fn fill_placeholder(b: &mut Builder, slot: usize, pg: Option<ProtoGrammar>, nillable: bool) {
    if let Some(mut pg) = pg {
        normalize(&mut pg);
        assign_codes(&mut pg, &b.uri_table);
        let mut g = convert_proto_grammar(&pg);
        g.nillable = nillable;
        b.grammar_table.grammars[slot] = g;
    }
}

fn handle_element(b: &mut Builder, tables: &mut [TreeTable], t: usize, e: usize, is_global: bool) -> Result<usize> {
    let has_name = tables[t].entries[e].attr(AttributeTag::Name).is_some();
    if !has_name {
        // ref="..." to a global element declared elsewhere
        let ref_literal = tables[t].entries[e]
            .attr(AttributeTag::Ref)
            .map(str::to_owned)
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "element without name or ref"))?;
        let ref_qname = resolve_type_qname(b, &tables[t], &ref_literal)?;
        let (rt, re) = find_global(b, tables, ElementKind::Element, ref_qname)
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::LnNotFound, "element ref has no global declaration"))?;
        return handle_element(b, tables, rt, re, true);
    }

    let el_qname = element_qname(b, &tables[t], e, is_global)?;

    if is_global {
        let existing = b.uri_table.ln_entry(el_qname).elem_grammar;
        if existing != INDEX_MAX {
            return Ok(existing);
        }
    }

    let nillable = tables[t].entries[e].attr_is(AttributeTag::Nillable, "true");
    let type_literal = tables[t].entries[e].attr(AttributeTag::Type).map(str::to_owned);
    let child = tables[t].entries[e].child;

    let gr_index;

    match type_literal {
        None => {
            let Some(child_idx) = child else {
                // <xs:element name="unconstrained"/> has xs:anyType
                let any_type = b.uri_table.uris[URI_XSD_ID]
                    .ln_table
                    .iter()
                    .position(|l| l.ln == "anyType")
                    .expect("anyType is pre-populated");
                let idx = b.uri_table.uris[URI_XSD_ID].ln_table[any_type].type_grammar;
                b.uri_table.ln_entry_mut(el_qname).elem_grammar = idx;
                register_global_element(b, tables, t, e, el_qname, idx);
                return Ok(idx);
            };

            let child_kind = tables[t].entries[child_idx].kind;
            let pg = match child_kind {
                ElementKind::SimpleType => Some(get_simple_type_pg(b, tables, t, child_idx)?),
                ElementKind::ComplexType => get_complex_type_pg(b, tables, t, child_idx)?,
                _ => return err_exit_code(ErrorKind::InvalidConfig, "unexpected child of an element declaration"),
            };

            let loop_slot = tables[t].entries[child_idx].loop_detection;
            if loop_slot != 0 && loop_slot != INDEX_MAX {
                gr_index = loop_slot;
                fill_placeholder(b, loop_slot, pg, nillable);
            } else {
                gr_index = store_grammar(b, pg, nillable);
            }
            if is_global {
                b.uri_table.ln_entry_mut(el_qname).elem_grammar = gr_index;
            }
        }
        Some(literal) => {
            let type_qname = resolve_type_qname(b, &tables[t], &literal)?;

            if b.uri_table.ln_entry(type_qname).type_grammar == INDEX_MAX {
                // the named type has not been compiled yet
                if let Some((tt, te)) = find_global(b, tables, ElementKind::ComplexType, type_qname) {
                    handle_complex_type(b, tables, tt, te)?;
                } else if let Some((tt, te)) = find_global(b, tables, ElementKind::SimpleType, type_qname) {
                    handle_simple_type(b, tables, tt, te)?;
                } else {
                    return err_exit_code(ErrorKind::LnNotFound, "element type has no declaration");
                }
            }

            gr_index = b.uri_table.ln_entry(type_qname).type_grammar;
            if gr_index == INDEX_MAX {
                return err_exit_code(ErrorKind::InconsistentState, "type grammar did not materialize");
            }
            if is_global {
                b.uri_table.ln_entry_mut(el_qname).elem_grammar = gr_index;
            }
        }
    }

    register_global_element(b, tables, t, e, el_qname, gr_index);
    Ok(gr_index)
}

fn register_global_element(b: &mut Builder, tables: &mut [TreeTable], t: usize, e: usize, qname: QNameId, gr_index: usize) {
    let is_global = tables[t].roots.contains(&e);
    if is_global && tables[t].entries[e].loop_detection == 0 {
        b.global_elements.push((qname, gr_index));
        tables[t].entries[e].loop_detection = INDEX_MAX;
    }
}

fn handle_simple_type(b: &mut Builder, tables: &mut [TreeTable], t: usize, e: usize) -> Result<()> {
    let name = tables[t].entries[e]
        .attr(AttributeTag::Name)
        .map(str::to_owned)
        .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "global simple types must have names"))?;

    let target = tables[t].global_defs.target_ns_id;
    let ln = b
        .uri_table
        .lookup_ln(target, &name)
        .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::LnNotFound, "simple type name missing from the string tables"))?;
    let qname = QNameId { uri: target, ln };

    if b.uri_table.ln_entry(qname).type_grammar != INDEX_MAX {
        return Ok(());
    }

    let type_id = simple_type_id(b, tables, t, e)?;
    b.type_ids.insert(qname, type_id);

    let pg = create_simple_type_grammar(type_id);
    let idx = store_grammar(b, Some(pg), false);
    b.uri_table.ln_entry_mut(qname).type_grammar = idx;
    Ok(())
}

/// Derives (or reuses) the simple-type table row for a simpleType entry:
/// restriction facets, list item types and unions all collapse into one
/// value-class row.
fn simple_type_id(b: &mut Builder, tables: &[TreeTable], t: usize, e: usize) -> Result<usize> {
    let kids = children_of(&tables[t], e);
    for &k in &kids {
        match tables[t].entries[k].kind {
            ElementKind::Restriction => {
                let base_literal = tables[t].entries[k]
                    .attr(AttributeTag::Base)
                    .map(str::to_owned)
                    .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "restriction without base"))?;
                let base_qname = resolve_type_qname(b, &tables[t], &base_literal)?;
                let base_id = lookup_type_id(b, tables, base_qname)?;
                return restricted_type_id(b, tables, t, k, base_id);
            }
            ElementKind::List => {
                let item_id = match tables[t].entries[k].attr(AttributeTag::ItemType) {
                    Some(item) => {
                        let item = item.to_owned();
                        let q = resolve_type_qname(b, &tables[t], &item)?;
                        lookup_type_id(b, tables, q)?
                    }
                    None => {
                        let inner = children_of(&tables[t], k)
                            .into_iter()
                            .find(|&c| tables[t].entries[c].kind == ElementKind::SimpleType)
                            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "list without item type"))?;
                        simple_type_id(b, tables, t, inner)?
                    }
                };
                b.simple_types.push(SimpleType::of(TypeClass::List { item_type: item_id }));
                return Ok(b.simple_types.len() - 1);
            }
            ElementKind::Union => {
                // union values travel as strings
                b.simple_types.push(SimpleType::of(TypeClass::String));
                return Ok(b.simple_types.len() - 1);
            }
            _ => {}
        }
    }
    err_exit_code(ErrorKind::InvalidConfig, "simple type without restriction, list or union")
}

fn lookup_type_id(b: &mut Builder, tables: &[TreeTable], qname: QNameId) -> Result<usize> {
    if let Some(&id) = b.type_ids.get(&qname) {
        return Ok(id);
    }
    // a global simple type that has not been visited yet
    if let Some((tt, te)) = find_global(b, tables, ElementKind::SimpleType, qname) {
        let id = simple_type_id(b, tables, tt, te)?;
        b.type_ids.insert(qname, id);
        return Ok(id);
    }
    err_exit_code(ErrorKind::LnNotFound, "type reference has no simple-type row")
}

/// Applies restriction facets on top of the base row: enumerations build an
/// enum table row; inclusive integer bounds tight enough for a fixed width
/// turn into a bounded small integer.
fn restricted_type_id(b: &mut Builder, tables: &[TreeTable], t: usize, restriction: usize, base_id: usize) -> Result<usize> {
    let kids = children_of(&tables[t], restriction);
    let base_class = b.simple_types[base_id].class;

    let mut enum_values: Vec<ExiValue> = Vec::new();
    let mut min_inclusive: Option<i64> = None;
    let mut max_inclusive: Option<i64> = None;

    for &k in &kids {
        let entry = &tables[t].entries[k];
        let value = entry.attr(AttributeTag::Value).unwrap_or("");
        match entry.kind {
            ElementKind::Enumeration => enum_values.push(parse_enum_value(base_class, value)?),
            ElementKind::MinInclusive => min_inclusive = value.parse().ok(),
            ElementKind::MaxInclusive => max_inclusive = value.parse().ok(),
            // patterns and length facets do not change the representation
            _ => {}
        }
    }

    if !enum_values.is_empty() {
        b.enum_table.push(EnumDefinition {
            type_id: base_id,
            values: enum_values,
        });
        let enum_id = b.enum_table.len() - 1;
        b.simple_types.push(SimpleType {
            class: base_class,
            enum_id: Some(enum_id),
        });
        return Ok(b.simple_types.len() - 1);
    }

    if let (Some(lo), Some(hi)) = (min_inclusive, max_inclusive) {
        let integral = matches!(
            base_class,
            TypeClass::Integer | TypeClass::NonNegativeInteger | TypeClass::SmallInteger { .. }
        );
        if integral && hi >= lo && (hi - lo) < 4096 {
            b.simple_types.push(SimpleType::of(TypeClass::SmallInteger {
                lower: lo,
                width: bits_needed((hi - lo) as u64),
            }));
            return Ok(b.simple_types.len() - 1);
        }
    }

    Ok(base_id)
}

fn parse_enum_value(class: TypeClass, literal: &str) -> Result<ExiValue> {
    let v = match class {
        TypeClass::Integer | TypeClass::SmallInteger { .. } => ExiValue::Integer(
            literal
                .parse()
                .map_err(|_| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "bad integer enumeration"))?,
        ),
        TypeClass::NonNegativeInteger => ExiValue::NonNegativeInteger(
            literal
                .parse()
                .map_err(|_| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "bad integer enumeration"))?,
        ),
        TypeClass::Boolean => ExiValue::Boolean(literal == "true" || literal == "1"),
        _ => ExiValue::String(literal.to_owned()),
    };
    Ok(v)
}

fn handle_complex_type(b: &mut Builder, tables: &mut [TreeTable], t: usize, e: usize) -> Result<()> {
    let name = tables[t].entries[e]
        .attr(AttributeTag::Name)
        .map(str::to_owned)
        .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "global complex types must have names"))?;

    let target = tables[t].global_defs.target_ns_id;
    let ln = b
        .uri_table
        .lookup_ln(target, &name)
        .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::LnNotFound, "complex type name missing from the string tables"))?;
    let qname = QNameId { uri: target, ln };

    if b.uri_table.ln_entry(qname).type_grammar != INDEX_MAX {
        return Ok(());
    }

    let pg = get_complex_type_pg(b, tables, t, e)?;

    let loop_slot = tables[t].entries[e].loop_detection;
    let gr_index = if loop_slot != 0 && loop_slot != INDEX_MAX {
        fill_placeholder(b, loop_slot, pg, false);
        loop_slot
    } else {
        store_grammar(b, pg, false)
    };

    b.uri_table.ln_entry_mut(qname).type_grammar = gr_index;

    mark_named_sub_types(b, tables, t, e, gr_index)?;
    Ok(())
}

/// Derivation flags feeding the strict-mode xsi:type rules: a restriction
/// marks its base as having named sub-types, an extension marks the
/// derived type itself.
fn mark_named_sub_types(b: &mut Builder, tables: &[TreeTable], t: usize, e: usize, own_grammar: usize) -> Result<()> {
    let Some(content) = tables[t].entries[e].child else {
        return Ok(());
    };
    if !matches!(
        tables[t].entries[content].kind,
        ElementKind::SimpleContent | ElementKind::ComplexContent
    ) {
        return Ok(());
    }
    let Some(derivation) = tables[t].entries[content].child else {
        return Ok(());
    };

    match tables[t].entries[derivation].kind {
        ElementKind::Restriction => {
            if let Some(base) = tables[t].entries[derivation].attr(AttributeTag::Base) {
                let base = base.to_owned();
                let base_qname = resolve_type_qname(b, &tables[t], &base)?;
                let base_gr = b.uri_table.ln_entry(base_qname).type_grammar;
                if base_gr != INDEX_MAX {
                    b.grammar_table.grammars[base_gr].named_sub_type_or_union = true;
                }
            }
        }
        ElementKind::Extension => {
            b.grammar_table.grammars[own_grammar].named_sub_type_or_union = true;
        }
        _ => {}
    }
    Ok(())
}

/// Builds the proto-grammar of a complexType entry, reserving a grammar
/// slot instead of recursing forever when the type reaches itself.
fn get_complex_type_pg(b: &mut Builder, tables: &mut [TreeTable], t: usize, e: usize) -> Result<Option<ProtoGrammar>> {
    match tables[t].entries[e].loop_detection {
        0 => tables[t].entries[e].loop_detection = INDEX_MAX,
        INDEX_MAX => {
            // second visit: reserve the slot the real grammar will fill
            let slot = b.grammar_table.add(ExiGrammar::empty_type_grammar());
            tables[t].entries[e].loop_detection = slot;
            return Ok(None);
        }
        _ => return Ok(None),
    }

    let is_mixed = tables[t].entries[e].attr_is(AttributeTag::Mixed, "true");

    let mut content = get_content_type_pg(b, tables, t, e)?;
    let mut attr_uses = get_attribute_use_pgs(b, tables, t, e)?;

    attr_uses.grammars.sort_by(|x, y| {
        compare_qname_id(x.rules[0].prods[0].qname_id, y.rules[0].prods[0].qname_id, &b.uri_table)
    });

    if let Some(wildcard_ns) = attr_uses.wildcard {
        // the attribute wildcard rides on every attribute-use start rule
        if attr_uses.grammars.is_empty() {
            let mut g = ProtoGrammar::with_rules(0);
            g.add_rule().add_ee();
            attr_uses.grammars.push(g);
        }
        let prods: Vec<Production> = if wildcard_ns.is_empty()
            || (wildcard_ns.len() == 1 && (wildcard_ns[0] == "##any" || wildcard_ns[0] == "##other"))
        {
            vec![Production::new(EventType::AttributeAll, 0)]
        } else {
            let mut v = Vec::new();
            for ns in &wildcard_ns {
                let uri_id = b
                    .uri_table
                    .lookup_uri(ns)
                    .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::LanguageElemUnknown, "wildcard namespace unknown"))?;
                v.push(Production::with_qname(
                    EventType::AttributeUri,
                    0,
                    INDEX_MAX,
                    QNameId { uri: uri_id, ln: INDEX_MAX },
                ));
            }
            v
        };
        for g in &mut attr_uses.grammars {
            g.rules[0].prods.extend(prods.iter().copied());
        }
    }

    if content.is_none() && attr_uses.grammars.is_empty() {
        return Ok(None);
    }

    let pg = create_complex_type_grammar(&attr_uses.grammars, content.as_mut(), is_mixed)?;
    Ok(Some(pg))
}

/// The content model particle of a complex type (or of a derivation step).
fn get_content_type_pg(b: &mut Builder, tables: &mut [TreeTable], t: usize, e: usize) -> Result<Option<ProtoGrammar>> {
    for k in children_of(&tables[t], e) {
        match tables[t].entries[k].kind {
            ElementKind::Sequence | ElementKind::Choice | ElementKind::All => {
                return Ok(Some(model_group_particle_pg(b, tables, t, k)?));
            }
            ElementKind::Group => {
                let (gt, ge) = deref_group(b, tables, t, k, ElementKind::Group)?;
                let inner = children_of(&tables[gt], ge)
                    .into_iter()
                    .find(|&c| {
                        matches!(
                            tables[gt].entries[c].kind,
                            ElementKind::Sequence | ElementKind::Choice | ElementKind::All
                        )
                    })
                    .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "group without a model group"))?;
                return Ok(Some(model_group_particle_pg(b, tables, gt, inner)?));
            }
            ElementKind::SimpleContent => {
                let derivation = tables[t].entries[k]
                    .child
                    .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "empty simpleContent"))?;
                let base = tables[t].entries[derivation]
                    .attr(AttributeTag::Base)
                    .map(str::to_owned)
                    .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "derivation without base"))?;
                let base_qname = resolve_type_qname(b, &tables[t], &base)?;
                let type_id = lookup_type_id(b, tables, base_qname)?;
                return Ok(Some(create_simple_type_grammar(type_id)));
            }
            ElementKind::ComplexContent => {
                let derivation = tables[t].entries[k]
                    .child
                    .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "empty complexContent"))?;
                return complex_derivation_content_pg(b, tables, t, derivation);
            }
            _ => {}
        }
    }
    Ok(None)
}

/// Content of a complexContent restriction/extension. A restriction stands
/// on its own content model; an extension concatenates the base type's
/// content with its own.
fn complex_derivation_content_pg(
    b: &mut Builder,
    tables: &mut [TreeTable],
    t: usize,
    derivation: usize,
) -> Result<Option<ProtoGrammar>> {
    let kind = tables[t].entries[derivation].kind;
    let own = get_content_type_pg(b, tables, t, derivation)?;

    match kind {
        ElementKind::Restriction => Ok(own),
        ElementKind::Extension => {
            let base_entry = match tables[t].entries[derivation].supertype {
                Some(link) => Some(link),
                None => {
                    let base = tables[t].entries[derivation]
                        .attr(AttributeTag::Base)
                        .map(str::to_owned)
                        .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "extension without base"))?;
                    let base_qname = resolve_type_qname(b, &tables[t], &base)?;
                    find_global(b, tables, ElementKind::ComplexType, base_qname)
                }
            };
            let Some((bt, be)) = base_entry else {
                return err_exit_code(ErrorKind::LnNotFound, "extension base has no declaration");
            };

            let base_content = get_content_type_pg(b, tables, bt, be)?;
            match (base_content, own) {
                (None, own) => Ok(own),
                (Some(base), None) => Ok(Some(base)),
                (Some(mut base), Some(own)) => {
                    concatenate(&mut base, &own)?;
                    Ok(Some(base))
                }
            }
        }
        _ => err_exit_code(ErrorKind::InvalidConfig, "complexContent without derivation"),
    }
}

/// A model-group entry as a particle: the group grammar repeated per its
/// occurrence bounds.
fn model_group_particle_pg(b: &mut Builder, tables: &mut [TreeTable], t: usize, e: usize) -> Result<ProtoGrammar> {
    let (min, max) = parse_occurs_attrs(&tables[t], e)?;
    let mut term = model_group_pg(b, tables, t, e)?;
    create_particle_grammar(min, max, &mut term)
}

fn model_group_pg(b: &mut Builder, tables: &mut [TreeTable], t: usize, e: usize) -> Result<ProtoGrammar> {
    let kind = tables[t].entries[e].kind;
    let mut parts: Vec<ProtoGrammar> = Vec::new();

    for k in children_of(&tables[t], e) {
        let part = match tables[t].entries[k].kind {
            ElementKind::Element => element_term_particle_pg(b, tables, t, k)?,
            ElementKind::Sequence | ElementKind::Choice => model_group_particle_pg(b, tables, t, k)?,
            ElementKind::Any => {
                let (min, max) = parse_occurs_attrs(&tables[t], k)?;
                let namespaces = wildcard_namespaces(&tables[t], k);
                let mut term = create_wildcard_term_grammar(&namespaces, &b.uri_table)?;
                create_particle_grammar(min, max, &mut term)?
            }
            ElementKind::Group => {
                let (gt, ge) = deref_group(b, tables, t, k, ElementKind::Group)?;
                let inner = children_of(&tables[gt], ge)
                    .into_iter()
                    .find(|&c| {
                        matches!(
                            tables[gt].entries[c].kind,
                            ElementKind::Sequence | ElementKind::Choice | ElementKind::All
                        )
                    })
                    .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "group without a model group"))?;
                model_group_particle_pg(b, tables, gt, inner)?
            }
            ElementKind::All => return err_exit_code(ErrorKind::NotImplemented, "the all model group"),
            _ => continue,
        };
        parts.push(part);
    }

    match kind {
        ElementKind::Sequence => create_sequence_grammar(&parts),
        ElementKind::Choice => create_choice_grammar(&parts),
        ElementKind::All => err_exit_code(ErrorKind::NotImplemented, "the all model group"),
        _ => err_exit_code(ErrorKind::InvalidConfig, "not a model group"),
    }
}

fn element_term_particle_pg(b: &mut Builder, tables: &mut [TreeTable], t: usize, e: usize) -> Result<ProtoGrammar> {
    let (min, max) = parse_occurs_attrs(&tables[t], e)?;

    let gr_index = handle_element(b, tables, t, e, false)?;

    let qname = if tables[t].entries[e].attr(AttributeTag::Name).is_some() {
        element_qname(b, &tables[t], e, false)?
    } else {
        let ref_literal = tables[t].entries[e]
            .attr(AttributeTag::Ref)
            .map(str::to_owned)
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "element without name or ref"))?;
        resolve_type_qname(b, &tables[t], &ref_literal)?
    };

    let mut term = create_element_term_grammar(qname, gr_index);
    create_particle_grammar(min, max, &mut term)
}

fn wildcard_namespaces(table: &TreeTable, e: usize) -> Vec<String> {
    match table.entries[e].attr(AttributeTag::Namespace) {
        None => Vec::new(),
        Some(ns) => ns.split_whitespace().map(str::to_owned).collect(),
    }
}

fn deref_group(b: &Builder, tables: &[TreeTable], t: usize, e: usize, kind: ElementKind) -> Result<(usize, usize)> {
    let ref_literal = tables[t].entries[e]
        .attr(AttributeTag::Ref)
        .map(str::to_owned)
        .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "group reference without ref"))?;
    let qname = resolve_type_qname(b, &tables[t], &ref_literal)?;
    find_global(b, tables, kind, qname)
        .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::LnNotFound, "group ref has no global declaration"))
}

struct AttrUses {
    grammars: Vec<ProtoGrammar>,
    /// Namespace list of an anyAttribute wildcard, when present
    wildcard: Option<Vec<String>>,
}

/// Collects the attribute uses of a complex type, walking into derivation
/// steps and referenced attribute groups; duplicate names keep their first
/// occurrence.
fn get_attribute_use_pgs(b: &mut Builder, tables: &mut [TreeTable], t: usize, e: usize) -> Result<AttrUses> {
    let mut uses = AttrUses {
        grammars: Vec::new(),
        wildcard: None,
    };
    let mut seen_names: Vec<String> = Vec::new();
    collect_attr_uses(b, tables, t, e, &mut uses, &mut seen_names)?;
    Ok(uses)
}

fn collect_attr_uses(
    b: &mut Builder,
    tables: &mut [TreeTable],
    t: usize,
    e: usize,
    uses: &mut AttrUses,
    seen_names: &mut Vec<String>,
) -> Result<()> {
    for k in children_of(&tables[t], e) {
        match tables[t].entries[k].kind {
            ElementKind::Attribute => {
                if tables[t].entries[k].attr_is(AttributeTag::Use, "prohibited") {
                    continue;
                }
                let name = match tables[t].entries[k].attr(AttributeTag::Name) {
                    Some(n) => n.to_owned(),
                    None => {
                        let r = tables[t].entries[k]
                            .attr(AttributeTag::Ref)
                            .map(str::to_owned)
                            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InvalidConfig, "attribute without name or ref"))?;
                        r.rsplit_once('}').map(|(_, n)| n.to_owned()).unwrap_or(r)
                    }
                };
                if seen_names.contains(&name) {
                    continue;
                }
                seen_names.push(name.clone());

                let required = tables[t].entries[k].attr_is(AttributeTag::Use, "required");
                let qualified =
                    tables[t].global_defs.attr_form_qualified || tables[t].entries[k].attr_is(AttributeTag::Form, "qualified");
                let uri_id = if qualified { tables[t].global_defs.target_ns_id } else { URI_EMPTY_ID };
                let ln = b
                    .uri_table
                    .lookup_ln(uri_id, &name)
                    .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::LnNotFound, "attribute name missing from the string tables"))?;
                let qname = QNameId { uri: uri_id, ln };

                let type_id = match tables[t].entries[k].attr(AttributeTag::Type).map(str::to_owned) {
                    Some(literal) => {
                        let q = resolve_type_qname(b, &tables[t], &literal)?;
                        lookup_type_id(b, tables, q)?
                    }
                    None => match children_of(&tables[t], k)
                        .into_iter()
                        .find(|&c| tables[t].entries[c].kind == ElementKind::SimpleType)
                    {
                        Some(anon) => simple_type_id(b, tables, t, anon)?,
                        None => b.type_ids[&QNameId {
                            uri: URI_XSD_ID,
                            ln: XSD_INITIAL_LOCAL_NAMES.iter().position(|n| *n == "string").unwrap(),
                        }],
                    },
                };

                uses.grammars.push(create_attribute_use_grammar(required, type_id, qname));
            }
            ElementKind::AttributeGroup => {
                let (gt, ge) = deref_group(b, tables, t, k, ElementKind::AttributeGroup)?;
                collect_attr_uses(b, tables, gt, ge, uses, seen_names)?;
            }
            ElementKind::AnyAttribute => {
                uses.wildcard = Some(wildcard_namespaces(&tables[t], k));
            }
            ElementKind::SimpleContent | ElementKind::ComplexContent => {
                collect_attr_uses(b, tables, t, k, uses, seen_names)?;
            }
            ElementKind::Restriction | ElementKind::Extension => {
                collect_attr_uses(b, tables, t, k, uses, seen_names)?;
            }
            _ => {}
        }
    }

    Ok(())
}

/// A simpleType child of an element declaration: its content grammar.
fn get_simple_type_pg(b: &mut Builder, tables: &mut [TreeTable], t: usize, e: usize) -> Result<ProtoGrammar> {
    let type_id = simple_type_id(b, tables, t, e)?;
    Ok(create_simple_type_grammar(type_id))
}
