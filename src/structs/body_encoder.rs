/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use log::debug;

use std::io::Write;

use crate::consts::*;
use crate::exi_error::{err_exit_code, ErrorKind, Result};
use crate::helpers::{bits_needed, compact_id_bits};
use crate::structs::bit_writer::BitWriter;
use crate::structs::events::EventType;
use crate::structs::exi_value::ExiValue;
use crate::structs::grammar::{no_production_match, GrammarRule, Production};
use crate::structs::schema::TypeClass;
use crate::structs::stream::StreamContext;
use crate::structs::string_tables::QNameId;

/// Locates the production for an outgoing event in the active rule,
/// checking the smallest event codes first, and returns (part, index, copy).
/// For qname-bearing events `resolved` holds the table ids when the qname
/// is already interned; an un-interned qname can only leave through a
/// wildcard production.
fn find_production(
    ctx: &StreamContext,
    kinds: &[EventType],
    resolved: Option<QNameId>,
    out_uri_id: Option<usize>,
) -> Result<(usize, usize, Production)> {
    let grammar = ctx.top_grammar()?;
    let rule = grammar.rule(ctx.non_term)?;

    for part in 0..3 {
        let count = rule.parts[part].len();
        for j in 0..count {
            let idx = count - 1 - j; // code digits ascending
            let p = &rule.parts[part][idx];
            if !kinds.contains(&p.event) {
                continue;
            }
            let hit = match p.event {
                EventType::StartElementQName | EventType::AttributeQName => resolved == Some(p.qname_id),
                EventType::StartElementUri | EventType::AttributeUri => out_uri_id == Some(p.qname_id.uri),
                _ => true,
            };
            if hit {
                return Ok((part, idx, *p));
            }
        }
    }

    no_production_match("no production accepts the outgoing event")
}

/// Emits the event code of `parts[part][idx]`: the escape digit of every
/// earlier part, then the production's own digit.
fn write_event_code<W: Write>(writer: &mut BitWriter<W>, rule: &GrammarRule, part: usize, idx: usize) -> Result<()> {
    for k in 0..part {
        writer.write_n_bits(rule.parts[k].len() as u32, rule.bits[k])?;
    }
    writer.write_n_bits(rule.code_of(part, idx), rule.bits[part])
}

pub fn encode_start_document<W: Write>(writer: &mut BitWriter<W>, ctx: &mut StreamContext) -> Result<()> {
    let (part, idx, prod) = find_production(ctx, &[EventType::StartDocument], None, None)?;
    write_event_code(writer, ctx.top_grammar()?.rule(ctx.non_term)?, part, idx)?;
    ctx.non_term = prod.non_term;
    Ok(())
}

pub fn encode_end_document<W: Write>(writer: &mut BitWriter<W>, ctx: &mut StreamContext) -> Result<()> {
    let (part, idx, _) = find_production(ctx, &[EventType::EndDocument], None, None)?;
    write_event_code(writer, ctx.top_grammar()?.rule(ctx.non_term)?, part, idx)?;
    ctx.stack.pop()?;
    ctx.non_term = GR_VOID_NON_TERMINAL;
    if !ctx.stack.is_empty() {
        return err_exit_code(ErrorKind::InconsistentState, "endDocument with open elements");
    }
    Ok(())
}

pub fn encode_end_element<W: Write>(writer: &mut BitWriter<W>, ctx: &mut StreamContext) -> Result<()> {
    let (part, idx, _) = find_production(ctx, &[EventType::EndElement], None, None)?;
    write_event_code(writer, ctx.top_grammar()?.rule(ctx.non_term)?, part, idx)?;

    if ctx.top_grammar()?.is_built_in_element() && part > 0 {
        let rule_id = ctx.non_term;
        ctx.top_grammar_mut()?.rules[rule_id]
            .insert_zero_production(Production::new(EventType::EndElement, GR_VOID_NON_TERMINAL));
    }

    ctx.pop_element()?;
    Ok(())
}

/// SE with a lexical qname: picks the most specific SE production, writes
/// its code and whatever qname parts the production leaves open, learns in
/// built-in mode and pushes the child grammar. Returns the simple type the
/// child expects as character content, when its grammar pins one down.
pub fn encode_start_element<W: Write>(
    writer: &mut BitWriter<W>,
    ctx: &mut StreamContext,
    uri: &str,
    local_name: &str,
    prefix: Option<&str>,
) -> Result<Option<TypeClass>> {
    let resolved = ctx.uri_table.lookup_qname(uri, local_name);
    let out_uri_id = ctx.uri_table.lookup_uri(uri);

    let kinds = [
        EventType::StartElementQName,
        EventType::StartElementUri,
        EventType::StartElementAll,
    ];
    let (part, idx, prod) = find_production(ctx, &kinds, resolved, out_uri_id)?;
    write_event_code(writer, ctx.top_grammar()?.rule(ctx.non_term)?, part, idx)?;

    debug!("SE({}:{}) via {:?}", uri, local_name, prod.event);

    let qname = match prod.event {
        EventType::StartElementAll => {
            let q = encode_qname(writer, ctx, uri, local_name, prefix)?;
            if ctx.top_grammar()?.is_built_in_element() {
                let rule_id = ctx.non_term;
                ctx.top_grammar_mut()?.rules[rule_id].insert_zero_production(Production::with_qname(
                    EventType::StartElementQName,
                    prod.non_term,
                    INDEX_MAX,
                    q,
                ));
            }
            q
        }
        EventType::StartElementUri => {
            let uri_id = prod.qname_id.uri;
            let ln_id = encode_local_name(writer, ctx, uri_id, local_name)?;
            encode_prefix_component(writer, ctx, uri_id, prefix, false)?;
            QNameId { uri: uri_id, ln: ln_id }
        }
        _ => {
            encode_prefix_component(writer, ctx, prod.qname_id.uri, prefix, false)?;
            prod.qname_id
        }
    };

    let addr = if prod.event == EventType::StartElementQName && prod.type_id != INDEX_MAX {
        ctx.schema_grammar_addr(prod.type_id)?
    } else {
        ctx.element_grammar_for(qname)?
    };
    ctx.non_term = prod.non_term;
    ctx.push_element(addr, qname);

    Ok(expected_content_type(ctx))
}

/// The simple type a CH production in the freshly pushed grammar carries,
/// so the application knows which data entry point to call.
fn expected_content_type(ctx: &StreamContext) -> Option<TypeClass> {
    let grammar = ctx.top_grammar().ok()?;
    let schema = ctx.schema.as_ref()?;
    for rule in &grammar.rules {
        for part in &rule.parts {
            for p in part {
                if p.event == EventType::Characters && p.type_id != INDEX_MAX {
                    return schema.simple_type(p.type_id).map(|s| s.class);
                }
            }
        }
    }
    None
}

/// AT event: code, qname parts left open by the production, learning. The
/// value follows through [`encode_typed_value`]; the matched type is parked
/// in the context until then.
pub fn encode_attribute<W: Write>(
    writer: &mut BitWriter<W>,
    ctx: &mut StreamContext,
    uri: &str,
    local_name: &str,
    prefix: Option<&str>,
) -> Result<()> {
    let resolved = ctx.uri_table.lookup_qname(uri, local_name);
    let out_uri_id = ctx.uri_table.lookup_uri(uri);

    let kinds = [
        EventType::AttributeQName,
        EventType::AttributeUri,
        EventType::AttributeAll,
    ];
    let (part, idx, prod) = find_production(ctx, &kinds, resolved, out_uri_id)?;
    write_event_code(writer, ctx.top_grammar()?.rule(ctx.non_term)?, part, idx)?;

    let qname = match prod.event {
        EventType::AttributeAll => {
            let q = encode_qname(writer, ctx, uri, local_name, prefix)?;
            if ctx.top_grammar()?.is_built_in_element() {
                let rule_id = ctx.non_term;
                ctx.top_grammar_mut()?.rules[rule_id].insert_zero_production(Production::with_qname(
                    EventType::AttributeQName,
                    prod.non_term,
                    INDEX_MAX,
                    q,
                ));
            }
            q
        }
        EventType::AttributeUri => {
            let uri_id = prod.qname_id.uri;
            let ln_id = encode_local_name(writer, ctx, uri_id, local_name)?;
            encode_prefix_component(writer, ctx, uri_id, prefix, false)?;
            QNameId { uri: uri_id, ln: ln_id }
        }
        _ => {
            encode_prefix_component(writer, ctx, prod.qname_id.uri, prefix, false)?;
            prod.qname_id
        }
    };

    ctx.current_value_qname = qname;
    ctx.expect_at_type = prod.type_id;
    ctx.expect_at_data = true;
    ctx.non_term = prod.non_term;
    Ok(())
}

/// Typed content. Routes a pending attribute value or emits a CH event
/// first, then dispatches on the governing simple type.
pub fn encode_typed_value<W: Write>(writer: &mut BitWriter<W>, ctx: &mut StreamContext, value: &ExiValue) -> Result<()> {
    let (type_id, qname) = if ctx.expect_at_data {
        ctx.expect_at_data = false;
        let qname = ctx.current_value_qname;

        // the xsi attributes switch grammars instead of carrying data
        if ctx.schema.is_some() && qname == (QNameId { uri: URI_XSI_ID, ln: XSI_TYPE_ID }) {
            let ExiValue::QName(type_uri, type_ln) = value else {
                return err_exit_code(ErrorKind::InconsistentState, "xsi:type expects a qname value");
            };
            let type_qname = encode_qname(writer, ctx, type_uri, type_ln, None)?;
            ctx.current_value_qname = ctx.current_elem;
            return apply_xsi_type(ctx, type_qname);
        }
        if ctx.schema.is_some() && qname == (QNameId { uri: URI_XSI_ID, ln: XSI_NIL_ID }) {
            let ExiValue::Boolean(nil) = value else {
                return err_exit_code(ErrorKind::InconsistentState, "xsi:nil expects a boolean value");
            };
            writer.write_boolean(*nil)?;
            ctx.current_value_qname = ctx.current_elem;
            if *nil {
                return apply_xsi_nil(ctx);
            }
            return Ok(());
        }

        (ctx.expect_at_type, qname)
    } else {
        let (part, idx, prod) = find_production(ctx, &[EventType::Characters], None, None)?;
        write_event_code(writer, ctx.top_grammar()?.rule(ctx.non_term)?, part, idx)?;

        if ctx.top_grammar()?.is_built_in_element() && part > 0 {
            let rule_id = ctx.non_term;
            ctx.top_grammar_mut()?.rules[rule_id]
                .insert_zero_production(Production::new(EventType::Characters, prod.non_term));
        }

        ctx.non_term = prod.non_term;
        (prod.type_id, ctx.current_elem)
    };

    let result = encode_value_content(writer, ctx, value, type_id, qname);
    ctx.current_value_qname = ctx.current_elem;
    result
}

fn encode_value_content<W: Write>(
    writer: &mut BitWriter<W>,
    ctx: &mut StreamContext,
    value: &ExiValue,
    type_id: usize,
    qname: QNameId,
) -> Result<()> {
    let simple = if ctx.opts.preserve.lexical_values || type_id == INDEX_MAX {
        None
    } else {
        ctx.schema.as_ref().and_then(|s| s.simple_type(type_id)).cloned()
    };

    if let Some(enum_id) = simple.as_ref().and_then(|s| s.enum_id) {
        return encode_enum_value(writer, ctx, enum_id, value);
    }

    let class = simple.map(|s| s.class).unwrap_or(TypeClass::String);

    match (class, value) {
        (TypeClass::String | TypeClass::Untyped, ExiValue::String(s)) => encode_string_value(writer, ctx, qname, s),
        (TypeClass::Boolean, ExiValue::Boolean(b)) => writer.write_boolean(*b),
        (TypeClass::Decimal, ExiValue::Decimal(d)) => writer.write_decimal(d),
        (TypeClass::Float, ExiValue::Float(f)) => writer.write_float(f),
        (TypeClass::Integer, ExiValue::Integer(v)) => writer.write_integer(*v),
        (TypeClass::NonNegativeInteger, ExiValue::Integer(v)) => {
            if *v < 0 {
                return err_exit_code(ErrorKind::InconsistentState, "negative value for a non-negative type");
            }
            writer.write_unsigned_integer(*v as u64)
        }
        (TypeClass::NonNegativeInteger, ExiValue::NonNegativeInteger(v)) => writer.write_unsigned_integer(*v),
        (TypeClass::SmallInteger { lower, width }, ExiValue::Integer(v)) => {
            let offset = v - lower;
            if offset < 0 || offset >= (1i64 << width) {
                return err_exit_code(ErrorKind::InconsistentState, "value outside the bounded range");
            }
            writer.write_n_bits(offset as u32, width)
        }
        (TypeClass::Binary, ExiValue::Binary(bytes)) => writer.write_binary(bytes),
        (TypeClass::DateTime(kind), ExiValue::DateTime(dt)) => {
            if dt.kind != kind {
                return err_exit_code(ErrorKind::InconsistentState, "date-time kind mismatch");
            }
            writer.write_date_time(dt)
        }
        (TypeClass::QName, ExiValue::QName(u, l)) => {
            encode_qname(writer, ctx, u, l, None)?;
            Ok(())
        }
        (TypeClass::List { item_type }, ExiValue::List(items)) => {
            writer.write_unsigned_integer(items.len() as u64)?;
            for item in items {
                encode_value_content(writer, ctx, item, item_type, qname)?;
            }
            Ok(())
        }
        _ => err_exit_code(ErrorKind::InconsistentState, "value does not fit the production's type"),
    }
}

/// Enumerated values are coded as an n-bit index into the sorted facet
/// list, whatever their base representation.
fn encode_enum_value<W: Write>(
    writer: &mut BitWriter<W>,
    ctx: &mut StreamContext,
    enum_id: usize,
    value: &ExiValue,
) -> Result<()> {
    let schema = ctx
        .schema
        .as_ref()
        .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::NullRef, "no schema"))?;
    let def = schema
        .enum_table
        .get(enum_id)
        .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::OutOfBounds, "enum table index"))?;

    let idx = def
        .values
        .iter()
        .position(|v| v == value)
        .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InconsistentState, "value is not one of the enumerated facets"))?;

    let bits = compact_id_bits(def.values.len());
    writer.write_n_bits(idx as u32, bits)
}

fn apply_xsi_type(ctx: &mut StreamContext, type_qname: QNameId) -> Result<()> {
    let gr_index = ctx.uri_table.ln_entry(type_qname).type_grammar;
    if gr_index == INDEX_MAX {
        return err_exit_code(ErrorKind::InvalidExiInput, "xsi:type names an unknown type");
    }
    if ctx.opts.strict && !ctx.top_grammar()?.named_sub_type_or_union {
        return err_exit_code(ErrorKind::StrictViolation, "xsi:type on a type without named sub-types");
    }
    let addr = ctx.schema_grammar_addr(gr_index)?;
    ctx.stack.retarget_top(addr)?;
    ctx.non_term = GR_START_TAG_CONTENT;
    Ok(())
}

fn apply_xsi_nil(ctx: &mut StreamContext) -> Result<()> {
    if ctx.opts.strict && !ctx.top_grammar()?.nillable {
        return err_exit_code(ErrorKind::StrictViolation, "xsi:nil on a non-nillable element");
    }
    let empty = ctx
        .schema
        .as_ref()
        .map(|s| s.empty_grammar)
        .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::NullRef, "no schema"))?;
    let addr = ctx.schema_grammar_addr(empty)?;
    ctx.is_nil_type = true;
    ctx.stack.retarget_top(addr)?;
    ctx.non_term = 0;
    Ok(())
}

pub fn encode_namespace_declaration<W: Write>(
    writer: &mut BitWriter<W>,
    ctx: &mut StreamContext,
    uri: &str,
    prefix: &str,
    is_local_elem: bool,
) -> Result<()> {
    let (part, idx, prod) = find_production(ctx, &[EventType::NamespaceDecl], None, None)?;
    write_event_code(writer, ctx.top_grammar()?.rule(ctx.non_term)?, part, idx)?;

    let uri_id = encode_uri(writer, ctx, uri)?;
    encode_ns_prefix(writer, ctx, uri_id, prefix)?;
    writer.write_boolean(is_local_elem)?;
    ctx.non_term = prod.non_term;
    Ok(())
}

pub fn encode_misc_event<W: Write>(
    writer: &mut BitWriter<W>,
    ctx: &mut StreamContext,
    kind: EventType,
    strings: &[&str],
) -> Result<()> {
    let (part, idx, prod) = find_production(ctx, &[kind], None, None)?;
    write_event_code(writer, ctx.top_grammar()?.rule(ctx.non_term)?, part, idx)?;
    for s in strings {
        writer.write_string(s)?;
    }
    ctx.non_term = prod.non_term;
    Ok(())
}

/// uri partition: hit as id+1, miss as 0 + literal + intern.
pub fn encode_uri<W: Write>(writer: &mut BitWriter<W>, ctx: &mut StreamContext, uri: &str) -> Result<usize> {
    let uri_bits = bits_needed(ctx.uri_table.uris.len() as u64);
    match ctx.uri_table.lookup_uri(uri) {
        Some(id) => {
            writer.write_n_bits(id as u32 + 1, uri_bits)?;
            Ok(id)
        }
        None => {
            writer.write_n_bits(0, uri_bits)?;
            writer.write_string(uri)?;
            Ok(ctx.uri_table.add_uri(uri.to_owned()))
        }
    }
}

/// local-name partition: hit as 0 + compact id, miss as length+1 + literal.
pub fn encode_local_name<W: Write>(
    writer: &mut BitWriter<W>,
    ctx: &mut StreamContext,
    uri_id: usize,
    local_name: &str,
) -> Result<usize> {
    match ctx.uri_table.lookup_ln(uri_id, local_name) {
        Some(id) => {
            writer.write_unsigned_integer(0)?;
            let bits = compact_id_bits(ctx.uri_table.uris[uri_id].ln_table.len());
            writer.write_n_bits(id as u32, bits)?;
            Ok(id)
        }
        None => {
            writer.write_unsigned_integer(local_name.chars().count() as u64 + 1)?;
            writer.write_string_only(local_name)?;
            Ok(ctx.uri_table.add_ln(uri_id, local_name.to_owned()))
        }
    }
}

pub fn encode_qname<W: Write>(
    writer: &mut BitWriter<W>,
    ctx: &mut StreamContext,
    uri: &str,
    local_name: &str,
    prefix: Option<&str>,
) -> Result<QNameId> {
    let uri_id = encode_uri(writer, ctx, uri)?;
    let ln_id = encode_local_name(writer, ctx, uri_id, local_name)?;
    encode_prefix_component(writer, ctx, uri_id, prefix, true)?;
    Ok(QNameId { uri: uri_id, ln: ln_id })
}

/// Prefix digits under preserve.prefixes. An unknown prefix may only ride
/// on a wildcard SE (it is declared by the NS event that follows).
fn encode_prefix_component<W: Write>(
    writer: &mut BitWriter<W>,
    ctx: &mut StreamContext,
    uri_id: usize,
    prefix: Option<&str>,
    wildcard: bool,
) -> Result<()> {
    if !ctx.opts.preserve.prefixes {
        return Ok(());
    }
    let count = ctx.uri_table.uris[uri_id].prefixes.len();
    if count == 0 {
        return Ok(());
    }
    let bits = compact_id_bits(count);
    if bits == 0 {
        return Ok(());
    }
    match prefix.and_then(|p| ctx.uri_table.lookup_prefix(uri_id, p)) {
        Some(id) => writer.write_n_bits(id as u32, bits),
        None => {
            if !wildcard {
                return err_exit_code(ErrorKind::InconsistentState, "undeclared prefix on a qname event");
            }
            writer.write_n_bits(0, bits)
        }
    }
}

/// NS prefix: hit as id+1, miss as 0 + literal + intern.
fn encode_ns_prefix<W: Write>(writer: &mut BitWriter<W>, ctx: &mut StreamContext, uri_id: usize, prefix: &str) -> Result<()> {
    let bits = bits_needed(ctx.uri_table.uris[uri_id].prefixes.len() as u64);
    match ctx.uri_table.lookup_prefix(uri_id, prefix) {
        Some(id) => writer.write_n_bits(id as u32 + 1, bits),
        None => {
            writer.write_n_bits(0, bits)?;
            writer.write_string(prefix)?;
            ctx.uri_table.add_prefix(uri_id, prefix.to_owned())?;
            Ok(())
        }
    }
}

/// String content through the partitions, the dual of the decode path: a
/// local hit writes 0 + local id, a global hit 1 + global id, a miss writes
/// the literal with its length offset by two and interns the value.
pub fn encode_string_value<W: Write>(
    writer: &mut BitWriter<W>,
    ctx: &mut StreamContext,
    qname: QNameId,
    value: &str,
) -> Result<()> {
    let local_hit = ctx.value_table.lookup_vx(ctx.uri_table.ln_entry(qname), value);
    if let Some(vx_id) = local_hit {
        writer.write_unsigned_integer(0)?;
        let bits = compact_id_bits(ctx.uri_table.ln_entry(qname).vx_count());
        return writer.write_n_bits(vx_id as u32, bits);
    }

    if let Some(global_id) = ctx.value_table.lookup(value) {
        writer.write_unsigned_integer(1)?;
        let bits = compact_id_bits(ctx.value_table.count());
        return writer.write_n_bits(global_id as u32, bits);
    }

    writer.write_unsigned_integer(value.chars().count() as u64 + 2)?;
    writer.write_string_only(value)?;

    if !value.is_empty()
        && value.chars().count() <= ctx.opts.value_max_length
        && ctx.opts.value_partition_capacity > 0
    {
        let capacity = ctx.opts.value_partition_capacity;
        ctx.value_table
            .add_value(&mut ctx.uri_table, qname, value.to_owned(), capacity);
    }
    Ok(())
}
