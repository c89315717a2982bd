/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use log::debug;

use std::io::Read;

use crate::consts::*;
use crate::exi_error::{err_exit_code, ErrorKind, Result};
use crate::helpers::{bits_needed, compact_id_bits};
use crate::structs::bit_reader::BitReader;
use crate::structs::content_handler::{check, ContentHandler};
use crate::structs::events::EventType;
use crate::structs::grammar::{no_production_match, Production};
use crate::structs::schema::TypeClass;
use crate::structs::stream::StreamContext;
use crate::structs::string_tables::QNameId;

/// Outcome of one decode step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    Continue,
    Complete,
}

/// Decodes exactly one event: narrows the event code over the active rule,
/// dispatches its content, feeds the handler and advances the grammar
/// machine.
pub fn decode_next_event<R: Read, H: ContentHandler>(
    reader: &mut BitReader<R>,
    ctx: &mut StreamContext,
    handler: &mut H,
) -> Result<ParseStatus> {
    if ctx.stack.is_empty() {
        return Ok(ParseStatus::Complete);
    }

    let (part, prod) = match_event_code(reader, ctx)?;

    debug!(
        "decoded production {:?} at part {} in rule NT-{}",
        prod.event, part, ctx.non_term
    );

    #[cfg(feature = "grammar_tracing")]
    {
        let rule = ctx.top_grammar()?.rule(ctx.non_term)?;
        for p in 0..3 {
            for (i, production) in rule.parts[p].iter().enumerate() {
                eprintln!("  {:?} {:?}", rule.event_code(p, i), production.event);
            }
        }
    }

    let is_built_in = ctx.top_grammar()?.is_built_in_element();

    match prod.event {
        EventType::StartDocument => {
            check(handler.start_document())?;
            ctx.non_term = prod.non_term;
        }

        EventType::EndDocument => {
            check(handler.end_document())?;
            ctx.stack.pop()?;
            ctx.non_term = GR_VOID_NON_TERMINAL;
            if !ctx.stack.is_empty() {
                return err_exit_code(ErrorKind::InconsistentState, "document ended with open elements");
            }
            return Ok(ParseStatus::Complete);
        }

        EventType::EndElement => {
            // an EE seen past part one becomes a first-part production
            if is_built_in && part > 0 {
                let rule_id = ctx.non_term;
                ctx.top_grammar_mut()?.rules[rule_id]
                    .insert_zero_production(Production::new(EventType::EndElement, GR_VOID_NON_TERMINAL));
            }
            check(handler.end_element())?;
            ctx.pop_element()?;
        }

        EventType::StartElementAll => {
            let qname = decode_qname(reader, ctx)?;
            if is_built_in {
                let rule_id = ctx.non_term;
                ctx.top_grammar_mut()?.rules[rule_id].insert_zero_production(Production::with_qname(
                    EventType::StartElementQName,
                    prod.non_term,
                    INDEX_MAX,
                    qname,
                ));
            }
            start_element(reader, ctx, handler, qname, prod.non_term, None, false)?;
        }

        EventType::StartElementUri => {
            let uri_id = prod.qname_id.uri;
            let ln_id = decode_local_name(reader, ctx, uri_id)?;
            let qname = QNameId { uri: uri_id, ln: ln_id };
            start_element(reader, ctx, handler, qname, prod.non_term, None, true)?;
        }

        EventType::StartElementQName => {
            let target = (prod.type_id != INDEX_MAX).then_some(prod.type_id);
            start_element(reader, ctx, handler, prod.qname_id, prod.non_term, target, true)?;
        }

        EventType::AttributeAll => {
            let qname = decode_qname(reader, ctx)?;
            if is_built_in {
                let rule_id = ctx.non_term;
                ctx.top_grammar_mut()?.rules[rule_id].insert_zero_production(Production::with_qname(
                    EventType::AttributeQName,
                    prod.non_term,
                    INDEX_MAX,
                    qname,
                ));
            }
            attribute(reader, ctx, handler, qname, INDEX_MAX)?;
            ctx.non_term = prod.non_term;
        }

        EventType::AttributeUri => {
            let uri_id = prod.qname_id.uri;
            let ln_id = decode_local_name(reader, ctx, uri_id)?;
            decode_prefix_component(reader, ctx, uri_id)?;
            attribute(reader, ctx, handler, QNameId { uri: uri_id, ln: ln_id }, INDEX_MAX)?;
            ctx.non_term = prod.non_term;
        }

        EventType::AttributeQName => {
            decode_prefix_component(reader, ctx, prod.qname_id.uri)?;
            attribute(reader, ctx, handler, prod.qname_id, prod.type_id)?;
            ctx.non_term = prod.non_term;
        }

        EventType::Characters => {
            if is_built_in && part > 0 {
                let rule_id = ctx.non_term;
                ctx.top_grammar_mut()?.rules[rule_id]
                    .insert_zero_production(Production::new(EventType::Characters, prod.non_term));
            }
            let qname = ctx.current_elem;
            decode_typed_value(reader, ctx, handler, prod.type_id, qname)?;
            ctx.non_term = prod.non_term;
        }

        EventType::NamespaceDecl => {
            let uri_id = decode_uri(reader, ctx)?;
            let prefix_id = decode_ns_prefix(reader, ctx, uri_id)?;
            let is_local_elem = reader.read_boolean()?;
            let uri = ctx.uri_table.uris[uri_id].uri.clone();
            let prefix = ctx.uri_table.uris[uri_id].prefixes[prefix_id].clone();
            check(handler.namespace_declaration(&uri, &prefix, is_local_elem))?;
            ctx.non_term = prod.non_term;
        }

        EventType::Comment => {
            let text = reader.read_string()?;
            check(handler.comment(&text))?;
            ctx.non_term = prod.non_term;
        }

        EventType::ProcessingInstruction => {
            let target = reader.read_string()?;
            let data = reader.read_string()?;
            check(handler.processing_instruction(&target, &data))?;
            ctx.non_term = prod.non_term;
        }

        EventType::Doctype => {
            let name = reader.read_string()?;
            let public_id = reader.read_string()?;
            let system_id = reader.read_string()?;
            let text = reader.read_string()?;
            check(handler.doctype(&name, &public_id, &system_id, &text))?;
            ctx.non_term = prod.non_term;
        }

        EventType::EntityReference => {
            let name = reader.read_string()?;
            check(handler.entity_reference(&name))?;
            ctx.non_term = prod.non_term;
        }

        EventType::SelfContained => {
            check(handler.self_contained())?;
            return err_exit_code(ErrorKind::NotImplemented, "selfContained regions");
        }

        EventType::Void => {
            return err_exit_code(ErrorKind::InconsistentState, "void production survived normalization");
        }
    }

    Ok(ParseStatus::Continue)
}

/// Reads event-code parts until a production is pinned down. Returns the
/// part index it was found in and a copy of the production.
fn match_event_code<R: Read>(reader: &mut BitReader<R>, ctx: &StreamContext) -> Result<(usize, Production)> {
    let grammar = ctx.top_grammar()?;
    let rule = grammar.rule(ctx.non_term)?;

    let mut part = 0usize;
    loop {
        let count = rule.parts[part].len();
        let v = reader.read_n_bits(rule.bits[part])? as usize;
        if v < count {
            return Ok((part, rule.parts[part][count - 1 - v]));
        }
        let more = part < 2 && rule.parts[part + 1..].iter().any(|p| !p.is_empty());
        if v == count && more {
            part += 1;
            continue;
        }
        return no_production_match("event code has no production in the active rule");
    }
}

/// Shared tail of every SE variant: report, resolve the child grammar and
/// push it. `schema_target` carries the grammar index compiled into an
/// SE(qname) production.
fn start_element<R: Read, H: ContentHandler>(
    reader: &mut BitReader<R>,
    ctx: &mut StreamContext,
    handler: &mut H,
    qname: QNameId,
    rhs_non_term: usize,
    schema_target: Option<usize>,
    read_prefix: bool,
) -> Result<()> {
    if read_prefix {
        decode_prefix_component(reader, ctx, qname.uri)?;
    }

    let (uri, ln) = ctx.uri_table.qname_strings(qname);
    let (uri, ln) = (uri.to_owned(), ln.to_owned());
    check(handler.start_element(&uri, &ln))?;

    let addr = match schema_target {
        Some(idx) => ctx.schema_grammar_addr(idx)?,
        None => ctx.element_grammar_for(qname)?,
    };
    ctx.non_term = rhs_non_term;
    ctx.push_element(addr, qname);
    Ok(())
}

/// Attribute event tail: report the qname, then its value. xsi:type and
/// xsi:nil switch the active grammar instead of carrying ordinary data.
fn attribute<R: Read, H: ContentHandler>(
    reader: &mut BitReader<R>,
    ctx: &mut StreamContext,
    handler: &mut H,
    qname: QNameId,
    type_id: usize,
) -> Result<()> {
    let (uri, ln) = ctx.uri_table.qname_strings(qname);
    let (uri, ln) = (uri.to_owned(), ln.to_owned());
    check(handler.attribute(&uri, &ln))?;

    if ctx.schema.is_some() && qname == (QNameId { uri: URI_XSI_ID, ln: XSI_TYPE_ID }) {
        let type_qname = decode_qname(reader, ctx)?;
        let (turi, tln) = ctx.uri_table.qname_strings(type_qname);
        let (turi, tln) = (turi.to_owned(), tln.to_owned());
        check(handler.qname_data(&turi, &tln))?;
        return apply_xsi_type(ctx, type_qname);
    }

    if ctx.schema.is_some() && qname == (QNameId { uri: URI_XSI_ID, ln: XSI_NIL_ID }) {
        let nil = reader.read_boolean()?;
        check(handler.boolean_data(nil))?;
        if nil {
            return apply_xsi_nil(ctx);
        }
        return Ok(());
    }

    ctx.current_value_qname = qname;
    decode_typed_value(reader, ctx, handler, type_id, qname)?;
    ctx.current_value_qname = ctx.current_elem;
    Ok(())
}

/// Replaces the top grammar with the grammar of the named type.
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

/// xsi:nil="true": content collapses to the empty-type grammar when the
/// element is nillable (always honored on non-strict streams).
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

/// Value content keyed by the production's simple type. Untyped content and
/// lexical-values fidelity both fall back to the string partitions.
pub fn decode_typed_value<R: Read, H: ContentHandler>(
    reader: &mut BitReader<R>,
    ctx: &mut StreamContext,
    handler: &mut H,
    type_id: usize,
    qname: QNameId,
) -> Result<()> {
    let simple = if ctx.opts.preserve.lexical_values || type_id == INDEX_MAX {
        None
    } else {
        ctx.schema.as_ref().and_then(|s| s.simple_type(type_id)).cloned()
    };

    let Some(simple) = simple else {
        let value = decode_string_value(reader, ctx, qname)?;
        return check(handler.string_data(&value));
    };

    if let Some(enum_id) = simple.enum_id {
        return decode_enum_value(reader, ctx, handler, enum_id);
    }

    match simple.class {
        TypeClass::String | TypeClass::Untyped => {
            let value = decode_string_value(reader, ctx, qname)?;
            check(handler.string_data(&value))
        }
        TypeClass::Boolean => check(handler.boolean_data(reader.read_boolean()?)),
        TypeClass::Decimal => check(handler.decimal_data(reader.read_decimal()?)),
        TypeClass::Float => check(handler.float_data(reader.read_float()?)),
        TypeClass::Integer => check(handler.int_data(reader.read_integer()?)),
        TypeClass::NonNegativeInteger => {
            let v = reader.read_unsigned_integer()?;
            if v > i64::MAX as u64 {
                return err_exit_code(ErrorKind::InconsistentState, "non-negative integer out of range");
            }
            check(handler.int_data(v as i64))
        }
        TypeClass::SmallInteger { lower, width } => {
            let v = reader.read_n_bits(width)?;
            check(handler.int_data(lower + i64::from(v)))
        }
        TypeClass::Binary => {
            let bytes = reader.read_binary()?;
            check(handler.binary_data(&bytes))
        }
        TypeClass::DateTime(kind) => check(handler.date_time_data(reader.read_date_time(kind)?)),
        TypeClass::QName => {
            let q = decode_qname(reader, ctx)?;
            let (uri, ln) = ctx.uri_table.qname_strings(q);
            let (uri, ln) = (uri.to_owned(), ln.to_owned());
            check(handler.qname_data(&uri, &ln))
        }
        TypeClass::List { item_type } => {
            let count = reader.read_unsigned_integer()? as usize;
            check(handler.list_data(count))?;
            for _ in 0..count {
                decode_typed_value(reader, ctx, handler, item_type, qname)?;
            }
            Ok(())
        }
    }
}

fn decode_enum_value<R: Read, H: ContentHandler>(
    reader: &mut BitReader<R>,
    ctx: &mut StreamContext,
    handler: &mut H,
    enum_id: usize,
) -> Result<()> {
    use crate::structs::exi_value::ExiValue;

    let schema = ctx
        .schema
        .as_ref()
        .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::NullRef, "no schema"))?;
    let def = schema
        .enum_table
        .get(enum_id)
        .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::OutOfBounds, "enum table index"))?;

    let bits = compact_id_bits(def.values.len());
    let idx = reader.read_n_bits(bits)? as usize;
    let value = def
        .values
        .get(idx)
        .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InvalidExiInput, "enum index out of range"))?
        .clone();

    match value {
        ExiValue::String(s) => check(handler.string_data(&s)),
        ExiValue::Integer(v) => check(handler.int_data(v)),
        ExiValue::NonNegativeInteger(v) => check(handler.int_data(v as i64)),
        ExiValue::Boolean(v) => check(handler.boolean_data(v)),
        ExiValue::Decimal(v) => check(handler.decimal_data(v)),
        ExiValue::Float(v) => check(handler.float_data(v)),
        ExiValue::Binary(v) => check(handler.binary_data(&v)),
        ExiValue::DateTime(v) => check(handler.date_time_data(v)),
        ExiValue::QName(u, l) => check(handler.qname_data(&u, &l)),
        ExiValue::List(items) => {
            check(handler.list_data(items.len()))?;
            Ok(())
        }
    }
}

/// String content through the partitions: an unsigned-integer discriminator
/// selects local hit (0), global hit (1) or a literal of length n-2.
pub fn decode_string_value<R: Read>(reader: &mut BitReader<R>, ctx: &mut StreamContext, qname: QNameId) -> Result<String> {
    let flag = reader.read_unsigned_integer()?;

    if flag == 0 {
        // local value partition hit
        let ln_entry = ctx.uri_table.ln_entry(qname);
        let bits = compact_id_bits(ln_entry.vx_count());
        let vx_id = reader.read_n_bits(bits)? as usize;
        let global_id = ln_entry
            .vx_table
            .get(vx_id)
            .map(|vx| vx.global_id)
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::InvalidExiInput, "local value id out of range"))?;
        if global_id == INDEX_MAX {
            return err_exit_code(ErrorKind::InvalidExiInput, "local value id names a recycled slot");
        }
        Ok(ctx.value_table.values[global_id].value.clone())
    } else if flag == 1 {
        // global value partition hit
        let bits = compact_id_bits(ctx.value_table.count());
        let global_id = reader.read_n_bits(bits)? as usize;
        if global_id >= ctx.value_table.count() {
            return err_exit_code(ErrorKind::InvalidExiInput, "global value id out of range");
        }
        Ok(ctx.value_table.values[global_id].value.clone())
    } else {
        // miss: literal string of flag-2 code points, then intern
        let value = reader.read_string_only((flag - 2) as usize)?;
        if !value.is_empty()
            && value.chars().count() <= ctx.opts.value_max_length
            && ctx.opts.value_partition_capacity > 0
        {
            let capacity = ctx.opts.value_partition_capacity;
            ctx.value_table
                .add_value(&mut ctx.uri_table, qname, value.clone(), capacity);
        }
        Ok(value)
    }
}

/// qname = uri partition (hit as id+1, miss as 0+literal), then local-name
/// partition (hit as 0 + compact id, miss as length+1 + literal), then the
/// prefix component when prefixes are preserved.
pub fn decode_qname<R: Read>(reader: &mut BitReader<R>, ctx: &mut StreamContext) -> Result<QNameId> {
    let uri = decode_uri(reader, ctx)?;
    let ln = decode_local_name(reader, ctx, uri)?;
    decode_prefix_component(reader, ctx, uri)?;
    Ok(QNameId { uri, ln })
}

pub fn decode_uri<R: Read>(reader: &mut BitReader<R>, ctx: &mut StreamContext) -> Result<usize> {
    let uri_bits = bits_needed(ctx.uri_table.uris.len() as u64);
    let v = reader.read_n_bits(uri_bits)? as usize;
    if v == 0 {
        let uri = reader.read_string()?;
        Ok(ctx.uri_table.add_uri(uri))
    } else {
        let id = v - 1;
        if id >= ctx.uri_table.uris.len() {
            return err_exit_code(ErrorKind::InvalidExiInput, "uri compact id out of range");
        }
        Ok(id)
    }
}

pub fn decode_local_name<R: Read>(reader: &mut BitReader<R>, ctx: &mut StreamContext, uri_id: usize) -> Result<usize> {
    let flag = reader.read_unsigned_integer()?;
    if flag == 0 {
        let count = ctx.uri_table.uris[uri_id].ln_table.len();
        let bits = compact_id_bits(count);
        let id = reader.read_n_bits(bits)? as usize;
        if id >= count {
            return err_exit_code(ErrorKind::LnNotFound, "local-name compact id out of range");
        }
        Ok(id)
    } else {
        let ln = reader.read_string_only((flag - 1) as usize)?;
        Ok(ctx.uri_table.add_ln(uri_id, ln))
    }
}

/// The optional prefix digits carried by SE/AT events under
/// preserve.prefixes. The id is consumed to keep the cursor honest; it only
/// matters for re-serialization.
fn decode_prefix_component<R: Read>(reader: &mut BitReader<R>, ctx: &mut StreamContext, uri_id: usize) -> Result<()> {
    if !ctx.opts.preserve.prefixes {
        return Ok(());
    }
    let count = ctx.uri_table.uris[uri_id].prefixes.len();
    if count == 0 {
        return Ok(());
    }
    let bits = compact_id_bits(count);
    if bits > 0 {
        let _prefix_id = reader.read_n_bits(bits)?;
    }
    Ok(())
}

/// NS prefix component: hit as id+1, miss as 0 + literal + intern.
fn decode_ns_prefix<R: Read>(reader: &mut BitReader<R>, ctx: &mut StreamContext, uri_id: usize) -> Result<usize> {
    let bits = bits_needed(ctx.uri_table.uris[uri_id].prefixes.len() as u64);
    let v = reader.read_n_bits(bits)? as usize;
    if v == 0 {
        let prefix = reader.read_string()?;
        ctx.uri_table.add_prefix(uri_id, prefix)
    } else {
        let id = v - 1;
        if id >= ctx.uri_table.uris[uri_id].prefixes.len() {
            return err_exit_code(ErrorKind::InvalidExiInput, "prefix compact id out of range");
        }
        Ok(id)
    }
}
