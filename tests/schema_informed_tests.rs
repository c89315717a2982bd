/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

mod common;

use common::EventTrace;
use exi_codec::{
    generate_schema, AttributeTag, ElementKind, ErrorKind, ExiOptions, ExiSchema, Parser, Serializer, TreeTable,
};
use std::io::Cursor;
use std::sync::Arc;

const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const TIME_NS: &str = "urn:ieee:std:2030.5:ns";

/// A six-field element in the shape of a metering Time resource:
///
/// ```text
/// <element name="Time">
///   <complexType><sequence>
///     <element name="currentTime"   type="unsignedInt"/>
///     <element name="dstEndTime"    type="unsignedInt"/>
///     <element name="dstOffset"     type="int"/>
///     <element name="dstStartTime"  type="unsignedInt"/>
///     <element name="quality"       type="unsignedByte"/>
///     <element name="tzOffset"      type="int"/>
///   </sequence></complexType>
/// </element>
/// ```
fn time_schema() -> Arc<ExiSchema> {
    let mut table = TreeTable::new(TIME_NS);

    let time = table.add_root(ElementKind::Element);
    table.set_attr(time, AttributeTag::Name, "Time");

    let ctype = table.add_entry(ElementKind::ComplexType);
    table.link_child(time, ctype);

    let seq = table.add_entry(ElementKind::Sequence);
    table.link_child(ctype, seq);

    for (name, ty) in [
        ("currentTime", "unsignedInt"),
        ("dstEndTime", "unsignedInt"),
        ("dstOffset", "int"),
        ("dstStartTime", "unsignedInt"),
        ("quality", "unsignedByte"),
        ("tzOffset", "int"),
    ] {
        let el = table.add_entry(ElementKind::Element);
        table.set_attr(el, AttributeTag::Name, name);
        table.set_attr(el, AttributeTag::Type, ty);
        table.link_child(seq, el);
    }

    Arc::new(generate_schema(&mut [table]).unwrap())
}

fn encode_time_document(schema: &Arc<ExiSchema>, opts: &ExiOptions) -> Vec<u8> {
    let mut s = Serializer::new(Vec::new(), Some(schema.clone()), opts.clone(), false, true);
    s.exi_header().unwrap();
    s.start_document().unwrap();
    s.start_element(TIME_NS, "Time").unwrap();

    for (name, value) in [
        ("currentTime", 1351980000i64),
        ("dstEndTime", 1351994400),
        ("dstOffset", 3600),
        ("dstStartTime", 1331431200),
        ("quality", 4),
        ("tzOffset", 0),
    ] {
        s.start_element("", name).unwrap();
        s.int_data(value).unwrap();
        s.end_element().unwrap();
    }

    s.end_element().unwrap();
    s.end_document().unwrap();
    s.close().unwrap()
}

#[test]
fn strict_time_document_round_trips() {
    let schema = time_schema();
    let opts = ExiOptions {
        strict: true,
        ..Default::default()
    };
    let bytes = encode_time_document(&schema, &opts);

    let mut parser = Parser::new(Cursor::new(bytes), Some(schema));
    parser.parse_header(Some(&opts)).unwrap();
    let mut trace = EventTrace::new();
    parser.parse_all(&mut trace).unwrap();

    assert_eq!(
        trace.events,
        vec![
            "SD".to_owned(),
            format!("SE {{{}}}Time", TIME_NS),
            "SE {}currentTime".to_owned(),
            "INT 1351980000".to_owned(),
            "EE".to_owned(),
            "SE {}dstEndTime".to_owned(),
            "INT 1351994400".to_owned(),
            "EE".to_owned(),
            "SE {}dstOffset".to_owned(),
            "INT 3600".to_owned(),
            "EE".to_owned(),
            "SE {}dstStartTime".to_owned(),
            "INT 1331431200".to_owned(),
            "EE".to_owned(),
            "SE {}quality".to_owned(),
            "INT 4".to_owned(),
            "EE".to_owned(),
            "SE {}tzOffset".to_owned(),
            "INT 0".to_owned(),
            "EE".to_owned(),
            "EE".to_owned(),
            "ED".to_owned(),
        ]
    );
}

#[test]
fn strict_encoding_is_byte_identical_across_runs() {
    let opts = ExiOptions {
        strict: true,
        ..Default::default()
    };

    // independently compiled schemas must yield the same payload
    let first = encode_time_document(&time_schema(), &opts);
    let second = encode_time_document(&time_schema(), &opts);
    assert_eq!(first, second);

    // typed schema-informed coding is far denser than schema-less strings
    assert!(first.len() < 60, "payload unexpectedly large: {} bytes", first.len());
}

#[test]
fn strict_rejects_undeclared_elements() {
    let schema = time_schema();
    let opts = ExiOptions {
        strict: true,
        ..Default::default()
    };

    let mut s = Serializer::new(Vec::new(), Some(schema), opts, false, true);
    s.exi_header().unwrap();
    s.start_document().unwrap();
    let err = s.start_element(TIME_NS, "Bogus").unwrap_err();
    assert!(
        err.kind() == ErrorKind::NoProductionMatch || err.kind() == ErrorKind::StrictViolation,
        "unexpected error {:?}",
        err.kind()
    );
}

#[test]
fn non_strict_schema_accepts_deviations() {
    let schema = time_schema();
    let opts = ExiOptions::default();

    // an undeclared sibling after the declared children
    let mut s = Serializer::new(Vec::new(), Some(schema.clone()), opts.clone(), false, true);
    s.exi_header().unwrap();
    s.start_document().unwrap();
    s.start_element(TIME_NS, "Time").unwrap();
    s.start_element("", "currentTime").unwrap();
    s.int_data(7).unwrap();
    s.end_element().unwrap();
    s.start_element("", "vendorExtension").unwrap();
    s.string_data("x").unwrap();
    s.end_element().unwrap();
    s.end_element().unwrap();
    s.end_document().unwrap();
    let bytes = s.close().unwrap();

    let mut parser = Parser::new(Cursor::new(bytes), Some(schema));
    parser.parse_header(Some(&opts)).unwrap();
    let mut trace = EventTrace::new();
    parser.parse_all(&mut trace).unwrap();

    assert!(trace.events.contains(&"SE {}vendorExtension".to_owned()));
    assert!(trace.events.contains(&"CH x".to_owned()));
}

#[test]
fn xsi_type_switches_to_typed_content() {
    // no user schema needed: the built-in XSD types carry their grammars
    let schema = Arc::new(ExiSchema::built_in_only());
    let opts = ExiOptions::default();

    let mut s = Serializer::new(Vec::new(), Some(schema.clone()), opts.clone(), false, true);
    s.exi_header().unwrap();
    s.start_document().unwrap();
    s.start_element("", "xsitypetest").unwrap();
    s.attribute(XSI_NS, "type").unwrap();
    s.qname_data(XSD_NS, "integer").unwrap();
    s.int_data(144).unwrap();
    s.end_element().unwrap();
    s.end_document().unwrap();
    let bytes = s.close().unwrap();

    let mut parser = Parser::new(Cursor::new(bytes), Some(schema));
    parser.parse_header(Some(&opts)).unwrap();
    let mut trace = EventTrace::new();
    parser.parse_all(&mut trace).unwrap();

    assert_eq!(
        trace.events,
        vec![
            "SD".to_owned(),
            "SE {}xsitypetest".to_owned(),
            format!("AT {{{}}}type", XSI_NS),
            format!("QN {{{}}}integer", XSD_NS),
            "INT 144".to_owned(),
            "EE".to_owned(),
            "ED".to_owned(),
        ]
    );
}

#[test]
fn nillable_element_collapses_content() {
    let mut table = TreeTable::new("urn:example:nil");
    let el = table.add_root(ElementKind::Element);
    table.set_attr(el, AttributeTag::Name, "measurement");
    table.set_attr(el, AttributeTag::Type, "int");
    table.set_attr(el, AttributeTag::Nillable, "true");
    let schema = Arc::new(generate_schema(&mut [table]).unwrap());

    let opts = ExiOptions::default();
    let mut s = Serializer::new(Vec::new(), Some(schema.clone()), opts.clone(), false, true);
    s.exi_header().unwrap();
    s.start_document().unwrap();
    s.start_element("urn:example:nil", "measurement").unwrap();
    s.attribute(XSI_NS, "nil").unwrap();
    s.boolean_data(true).unwrap();
    s.end_element().unwrap();
    s.end_document().unwrap();
    let bytes = s.close().unwrap();

    let mut parser = Parser::new(Cursor::new(bytes), Some(schema));
    parser.parse_header(Some(&opts)).unwrap();
    let mut trace = EventTrace::new();
    parser.parse_all(&mut trace).unwrap();

    assert_eq!(
        trace.events,
        vec![
            "SD".to_owned(),
            "SE {urn:example:nil}measurement".to_owned(),
            format!("AT {{{}}}nil", XSI_NS),
            "BOOL true".to_owned(),
            "EE".to_owned(),
            "ED".to_owned(),
        ]
    );
}

#[test]
fn optional_and_repeated_particles_compile() {
    // <element name="list"><complexType><sequence>
    //    <element name="item" type="string" minOccurs="0" maxOccurs="unbounded"/>
    // </sequence></complexType></element>
    let mut table = TreeTable::new("urn:example:list");
    let root = table.add_root(ElementKind::Element);
    table.set_attr(root, AttributeTag::Name, "list");
    let ctype = table.add_entry(ElementKind::ComplexType);
    table.link_child(root, ctype);
    let seq = table.add_entry(ElementKind::Sequence);
    table.link_child(ctype, seq);
    let item = table.add_entry(ElementKind::Element);
    table.set_attr(item, AttributeTag::Name, "item");
    table.set_attr(item, AttributeTag::Type, "string");
    table.set_attr(item, AttributeTag::MinOccurs, "0");
    table.set_attr(item, AttributeTag::MaxOccurs, "unbounded");
    table.link_child(seq, item);

    let schema = Arc::new(generate_schema(&mut [table]).unwrap());
    let opts = ExiOptions {
        strict: true,
        ..Default::default()
    };

    for count in [0usize, 1, 4] {
        let mut s = Serializer::new(Vec::new(), Some(schema.clone()), opts.clone(), false, true);
        s.exi_header().unwrap();
        s.start_document().unwrap();
        s.start_element("urn:example:list", "list").unwrap();
        for i in 0..count {
            s.start_element("", "item").unwrap();
            s.string_data(&format!("value-{}", i)).unwrap();
            s.end_element().unwrap();
        }
        s.end_element().unwrap();
        s.end_document().unwrap();
        let bytes = s.close().unwrap();

        let mut parser = Parser::new(Cursor::new(bytes), Some(schema.clone()));
        parser.parse_header(Some(&opts)).unwrap();
        let mut trace = EventTrace::new();
        parser.parse_all(&mut trace).unwrap();

        let items = trace.events.iter().filter(|e| e.as_str() == "SE {}item").count();
        assert_eq!(items, count, "wrong item count for {}", count);
    }
}

#[test]
fn choice_compiles_both_branches() {
    let mut table = TreeTable::new("urn:example:choice");
    let root = table.add_root(ElementKind::Element);
    table.set_attr(root, AttributeTag::Name, "payload");
    let ctype = table.add_entry(ElementKind::ComplexType);
    table.link_child(root, ctype);
    let choice = table.add_entry(ElementKind::Choice);
    table.link_child(ctype, choice);
    for (name, ty) in [("text", "string"), ("number", "int")] {
        let el = table.add_entry(ElementKind::Element);
        table.set_attr(el, AttributeTag::Name, name);
        table.set_attr(el, AttributeTag::Type, ty);
        table.link_child(choice, el);
    }

    let schema = Arc::new(generate_schema(&mut [table]).unwrap());
    let opts = ExiOptions {
        strict: true,
        ..Default::default()
    };

    for branch in ["text", "number"] {
        let mut s = Serializer::new(Vec::new(), Some(schema.clone()), opts.clone(), false, true);
        s.exi_header().unwrap();
        s.start_document().unwrap();
        s.start_element("urn:example:choice", "payload").unwrap();
        s.start_element("", branch).unwrap();
        if branch == "text" {
            s.string_data("hello").unwrap();
        } else {
            s.int_data(-5).unwrap();
        }
        s.end_element().unwrap();
        s.end_element().unwrap();
        s.end_document().unwrap();
        let bytes = s.close().unwrap();

        let mut parser = Parser::new(Cursor::new(bytes), Some(schema.clone()));
        parser.parse_header(Some(&opts)).unwrap();
        let mut trace = EventTrace::new();
        parser.parse_all(&mut trace).unwrap();
        assert!(trace.events.contains(&format!("SE {{}}{}", branch)));
    }
}

#[test]
fn schema_attributes_are_typed_and_ordered() {
    // <element name="reading"><complexType>
    //   <sequence/>  (empty content)
    //   <attribute name="serial" type="int" use="required"/>
    //   <attribute name="unit" type="string"/>
    // </complexType></element>
    let mut table = TreeTable::new("urn:example:attrs");
    let root = table.add_root(ElementKind::Element);
    table.set_attr(root, AttributeTag::Name, "reading");
    let ctype = table.add_entry(ElementKind::ComplexType);
    table.link_child(root, ctype);
    let seq = table.add_entry(ElementKind::Sequence);
    table.link_child(ctype, seq);
    for (name, ty, usage) in [("serial", "int", Some("required")), ("unit", "string", None)] {
        let at = table.add_entry(ElementKind::Attribute);
        table.set_attr(at, AttributeTag::Name, name);
        table.set_attr(at, AttributeTag::Type, ty);
        if let Some(u) = usage {
            table.set_attr(at, AttributeTag::Use, u);
        }
        table.link_child(ctype, at);
    }

    let schema = Arc::new(generate_schema(&mut [table]).unwrap());
    let opts = ExiOptions {
        strict: true,
        ..Default::default()
    };

    let mut s = Serializer::new(Vec::new(), Some(schema.clone()), opts.clone(), false, true);
    s.exi_header().unwrap();
    s.start_document().unwrap();
    s.start_element("urn:example:attrs", "reading").unwrap();
    s.attribute("", "serial").unwrap();
    s.int_data(42).unwrap();
    s.attribute("", "unit").unwrap();
    s.string_data("W").unwrap();
    s.end_element().unwrap();
    s.end_document().unwrap();
    let bytes = s.close().unwrap();

    let mut parser = Parser::new(Cursor::new(bytes), Some(schema));
    parser.parse_header(Some(&opts)).unwrap();
    let mut trace = EventTrace::new();
    parser.parse_all(&mut trace).unwrap();

    assert_eq!(
        trace.events,
        vec![
            "SD",
            "SE {urn:example:attrs}reading",
            "AT {}serial",
            "INT 42",
            "AT {}unit",
            "CH W",
            "EE",
            "ED",
        ]
    );
}

#[test]
fn recursive_types_compile_through_placeholders() {
    // <complexType name="TreeNode"><sequence>
    //   <element name="child" type="TreeNode" minOccurs="0"/>
    // </sequence></complexType>
    // <element name="tree" type="TreeNode"/>
    let mut table = TreeTable::new("urn:example:tree");

    let ctype = table.add_root(ElementKind::ComplexType);
    table.set_attr(ctype, AttributeTag::Name, "TreeNode");
    let seq = table.add_entry(ElementKind::Sequence);
    table.link_child(ctype, seq);
    let child = table.add_entry(ElementKind::Element);
    table.set_attr(child, AttributeTag::Name, "child");
    table.set_attr(child, AttributeTag::Type, "TreeNode");
    table.set_attr(child, AttributeTag::MinOccurs, "0");
    table.link_child(seq, child);

    let root = table.add_root(ElementKind::Element);
    table.set_attr(root, AttributeTag::Name, "tree");
    table.set_attr(root, AttributeTag::Type, "TreeNode");

    let schema = Arc::new(generate_schema(&mut [table]).unwrap());
    let opts = ExiOptions {
        strict: true,
        ..Default::default()
    };

    // three levels of nesting exercise the placeholder-resolved grammar
    let mut s = Serializer::new(Vec::new(), Some(schema.clone()), opts.clone(), false, true);
    s.exi_header().unwrap();
    s.start_document().unwrap();
    s.start_element("urn:example:tree", "tree").unwrap();
    s.start_element("", "child").unwrap();
    s.start_element("", "child").unwrap();
    s.end_element().unwrap();
    s.end_element().unwrap();
    s.end_element().unwrap();
    s.end_document().unwrap();
    let bytes = s.close().unwrap();

    let mut parser = Parser::new(Cursor::new(bytes), Some(schema));
    parser.parse_header(Some(&opts)).unwrap();
    let mut trace = EventTrace::new();
    parser.parse_all(&mut trace).unwrap();

    let depth = trace.events.iter().filter(|e| e.as_str() == "SE {}child").count();
    assert_eq!(depth, 2);
    assert!(parser.is_balanced());
}
