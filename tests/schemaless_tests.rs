/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

mod common;

use common::EventTrace;
use exi_codec::{ErrorKind, ExiOptions, Parser, Serializer};
use std::io::Cursor;

const TEST_NS: &str = "http://www.ltu.se/EISLAB/schema-test";

fn encode_sample(opts: ExiOptions) -> Vec<u8> {
    let mut s = Serializer::new(Vec::new(), None, opts, false, true);
    s.exi_header().unwrap();
    s.start_document().unwrap();
    s.start_element(TEST_NS, "EXIPEncoder").unwrap();
    s.attribute("", "version").unwrap();
    s.string_data("0.2").unwrap();
    s.attribute("", "status").unwrap();
    s.string_data("alpha").unwrap();
    s.string_data("This is an example of serializing EXI streams using EXIP low level API")
        .unwrap();
    s.end_element().unwrap();
    s.end_document().unwrap();
    s.close().unwrap()
}

fn expected_sample_trace() -> Vec<String> {
    vec![
        "SD".to_owned(),
        format!("SE {{{}}}EXIPEncoder", TEST_NS),
        "AT {}version".to_owned(),
        "CH 0.2".to_owned(),
        "AT {}status".to_owned(),
        "CH alpha".to_owned(),
        "CH This is an example of serializing EXI streams using EXIP low level API".to_owned(),
        "EE".to_owned(),
        "ED".to_owned(),
    ]
}

#[test]
fn default_options_round_trip() {
    let bytes = encode_sample(ExiOptions::default());

    let mut parser = Parser::new(Cursor::new(bytes), None);
    parser.parse_header(None).unwrap();
    let mut trace = EventTrace::new();
    parser.parse_all(&mut trace).unwrap();

    assert_eq!(trace.events, expected_sample_trace());
    assert!(parser.is_balanced());
}

#[test]
fn byte_aligned_and_pre_compression_round_trip() {
    for alignment in [exi_codec::Alignment::ByteAligned, exi_codec::Alignment::PreCompression] {
        let opts = ExiOptions {
            alignment,
            ..Default::default()
        };
        let bytes = encode_sample(opts);

        let mut parser = Parser::new(Cursor::new(bytes), None);
        parser.parse_header(None).unwrap();
        let mut trace = EventTrace::new();
        parser.parse_all(&mut trace).unwrap();
        assert_eq!(trace.events, expected_sample_trace());
    }
}

#[test]
fn compression_round_trip() {
    let opts = ExiOptions {
        compression: true,
        ..Default::default()
    };
    let bytes = encode_sample(opts.clone());

    let mut parser = Parser::new(Cursor::new(bytes), None);
    let header = parser.parse_header(None).unwrap();
    assert!(header.opts.compression);

    let mut trace = EventTrace::new();
    parser.parse_all(&mut trace).unwrap();
    assert_eq!(trace.events, expected_sample_trace());
}

#[test]
fn fragment_reports_sibling_roots() {
    let opts = ExiOptions {
        fragment: true,
        ..Default::default()
    };

    let mut s = Serializer::new(Vec::new(), None, opts, false, true);
    s.exi_header().unwrap();
    s.start_document().unwrap();
    s.start_element("", "Test").unwrap();
    s.string_data("first").unwrap();
    s.end_element().unwrap();
    s.start_element("", "Test2").unwrap();
    s.string_data("second").unwrap();
    s.end_element().unwrap();
    s.end_document().unwrap();
    let bytes = s.close().unwrap();

    let mut parser = Parser::new(Cursor::new(bytes), None);
    assert!(parser.parse_header(None).unwrap().opts.fragment);
    let mut trace = EventTrace::new();
    parser.parse_all(&mut trace).unwrap();

    assert_eq!(
        trace.events,
        vec![
            "SD",
            "SE {}Test",
            "CH first",
            "EE",
            "SE {}Test2",
            "CH second",
            "EE",
            "ED",
        ]
    );
}

fn encode_repeated_values(opts: ExiOptions) -> Vec<u8> {
    let mut s = Serializer::new(Vec::new(), None, opts, false, true);
    s.exi_header().unwrap();
    s.start_document().unwrap();
    s.start_element("", "settings").unwrap();
    for name in ["a", "b", "c"] {
        s.start_element("", name).unwrap();
        s.string_data("port").unwrap();
        s.end_element().unwrap();
        s.start_element("", name).unwrap();
        s.string_data("1.0").unwrap();
        s.end_element().unwrap();
    }
    s.end_element().unwrap();
    s.end_document().unwrap();
    s.close().unwrap()
}

#[test]
fn zero_value_partition_capacity_never_interns() {
    let capped = encode_repeated_values(ExiOptions {
        value_partition_capacity: 0,
        ..Default::default()
    });
    let uncapped = encode_repeated_values(ExiOptions::default());

    // without a partition every repeat is a literal, so the stream grows
    assert!(capped.len() > uncapped.len());

    let mut parser = Parser::new(
        Cursor::new(capped),
        None,
    );
    parser.parse_header(Some(&ExiOptions {
        value_partition_capacity: 0,
        ..Default::default()
    })).unwrap();
    let mut trace = EventTrace::new();
    parser.parse_all(&mut trace).unwrap();

    let hits = trace.events.iter().filter(|e| e.as_str() == "CH port").count();
    assert_eq!(hits, 3);
}

#[test]
fn tiny_value_partition_wraps_and_still_round_trips() {
    let opts = ExiOptions {
        value_partition_capacity: 2,
        ..Default::default()
    };
    let bytes = encode_repeated_values(opts.clone());

    let mut parser = Parser::new(Cursor::new(bytes), None);
    parser.parse_header(Some(&opts)).unwrap();
    let mut trace = EventTrace::new();
    parser.parse_all(&mut trace).unwrap();

    let ports = trace.events.iter().filter(|e| e.as_str() == "CH port").count();
    let versions = trace.events.iter().filter(|e| e.as_str() == "CH 1.0").count();
    assert_eq!((ports, versions), (3, 3));
}

#[test]
fn repeated_siblings_learn_one_zero_production() {
    // two identical children: the second SE must ride the learned
    // SE(qname) production, so it costs fewer bits than the first
    let mut s = Serializer::new(Vec::new(), None, ExiOptions::default(), false, true);
    s.exi_header().unwrap();
    s.start_document().unwrap();
    s.start_element("", "root").unwrap();
    for _ in 0..3 {
        s.start_element("", "item").unwrap();
        s.end_element().unwrap();
    }
    s.end_element().unwrap();
    s.end_document().unwrap();
    let bytes = s.close().unwrap();

    let mut parser = Parser::new(Cursor::new(bytes), None);
    parser.parse_header(None).unwrap();
    let mut trace = EventTrace::new();
    parser.parse_all(&mut trace).unwrap();

    assert_eq!(
        trace.events,
        vec![
            "SD",
            "SE {}root",
            "SE {}item",
            "EE",
            "SE {}item",
            "EE",
            "SE {}item",
            "EE",
            "EE",
            "ED",
        ]
    );
}

#[test]
fn handler_stop_aborts_with_the_reserved_code() {
    let bytes = encode_sample(ExiOptions::default());

    let mut parser = Parser::new(Cursor::new(bytes), None);
    parser.parse_header(None).unwrap();
    let mut trace = EventTrace::new();
    trace.stop_after = Some(2);

    let err = parser.parse_all(&mut trace).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HandlerStop);
    assert_eq!(trace.events.len(), 2);
}

#[test]
fn truncated_stream_reports_buffer_end() {
    let mut bytes = encode_sample(ExiOptions::default());
    bytes.truncate(bytes.len() / 2);

    let mut parser = Parser::new(Cursor::new(bytes), None);
    parser.parse_header(None).unwrap();
    let mut trace = EventTrace::new();
    let err = parser.parse_all(&mut trace).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BufferEnd);
}

#[test]
fn preserved_prefixes_carry_namespace_declarations() {
    let opts = ExiOptions {
        preserve: exi_codec::Preserve {
            prefixes: true,
            ..Default::default()
        },
        ..Default::default()
    };

    let mut s = Serializer::new(Vec::new(), None, opts.clone(), false, true);
    s.exi_header().unwrap();
    s.start_document().unwrap();
    s.start_element("urn:example:ns", "doc").unwrap();
    s.namespace_declaration("urn:example:ns", "ex", true).unwrap();
    s.start_element("urn:example:ns", "leaf").unwrap();
    s.string_data("v").unwrap();
    s.end_element().unwrap();
    s.end_element().unwrap();
    s.end_document().unwrap();
    let bytes = s.close().unwrap();

    let mut parser = Parser::new(Cursor::new(bytes), None);
    assert!(parser.parse_header(None).unwrap().opts.preserve.prefixes);
    let mut trace = EventTrace::new();
    parser.parse_all(&mut trace).unwrap();

    assert_eq!(
        trace.events,
        vec![
            "SD",
            "SE {urn:example:ns}doc",
            "NS ex=urn:example:ns local=true",
            "SE {urn:example:ns}leaf",
            "CH v",
            "EE",
            "EE",
            "ED",
        ]
    );
}

#[test]
fn header_options_travel_in_stream() {
    let opts = ExiOptions {
        fragment: true,
        value_partition_capacity: 17,
        ..Default::default()
    };
    let mut s = Serializer::new(Vec::new(), None, opts.clone(), true, true);
    s.exi_header().unwrap();
    s.start_document().unwrap();
    s.start_element("", "x").unwrap();
    s.end_element().unwrap();
    s.end_document().unwrap();
    let bytes = s.close().unwrap();

    // "$EXI" cookie leads the stream
    assert_eq!(&bytes[..4], b"$EXI");

    let mut parser = Parser::new(Cursor::new(bytes), None);
    let header = parser.parse_header(None).unwrap();
    assert!(header.has_cookie);
    assert!(header.opts_in_header);
    assert_eq!(header.opts, opts);
}
