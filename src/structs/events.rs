/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

/// Stream event kinds. The discriminants double as the priority order used
/// when event codes are assigned during grammar generation, so they must
/// stay exactly as listed.
///
/// | Name           | Notation    | Value |
/// |----------------|-------------|-------|
/// | Start Document | SD          |  0    |
/// | End Document   | ED          |  1    |
/// | Start Element  | SE( qname ) |  2    |
/// | Start Element  | SE( uri:* ) |  3    |
/// | Start Element  | SE( * )     |  4    |
/// | End Element    | EE          |  5    |
/// | Attribute      | AT( qname ) |  6    |
/// | Attribute      | AT( uri:* ) |  7    |
/// | Attribute      | AT( * )     |  8    |
/// | Characters     | CH          |  9    |
/// | Nm-space Decl  | NS          | 10    |
/// | Comment        | CM          | 11    |
/// | Proc. Instr.   | PI          | 12    |
/// | DOCTYPE        | DT          | 13    |
/// | Entity Ref.    | ER          | 14    |
/// | Self Contained | SC          | 15    |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventType {
    StartDocument = 0,
    EndDocument = 1,
    StartElementQName = 2,
    StartElementUri = 3,
    StartElementAll = 4,
    EndElement = 5,
    AttributeQName = 6,
    AttributeUri = 7,
    AttributeAll = 8,
    Characters = 9,
    NamespaceDecl = 10,
    Comment = 11,
    ProcessingInstruction = 12,
    Doctype = 13,
    EntityReference = 14,
    SelfContained = 15,
    /// Placeholder produced by grammar concatenation, eliminated during
    /// normalization; never reaches the wire
    Void = 16,
}

impl EventType {
    pub fn is_attribute(&self) -> bool {
        matches!(
            self,
            EventType::AttributeQName | EventType::AttributeUri | EventType::AttributeAll
        )
    }
}

/// Up-to-three-part event code. Only used at the edges (tracing, tests);
/// inside the rules the digits are implicit in production order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventCode {
    pub parts: [u32; 3],
    pub length: u8,
}

impl EventCode {
    pub fn of1(a: u32) -> Self {
        EventCode { parts: [a, 0, 0], length: 1 }
    }

    pub fn of2(a: u32, b: u32) -> Self {
        EventCode { parts: [a, b, 0], length: 2 }
    }

    pub fn of3(a: u32, b: u32, c: u32) -> Self {
        EventCode { parts: [a, b, c], length: 3 }
    }
}
