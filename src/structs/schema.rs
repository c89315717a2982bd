/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::consts::*;
use crate::structs::exi_value::{DateTimeKind, ExiValue};
use crate::structs::grammar::{ExiGrammar, GrammarTable};
use crate::structs::string_tables::{QNameId, UriTable};

/// Which primitive codec carries a simple type's content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypeClass {
    /// Plain string, served through the value partitions
    String,
    /// String that never touches the value partitions (mixed content etc.)
    Untyped,
    Boolean,
    Decimal,
    Float,
    Integer,
    NonNegativeInteger,
    /// Bounded range small enough for a fixed-width representation
    SmallInteger { lower: i64, width: u8 },
    Binary,
    DateTime(DateTimeKind),
    QName,
    List { item_type: usize },
}

/// One row of the schema's simple-type table.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleType {
    pub class: TypeClass,
    /// Index into the enum table when the type carries enumeration facets
    pub enum_id: Option<usize>,
}

impl SimpleType {
    pub fn of(class: TypeClass) -> Self {
        SimpleType { class, enum_id: None }
    }
}

/// Enumeration facet: values are coded as an n-bit index into this sorted
/// list.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDefinition {
    pub type_id: usize,
    pub values: Vec<ExiValue>,
}

/// Everything compiled out of a schema: grammars, simple types and the
/// initial string tables. Shared read-only by any number of streams; each
/// stream clones the string tables it will grow.
#[derive(Debug, Clone)]
pub struct ExiSchema {
    pub uri_table: UriTable,
    pub grammar_table: GrammarTable,
    pub simple_types: Vec<SimpleType>,
    pub enum_table: Vec<EnumDefinition>,
    /// Global element declarations sorted by qname, feeding the
    /// schema-informed document grammar
    pub global_elements: Vec<(QNameId, usize)>,
    /// Index of the shared empty-content grammar
    pub empty_grammar: usize,
}

impl ExiSchema {
    /// A schema object carrying only the built-in XSD types. This is what
    /// the `schemaId = empty` header option selects.
    pub fn built_in_only() -> Self {
        let mut uri_table = UriTable::with_initial_entries(true);
        let mut grammar_table = GrammarTable::default();
        let empty_grammar = grammar_table.add(ExiGrammar::empty_type_grammar());
        crate::structs::grammar_gen::register_built_in_type_grammars(&mut uri_table, &mut grammar_table);

        ExiSchema {
            uri_table,
            grammar_table,
            simple_types: built_in_simple_types(),
            enum_table: Vec::new(),
            global_elements: Vec::new(),
            empty_grammar,
        }
    }

    pub fn simple_type(&self, type_id: usize) -> Option<&SimpleType> {
        self.simple_types.get(type_id)
    }

    /// Grammar compiled for the global element with this qname, if any.
    pub fn element_grammar(&self, qname: QNameId) -> Option<usize> {
        let idx = self.uri_table.ln_entry(qname).elem_grammar;
        (idx != INDEX_MAX).then_some(idx)
    }

    /// Grammar compiled for the global type with this qname, if any.
    pub fn type_grammar(&self, qname: QNameId) -> Option<usize> {
        let idx = self.uri_table.ln_entry(qname).type_grammar;
        (idx != INDEX_MAX).then_some(idx)
    }
}

/// The simple-type rows for the 46 XSD built-ins, indexed by their position
/// in the initial XSD local-name partition (alphabetical), so `type_id` for
/// a built-in equals its local-name id.
pub fn built_in_simple_types() -> Vec<SimpleType> {
    XSD_INITIAL_LOCAL_NAMES
        .iter()
        .map(|name| SimpleType::of(built_in_class(name)))
        .collect()
}

fn built_in_class(name: &str) -> TypeClass {
    match name {
        "boolean" => TypeClass::Boolean,
        "decimal" => TypeClass::Decimal,
        "double" | "float" => TypeClass::Float,
        "integer" | "int" | "long" | "short" | "negativeInteger" | "nonPositiveInteger" => TypeClass::Integer,
        "nonNegativeInteger" | "positiveInteger" | "unsignedLong" | "unsignedInt" | "unsignedShort" => {
            TypeClass::NonNegativeInteger
        }
        "byte" => TypeClass::SmallInteger { lower: -128, width: 8 },
        "unsignedByte" => TypeClass::SmallInteger { lower: 0, width: 8 },
        "base64Binary" | "hexBinary" => TypeClass::Binary,
        "dateTime" => TypeClass::DateTime(DateTimeKind::DateTime),
        "date" => TypeClass::DateTime(DateTimeKind::Date),
        "time" => TypeClass::DateTime(DateTimeKind::Time),
        "gYearMonth" => TypeClass::DateTime(DateTimeKind::GYearMonth),
        "gYear" => TypeClass::DateTime(DateTimeKind::GYear),
        "gMonthDay" => TypeClass::DateTime(DateTimeKind::GMonthDay),
        "gMonth" => TypeClass::DateTime(DateTimeKind::GMonth),
        "gDay" => TypeClass::DateTime(DateTimeKind::GDay),
        "QName" | "NOTATION" => TypeClass::QName,
        "ENTITIES" => TypeClass::List { item_type: ln_id_of("ENTITY") },
        "IDREFS" => TypeClass::List { item_type: ln_id_of("IDREF") },
        "NMTOKENS" => TypeClass::List { item_type: ln_id_of("NMTOKEN") },
        "anyType" => TypeClass::Untyped,
        _ => TypeClass::String,
    }
}

fn ln_id_of(name: &str) -> usize {
    XSD_INITIAL_LOCAL_NAMES
        .iter()
        .position(|n| *n == name)
        .expect("built-in name")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_type_ids_align_with_local_names() {
        let types = built_in_simple_types();
        assert_eq!(types.len(), 46);

        let string_id = ln_id_of("string");
        assert_eq!(types[string_id].class, TypeClass::String);

        let int_id = ln_id_of("int");
        assert_eq!(types[int_id].class, TypeClass::Integer);

        let ub_id = ln_id_of("unsignedByte");
        assert_eq!(types[ub_id].class, TypeClass::SmallInteger { lower: 0, width: 8 });

        let entities = ln_id_of("ENTITIES");
        assert_eq!(
            types[entities].class,
            TypeClass::List { item_type: ln_id_of("ENTITY") }
        );
    }
}
