/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::consts::*;
use crate::exi_error::{err_exit_code, ErrorKind, Result};
use crate::helpers::bits_needed;
use crate::options::ExiOptions;
use crate::structs::events::{EventCode, EventType};
use crate::structs::string_tables::QNameId;

/// Right-hand side of a rule. `type_id` indexes the simple-type table for
/// AT/CH productions and the grammar table for SE(qname) productions;
/// INDEX_MAX means untyped (string) content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Production {
    pub event: EventType,
    /// Rule to continue with, or GR_VOID_NON_TERMINAL to pop
    pub non_term: usize,
    pub type_id: usize,
    pub qname_id: QNameId,
}

impl Production {
    pub fn new(event: EventType, non_term: usize) -> Self {
        Production {
            event,
            non_term,
            type_id: INDEX_MAX,
            qname_id: QNameId::VOID,
        }
    }

    pub fn with_qname(event: EventType, non_term: usize, type_id: usize, qname_id: QNameId) -> Self {
        Production {
            event,
            non_term,
            type_id,
            qname_id,
        }
    }
}

/// One parser state: three parallel production arrays keyed by event-code
/// length plus the three field widths.
///
/// Within each part the productions are stored largest-code-first, so the
/// production holding code digit `v` sits at index `len - 1 - v`. The
/// escape value that continues into the next part is `len` itself.
#[derive(Debug, Clone, Default)]
pub struct GrammarRule {
    pub parts: [Vec<Production>; 3],
    pub bits: [u8; 3],
}

impl GrammarRule {
    pub fn new() -> Self {
        GrammarRule::default()
    }

    pub fn recompute_bits(&mut self) {
        let counts = [self.parts[0].len(), self.parts[1].len(), self.parts[2].len()];
        for k in 0..3 {
            let escape = counts[k + 1..].iter().any(|&c| c > 0);
            self.bits[k] = if counts[k] == 0 && !escape {
                0
            } else {
                bits_needed((counts[k] - if escape { 0 } else { 1 }) as u64)
            };
        }
    }

    /// The EXI learning step: every part-one code shifts up by one and the
    /// new production takes code 0. Only meaningful on built-in rules.
    pub fn insert_zero_production(&mut self, prod: Production) {
        self.parts[0].push(prod);
        self.recompute_bits();
    }

    /// Code digit carried by `parts[part][idx]`.
    pub fn code_of(&self, part: usize, idx: usize) -> u32 {
        (self.parts[part].len() - 1 - idx) as u32
    }

    /// Index into `parts[part]` of the production with code digit `v`.
    pub fn index_of_code(&self, part: usize, v: u32) -> Option<usize> {
        let len = self.parts[part].len();
        if (v as usize) < len {
            Some(len - 1 - v as usize)
        } else {
            None
        }
    }

    /// Full event code of `parts[part][idx]`, for tracing and tests.
    pub fn event_code(&self, part: usize, idx: usize) -> EventCode {
        let v = self.code_of(part, idx);
        match part {
            0 => EventCode::of1(v),
            1 => EventCode::of2(self.parts[0].len() as u32, v),
            _ => EventCode::of3(
                self.parts[0].len() as u32,
                self.parts[1].len() as u32,
                v,
            ),
        }
    }

    pub fn production_count(&self) -> usize {
        self.parts.iter().map(|p| p.len()).sum()
    }
}

/// Distinguishes how a grammar was born; built-in grammars learn, schema
/// grammars do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarKind {
    BuiltInDocument,
    BuiltInFragment,
    BuiltInElement,
    SchemaInformed,
}

#[derive(Debug, Clone)]
pub struct ExiGrammar {
    pub kind: GrammarKind,
    pub rules: Vec<GrammarRule>,
    /// Boundary between attribute-accepting rules and content rules
    pub content_index: usize,
    pub nillable: bool,
    pub has_content2: bool,
    pub named_sub_type_or_union: bool,
    /// Set once the undeclared productions for non-strict streams are in
    pub augmented: bool,
}

impl ExiGrammar {
    pub fn new(kind: GrammarKind) -> Self {
        ExiGrammar {
            kind,
            rules: Vec::new(),
            content_index: 0,
            nillable: false,
            has_content2: false,
            named_sub_type_or_union: false,
            augmented: false,
        }
    }

    pub fn is_built_in_element(&self) -> bool {
        self.kind == GrammarKind::BuiltInElement
    }

    pub fn is_document(&self) -> bool {
        matches!(self.kind, GrammarKind::BuiltInDocument | GrammarKind::BuiltInFragment)
    }

    pub fn rule(&self, non_term: usize) -> Result<&GrammarRule> {
        self.rules
            .get(non_term)
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::OutOfBounds, "non-terminal outside grammar"))
    }

    /// The shared one-rule grammar accepting only EE, used for empty
    /// complex types and nil'ed content.
    pub fn empty_type_grammar() -> ExiGrammar {
        let mut g = ExiGrammar::new(GrammarKind::SchemaInformed);
        let mut r = GrammarRule::new();
        r.parts[0].push(Production::new(EventType::EndElement, GR_VOID_NON_TERMINAL));
        r.recompute_bits();
        g.rules.push(r);
        g
    }
}

/// Builds the document grammar. With `global_elements` present (sorted by
/// qname) the DocContent rule enumerates them before SE(*), which is what a
/// schema-informed stream expects.
pub fn create_doc_grammar(opts: &ExiOptions, global_elements: &[(QNameId, usize)]) -> ExiGrammar {
    let mut g = ExiGrammar::new(GrammarKind::BuiltInDocument);

    /* Document : SD DocContent  0 */
    let mut doc = GrammarRule::new();
    doc.parts[0].push(Production::new(EventType::StartDocument, GR_DOC_CONTENT));
    doc.recompute_bits();
    g.rules.push(doc);

    /*
       DocContent :
                    SE (G-0)   DocEnd  0
                    ...
                    SE (G-n-1) DocEnd  n-1
                    SE (*)     DocEnd  n
                    DT DocContent      (n+1).0
                    CM DocContent      (n+1).1.0
                    PI DocContent      (n+1).1.1
     */
    let mut content = GrammarRule::new();
    content.parts[0].push(Production::new(EventType::StartElementAll, GR_DOC_END));
    for &(qname, gr_index) in global_elements.iter().rev() {
        content.parts[0].push(Production::with_qname(
            EventType::StartElementQName,
            GR_DOC_END,
            gr_index,
            qname,
        ));
    }
    if opts.preserve.dtd {
        content.parts[1].push(Production::new(EventType::Doctype, GR_DOC_CONTENT));
    }
    if opts.preserve.comments {
        content.parts[2].push(Production::new(EventType::Comment, GR_DOC_CONTENT));
    }
    if opts.preserve.pis {
        content.parts[2].insert(0, Production::new(EventType::ProcessingInstruction, GR_DOC_CONTENT));
    }
    content.recompute_bits();
    g.rules.push(content);

    /* DocEnd :
                ED         0
                CM DocEnd  1.0
                PI DocEnd  1.1 */
    let mut end = GrammarRule::new();
    end.parts[0].push(Production::new(EventType::EndDocument, GR_VOID_NON_TERMINAL));
    if opts.preserve.comments {
        end.parts[1].push(Production::new(EventType::Comment, GR_DOC_END));
    }
    if opts.preserve.pis {
        end.parts[1].insert(0, Production::new(EventType::ProcessingInstruction, GR_DOC_END));
    }
    end.recompute_bits();
    g.rules.push(end);

    g
}

/// Fragment grammar: siblings at the root instead of a single document
/// element.
pub fn create_fragment_grammar(opts: &ExiOptions) -> ExiGrammar {
    let mut g = ExiGrammar::new(GrammarKind::BuiltInFragment);

    let mut frag = GrammarRule::new();
    frag.parts[0].push(Production::new(EventType::StartDocument, GR_FRAGMENT_CONTENT));
    frag.recompute_bits();
    g.rules.push(frag);

    /* FragmentContent :
                SE (*) FragmentContent  0
                ED                      1
                CM FragmentContent      2.0
                PI FragmentContent      2.1 */
    let mut content = GrammarRule::new();
    content.parts[0].push(Production::new(EventType::EndDocument, GR_VOID_NON_TERMINAL));
    content.parts[0].push(Production::new(EventType::StartElementAll, GR_FRAGMENT_CONTENT));
    if opts.preserve.comments {
        content.parts[1].push(Production::new(EventType::Comment, GR_FRAGMENT_CONTENT));
    }
    if opts.preserve.pis {
        content.parts[1].insert(0, Production::new(EventType::ProcessingInstruction, GR_FRAGMENT_CONTENT));
    }
    content.recompute_bits();
    g.rules.push(content);

    g
}

/// Builds a fresh built-in element grammar, the template every undeclared
/// element starts from. Learned productions accumulate in part one of each
/// rule as the stream teaches it.
pub fn create_built_in_element_grammar(opts: &ExiOptions) -> ExiGrammar {
    let mut g = ExiGrammar::new(GrammarKind::BuiltInElement);

    /* StartTagContent :
                            EE                      0.0
                            AT (*) StartTagContent  0.1
                            NS StartTagContent      0.2
                            SC Fragment             0.3
                            SE (*) ElementContent   0.4
                            CH ElementContent       0.5
                            ER ElementContent       0.6
                            CM ElementContent       0.7.0
                            PI ElementContent       0.7.1 */
    let mut start_tag = GrammarRule::new();
    {
        let p1 = &mut start_tag.parts[0]; // placeholder, filled by learning
        debug_assert!(p1.is_empty());
    }
    let mut second: Vec<Production> = Vec::new();
    second.push(Production::new(EventType::EndElement, GR_VOID_NON_TERMINAL));
    second.push(Production::new(EventType::AttributeAll, GR_START_TAG_CONTENT));
    if opts.preserve.prefixes {
        second.push(Production::new(EventType::NamespaceDecl, GR_START_TAG_CONTENT));
    }
    if opts.self_contained {
        second.push(Production::new(EventType::SelfContained, GR_START_TAG_CONTENT));
    }
    second.push(Production::new(EventType::StartElementAll, GR_ELEMENT_CONTENT));
    second.push(Production::new(EventType::Characters, GR_ELEMENT_CONTENT));
    if opts.preserve.dtd {
        second.push(Production::new(EventType::EntityReference, GR_ELEMENT_CONTENT));
    }
    // reverse so the first option above ends up with the smallest code
    second.reverse();
    start_tag.parts[1] = second;
    if opts.preserve.comments {
        start_tag.parts[2].push(Production::new(EventType::Comment, GR_ELEMENT_CONTENT));
    }
    if opts.preserve.pis {
        start_tag.parts[2].insert(0, Production::new(EventType::ProcessingInstruction, GR_ELEMENT_CONTENT));
    }
    start_tag.recompute_bits();
    g.rules.push(start_tag);

    /* ElementContent :
                            EE                      0
                            SE (*) ElementContent   1.0
                            CH ElementContent       1.1
                            ER ElementContent       1.2
                            CM ElementContent       1.3.0
                            PI ElementContent       1.3.1 */
    let mut content = GrammarRule::new();
    content.parts[0].push(Production::new(EventType::EndElement, GR_VOID_NON_TERMINAL));
    let mut second: Vec<Production> = Vec::new();
    second.push(Production::new(EventType::StartElementAll, GR_ELEMENT_CONTENT));
    second.push(Production::new(EventType::Characters, GR_ELEMENT_CONTENT));
    if opts.preserve.dtd {
        second.push(Production::new(EventType::EntityReference, GR_ELEMENT_CONTENT));
    }
    second.reverse();
    content.parts[1] = second;
    if opts.preserve.comments {
        content.parts[2].push(Production::new(EventType::Comment, GR_ELEMENT_CONTENT));
    }
    if opts.preserve.pis {
        content.parts[2].insert(0, Production::new(EventType::ProcessingInstruction, GR_ELEMENT_CONTENT));
    }
    content.recompute_bits();
    g.rules.push(content);

    g.content_index = GR_ELEMENT_CONTENT;
    g
}

/// Adds the undeclared productions a non-strict schema-informed stream may
/// exercise on top of the compiled grammar: EE escapes, the xsi attributes
/// on the start rule, wildcard attributes up to the content boundary and
/// wildcard/untyped content everywhere after it.
pub fn augment_schema_grammar(g: &mut ExiGrammar, opts: &ExiOptions) {
    if g.augmented || g.kind != GrammarKind::SchemaInformed {
        return;
    }
    g.augmented = true;

    let content_rule = g.content_index;
    for (i, rule) in g.rules.iter_mut().enumerate() {
        let has_ee = rule.parts[0].iter().any(|p| p.event == EventType::EndElement);

        let mut second: Vec<Production> = Vec::new();
        if !has_ee {
            second.push(Production::new(EventType::EndElement, GR_VOID_NON_TERMINAL));
        }
        if i == 0 {
            second.push(Production::with_qname(
                EventType::AttributeQName,
                0,
                INDEX_MAX,
                QNameId { uri: URI_XSI_ID, ln: XSI_TYPE_ID },
            ));
            second.push(Production::with_qname(
                EventType::AttributeQName,
                0,
                INDEX_MAX,
                QNameId { uri: URI_XSI_ID, ln: XSI_NIL_ID },
            ));
        }
        if i <= content_rule {
            second.push(Production::new(EventType::AttributeAll, i));
            if opts.preserve.prefixes {
                second.push(Production::new(EventType::NamespaceDecl, i));
            }
            if opts.self_contained && i == 0 {
                second.push(Production::new(EventType::SelfContained, i));
            }
        }
        second.push(Production::new(EventType::StartElementAll, content_rule));
        second.push(Production::new(EventType::Characters, content_rule));
        if opts.preserve.dtd {
            second.push(Production::new(EventType::EntityReference, content_rule));
        }

        second.reverse();
        // learned/undeclared options go behind whatever the schema compiled
        let mut merged = second;
        merged.extend(rule.parts[1].iter().copied());
        rule.parts[1] = merged;

        if opts.preserve.comments {
            rule.parts[2].push(Production::new(EventType::Comment, content_rule));
        }
        if opts.preserve.pis {
            rule.parts[2].insert(0, Production::new(EventType::ProcessingInstruction, content_rule));
        }
        rule.recompute_bits();
    }
}

/// All grammars of a schema (or the learned pool of a schema-less stream),
/// addressed by index so grammars can reference each other without cycles.
#[derive(Debug, Clone, Default)]
pub struct GrammarTable {
    pub grammars: Vec<ExiGrammar>,
}

impl GrammarTable {
    pub fn add(&mut self, g: ExiGrammar) -> usize {
        self.grammars.push(g);
        self.grammars.len() - 1
    }

    pub fn get(&self, index: usize) -> Result<&ExiGrammar> {
        self.grammars
            .get(index)
            .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::OutOfBounds, "grammar index outside table"))
    }

    pub fn count(&self) -> usize {
        self.grammars.len()
    }
}

pub fn no_production_match<T>(what: &str) -> Result<T> {
    err_exit_code(ErrorKind::NoProductionMatch, what)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Preserve;

    #[test]
    fn default_fidelity_built_in_element_widths() {
        let g = create_built_in_element_grammar(&ExiOptions::default());

        // StartTagContent: empty first part, EE/AT(*)/SE(*)/CH at level two
        let start = &g.rules[GR_START_TAG_CONTENT];
        assert_eq!(start.parts[0].len(), 0);
        assert_eq!(start.parts[1].len(), 4);
        assert_eq!(start.bits, [0, 2, 0]);
        // EE carries code 0.0
        assert_eq!(start.parts[1][3].event, EventType::EndElement);
        assert_eq!(start.code_of(1, 3), 0);
        // CH carries code 0.3
        assert_eq!(start.parts[1][0].event, EventType::Characters);
        assert_eq!(start.code_of(1, 0), 3);

        // ElementContent: EE at level one, SE(*)/CH at level two
        let content = &g.rules[GR_ELEMENT_CONTENT];
        assert_eq!(content.bits, [1, 1, 0]);
        assert_eq!(content.parts[0][0].event, EventType::EndElement);
    }

    #[test]
    fn full_fidelity_built_in_element_widths() {
        let opts = ExiOptions {
            preserve: Preserve {
                comments: true,
                pis: true,
                dtd: true,
                prefixes: true,
                lexical_values: false,
            },
            self_contained: true,
            ..Default::default()
        };
        let g = create_built_in_element_grammar(&opts);

        let start = &g.rules[GR_START_TAG_CONTENT];
        assert_eq!(start.parts[1].len(), 7);
        assert_eq!(start.parts[2].len(), 2);
        assert_eq!(start.bits, [0, 3, 1]);

        let content = &g.rules[GR_ELEMENT_CONTENT];
        assert_eq!(content.parts[1].len(), 3);
        assert_eq!(content.bits, [1, 2, 1]);
    }

    #[test]
    fn learning_shifts_codes_and_widths() {
        let mut g = create_built_in_element_grammar(&ExiOptions::default());
        let content = &mut g.rules[GR_ELEMENT_CONTENT];
        assert_eq!(content.bits[0], 1);

        content.insert_zero_production(Production::with_qname(
            EventType::StartElementQName,
            GR_ELEMENT_CONTENT,
            INDEX_MAX,
            QNameId { uri: 4, ln: 0 },
        ));

        // the learned production takes code 0, EE shifts to 1
        assert_eq!(content.code_of(0, 1), 0);
        assert_eq!(content.parts[0][1].event, EventType::StartElementQName);
        assert_eq!(content.code_of(0, 0), 1);
        assert_eq!(content.bits[0], 1);

        // a second learned production forces two bits
        content.insert_zero_production(Production::with_qname(
            EventType::StartElementQName,
            GR_ELEMENT_CONTENT,
            INDEX_MAX,
            QNameId { uri: 4, ln: 1 },
        ));
        assert_eq!(content.bits[0], 2);
    }

    #[test]
    fn doc_grammar_enumerates_global_elements() {
        let globals = vec![
            (QNameId { uri: 4, ln: 0 }, 7),
            (QNameId { uri: 4, ln: 1 }, 9),
        ];
        let g = create_doc_grammar(&ExiOptions::default(), &globals);
        let content = &g.rules[GR_DOC_CONTENT];

        assert_eq!(content.parts[0].len(), 3);
        // SE(G0) holds code 0, SE(*) the highest
        let idx = content.index_of_code(0, 0).unwrap();
        assert_eq!(content.parts[0][idx].qname_id, QNameId { uri: 4, ln: 0 });
        let idx = content.index_of_code(0, 2).unwrap();
        assert_eq!(content.parts[0][idx].event, EventType::StartElementAll);
        assert_eq!(content.bits[0], 2);
    }
}
