/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::cmp::Ordering;

use crate::consts::*;
use crate::exi_error::{err_exit_code, ErrorKind, Result};
use crate::structs::events::EventType;
use crate::structs::grammar::{ExiGrammar, GrammarKind, GrammarRule, Production};
use crate::structs::string_tables::{QNameId, UriTable};

/// Mutable, non-normalized grammar under construction. Rules are plain
/// production lists; event codes exist only after [`assign_codes`] fixes an
/// order.
#[derive(Debug, Clone, Default)]
pub struct ProtoGrammar {
    pub rules: Vec<ProtoRule>,
    pub content_index: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ProtoRule {
    pub prods: Vec<Production>,
}

impl ProtoRule {
    pub fn has_ee(&self) -> bool {
        self.prods.iter().any(|p| p.event == EventType::EndElement)
    }

    pub fn add_ee(&mut self) {
        self.prods.push(Production::new(EventType::EndElement, GR_VOID_NON_TERMINAL));
    }
}

impl ProtoGrammar {
    pub fn with_rules(n: usize) -> Self {
        ProtoGrammar {
            rules: vec![ProtoRule::default(); n],
            content_index: 0,
        }
    }

    pub fn add_rule(&mut self) -> &mut ProtoRule {
        self.rules.push(ProtoRule::default());
        self.rules.last_mut().unwrap()
    }
}

/// True when the two rules describe the same state: the same production
/// set up to ordering, compared by terminal symbol and type.
fn rules_equal(g1: &ProtoGrammar, r1: usize, g2: &ProtoGrammar, r2: usize) -> bool {
    let a = &g1.rules[r1].prods;
    let b = &g2.rules[r2].prods;
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|p| {
        b.iter()
            .any(|q| p.event == q.event && p.type_id == q.type_id && p.qname_id == q.qname_id)
    })
}

fn shifted_non_term(p: &Production, shift: usize) -> usize {
    if p.event == EventType::EndElement {
        p.non_term
    } else {
        p.non_term + shift
    }
}

/// Splices every rule of `right` after `left`'s rules and merges `right`'s
/// rule 0 into each left rule that can end (its EE is replaced by the
/// successor productions). Same-terminal collisions against a different
/// successor are resolved by synthesizing union rules until closure.
pub fn concatenate(left: &mut ProtoGrammar, right: &ProtoGrammar) -> Result<()> {
    if right.rules.is_empty() {
        return Ok(());
    }

    let initial_left = left.rules.len();

    for rule in right.rules.iter().skip(1) {
        let new_rule = left.add_rule();
        for p in &rule.prods {
            let mut np = *p;
            np.non_term = shifted_non_term(p, initial_left - 1);
            new_rule.prods.push(np);
        }
    }

    let mut curr_rule_index = left.rules.len();

    for rule_l in 0..initial_left {
        let Some(ee_pos) = left.rules[rule_l]
            .prods
            .iter()
            .position(|p| p.event == EventType::EndElement)
        else {
            continue;
        };

        if rules_equal(left, rule_l, right, 0) {
            continue;
        }

        left.rules[rule_l].prods.remove(ee_pos);

        if left.rules[rule_l].prods.is_empty() {
            for p in &right.rules[0].prods {
                let mut np = *p;
                np.non_term = shifted_non_term(p, initial_left - 1);
                left.rules[rule_l].prods.push(np);
            }
        } else {
            add_productions_to_a_rule(left, rule_l, right, 0, &mut curr_rule_index, initial_left - 1)?;
        }
    }

    Ok(())
}

/// Collision-aware merge of `right.rules[rule_r]` into `left.rules[rule_l]`
/// with `shift` applied to the incoming successor indices. A production
/// whose successor is rule 0 of `right` needs care: rule 0 is being merged
/// away, so the successor must land on an equivalent state, synthesizing
/// one when none exists.
fn add_productions_to_a_rule(
    left: &mut ProtoGrammar,
    rule_l: usize,
    right: &ProtoGrammar,
    rule_r: usize,
    curr_rule_index: &mut usize,
    shift: usize,
) -> Result<()> {
    let incoming = right.rules[rule_r].prods.clone();

    for p in &incoming {
        let non_term_right = if p.event != EventType::EndElement && p.non_term == 0 {
            // successor is the merged-away start rule
            let all_in = right.rules[rule_r]
                .prods
                .iter()
                .filter(|q| q.event != EventType::EndElement)
                .all(|q| left.rules[rule_l].prods.iter().any(|lp| lp.event == q.event));

            if all_in {
                rule_l
            } else if let Some(equal) = (0..left.rules.len())
                .find(|&i| i != rule_l && rules_equal(left, i, right, rule_r))
            {
                equal
            } else {
                // synthesize a fresh rule equivalent to (right, rule_r)
                let idx = *curr_rule_index;
                let new_rule = left.add_rule();
                for q in &right.rules[rule_r].prods {
                    let mut nq = *q;
                    nq.non_term = shifted_non_term(q, shift);
                    new_rule.prods.push(nq);
                }
                *curr_rule_index += 1;
                idx
            }
        } else {
            shifted_non_term(p, shift)
        };

        let mut found = false;
        for lp in &left.rules[rule_l].prods {
            if lp.event == p.event && lp.type_id == p.type_id && lp.qname_id == p.qname_id {
                if lp.event == EventType::EndElement || lp.non_term == non_term_right {
                    found = true;
                    break;
                }
                if rules_equal(left, lp.non_term, left, non_term_right) {
                    // different indices, identical states
                    found = true;
                    break;
                }
                return err_exit_code(
                    ErrorKind::InconsistentState,
                    "unresolvable collision while merging grammar rules",
                );
            }
        }

        if !found {
            let mut np = *p;
            np.non_term = non_term_right;
            left.rules[rule_l].prods.push(np);
        }
    }

    Ok(())
}

/// `R0 := CH(type) R1; R1 := EE`
pub fn create_simple_type_grammar(type_id: usize) -> ProtoGrammar {
    let mut g = ProtoGrammar::with_rules(0);
    g.add_rule()
        .prods
        .push(Production::with_qname(EventType::Characters, 1, type_id, QNameId::VOID));
    g.add_rule().add_ee();
    g
}

/// `R0 := AT(qname, type) R1 [| EE]; R1 := EE`
pub fn create_attribute_use_grammar(required: bool, type_id: usize, qname: QNameId) -> ProtoGrammar {
    let mut g = ProtoGrammar::with_rules(0);
    let r0 = g.add_rule();
    r0.prods
        .push(Production::with_qname(EventType::AttributeQName, 1, type_id, qname));
    if !required {
        r0.add_ee();
    }
    g.add_rule().add_ee();
    g
}

/// `R0 := SE(qname -> grammar) R1; R1 := EE`
pub fn create_element_term_grammar(qname: QNameId, gr_index: usize) -> ProtoGrammar {
    let mut g = ProtoGrammar::with_rules(0);
    g.add_rule()
        .prods
        .push(Production::with_qname(EventType::StartElementQName, 1, gr_index, qname));
    g.add_rule().add_ee();
    g
}

/// `##any`/`##other` compile to SE(*); explicit namespaces to one SE(uri)
/// per listed namespace.
pub fn create_wildcard_term_grammar(namespaces: &[String], uri_table: &UriTable) -> Result<ProtoGrammar> {
    let mut g = ProtoGrammar::with_rules(0);
    let r0 = g.add_rule();

    if namespaces.is_empty() || (namespaces.len() == 1 && (namespaces[0] == "##any" || namespaces[0] == "##other")) {
        r0.prods.push(Production::new(EventType::StartElementAll, 1));
    } else {
        for ns in namespaces {
            let uri_id = uri_table
                .lookup_uri(ns)
                .ok_or_else(|| crate::exi_error::ExiError::new(ErrorKind::LanguageElemUnknown, "wildcard namespace is not in the uri table"))?;
            r0.prods.push(Production::with_qname(
                EventType::StartElementUri,
                1,
                INDEX_MAX,
                QNameId { uri: uri_id, ln: INDEX_MAX },
            ));
        }
    }

    g.add_rule().add_ee();
    Ok(g)
}

/// Repeats `term` per the particle bounds. Unbounded particles get a back
/// edge: every non-start rule that can end loops back over the start
/// rule's productions.
pub fn create_particle_grammar(min_occurs: usize, max_occurs: Option<usize>, term: &mut ProtoGrammar) -> Result<ProtoGrammar> {
    let mut particle = ProtoGrammar::with_rules(0);
    particle.add_rule().add_ee();

    for _ in 0..min_occurs {
        concatenate(&mut particle, term)?;
    }

    let optional_copies = match max_occurs {
        Some(max) if max > min_occurs => max - min_occurs,
        None => 0,
        _ => return Ok(particle),
    };

    if !term.rules[0].has_ee() {
        term.rules[0].add_ee();
    }

    match max_occurs {
        Some(_) => {
            for _ in 0..optional_copies {
                concatenate(&mut particle, term)?;
            }
        }
        None => {
            // unbounded: close the term over itself before the final splice
            let mut curr_rule_index = term.rules.len();
            for i in 1..term.rules.len() {
                let Some(ee_pos) = term.rules[i].prods.iter().position(|p| p.event == EventType::EndElement)
                else {
                    continue;
                };
                if rules_equal(term, i, term, 0) {
                    continue;
                }
                term.rules[i].prods.remove(ee_pos);
                if term.rules[i].prods.is_empty() {
                    let start = term.rules[0].prods.clone();
                    term.rules[i].prods = start;
                } else {
                    let snapshot = term.clone();
                    add_productions_to_a_rule(term, i, &snapshot, 0, &mut curr_rule_index, 0)?;
                }
            }
            concatenate(&mut particle, term)?;
        }
    }

    Ok(particle)
}

/// Left-fold concatenation of the member particles.
pub fn create_sequence_grammar(parts: &[ProtoGrammar]) -> Result<ProtoGrammar> {
    let mut seq = ProtoGrammar::with_rules(0);
    seq.add_rule().add_ee();
    for part in parts {
        concatenate(&mut seq, part)?;
    }
    Ok(seq)
}

/// First member concatenates; every further member splices its deeper
/// rules and unions its start rule into the accumulator's start rule.
pub fn create_choice_grammar(parts: &[ProtoGrammar]) -> Result<ProtoGrammar> {
    let mut choice = ProtoGrammar::with_rules(0);
    choice.add_rule().add_ee();

    let Some(first) = parts.first() else {
        return Ok(choice);
    };
    concatenate(&mut choice, first)?;

    for part in &parts[1..] {
        let initial = choice.rules.len();

        for rule in part.rules.iter().skip(1) {
            let new_rule = choice.add_rule();
            for p in &rule.prods {
                let mut np = *p;
                np.non_term = shifted_non_term(p, initial - 1);
                new_rule.prods.push(np);
            }
        }

        let mut curr_rule_index = choice.rules.len();
        if !rules_equal(&choice, 0, part, 0) {
            if choice.rules[0].prods.is_empty() {
                for p in &part.rules[0].prods {
                    let mut np = *p;
                    np.non_term = shifted_non_term(p, initial - 1);
                    choice.rules[0].prods.push(np);
                }
            } else {
                add_productions_to_a_rule(&mut choice, 0, part, 0, &mut curr_rule_index, initial - 1)?;
            }
        }
    }

    Ok(choice)
}

/// Complex type = sorted attribute uses, then the content model; mixed
/// content adds an untyped CH self-loop to every content rule.
pub fn create_complex_type_grammar(
    attr_uses: &[ProtoGrammar],
    content: Option<&mut ProtoGrammar>,
    is_mixed: bool,
) -> Result<ProtoGrammar> {
    let content = match content {
        Some(c) => {
            if is_mixed {
                for i in 0..c.rules.len() {
                    c.rules[i]
                        .prods
                        .push(Production::with_qname(EventType::Characters, i, INDEX_MAX, QNameId::VOID));
                }
            }
            Some(&*c)
        }
        None => None,
    };

    if attr_uses.is_empty() {
        let mut g = match content {
            Some(c) => c.clone(),
            None => {
                let mut g = ProtoGrammar::with_rules(0);
                g.add_rule().add_ee();
                g
            }
        };
        g.content_index = 0;
        return Ok(g);
    }

    let mut complex = ProtoGrammar::with_rules(0);
    complex.add_rule().add_ee();

    for attr in attr_uses {
        concatenate(&mut complex, attr)?;
    }

    complex.content_index = complex.rules.len() - 1;

    if let Some(c) = content {
        concatenate(&mut complex, c)?;
    }

    Ok(complex)
}

/// Orders qname ids the way compact identifiers demand: within a namespace
/// by insertion id, across namespaces by local-name string then uri id.
pub fn compare_qname_id(q1: QNameId, q2: QNameId, uri_table: &UriTable) -> Ordering {
    if q1.uri == q2.uri {
        return q1.ln.cmp(&q2.ln);
    }
    let ln1 = &uri_table.uris[q1.uri].ln_table[q1.ln].ln;
    let ln2 = &uri_table.uris[q2.uri].ln_table[q2.ln].ln;
    match ln1.cmp(ln2) {
        Ordering::Equal => q1.uri.cmp(&q2.uri),
        other => other,
    }
}

/// Fixes the event-code order of every rule: a stable descending sort on
/// (event kind, qname, successor) so the most specific productions end up
/// with the smallest code digits once the arrays are read largest-first.
pub fn assign_codes(pg: &mut ProtoGrammar, uri_table: &UriTable) {
    for rule in &mut pg.rules {
        rule.prods.sort_by(|p1, p2| {
            let e1 = p1.event as u8;
            let e2 = p2.event as u8;
            if e1 != e2 {
                return e2.cmp(&e1);
            }
            match p1.event {
                EventType::AttributeQName => compare_qname_id(p2.qname_id, p1.qname_id, uri_table),
                EventType::AttributeUri => p2.qname_id.uri.cmp(&p1.qname_id.uri),
                EventType::StartElementQName => p2.non_term.cmp(&p1.non_term),
                _ => Ordering::Equal,
            }
        });
    }
}

/// Removes terminal-less productions (inlining their successor rule) and
/// duplicate productions left behind by the merge operators.
pub fn normalize(pg: &mut ProtoGrammar) {
    // inline VOID productions: the successor rule's productions stand in
    loop {
        let mut replaced = false;
        for i in 0..pg.rules.len() {
            let Some(pos) = pg.rules[i].prods.iter().position(|p| p.event == EventType::Void) else {
                continue;
            };
            let target = pg.rules[i].prods[pos].non_term;
            pg.rules[i].prods.remove(pos);
            if target != i {
                let inlined = pg.rules[target].prods.clone();
                pg.rules[i].prods.extend(inlined);
            }
            replaced = true;
        }
        if !replaced {
            break;
        }
    }

    for rule in &mut pg.rules {
        let mut seen: Vec<Production> = Vec::with_capacity(rule.prods.len());
        rule.prods.retain(|p| {
            if seen
                .iter()
                .any(|q| q.event == p.event && q.type_id == p.type_id && q.qname_id == p.qname_id && q.non_term == p.non_term)
            {
                false
            } else {
                seen.push(*p);
                true
            }
        });
    }
}

/// Flattens a finished proto-grammar into the static form the codec runs:
/// one first-part production array per rule, widths computed, content and
/// EE metadata derived.
pub fn convert_proto_grammar(pg: &ProtoGrammar) -> ExiGrammar {
    let mut g = ExiGrammar::new(GrammarKind::SchemaInformed);
    g.content_index = pg.content_index;

    for proto_rule in &pg.rules {
        let mut rule = GrammarRule::new();
        rule.parts[0] = proto_rule.prods.clone();
        rule.recompute_bits();
        g.rules.push(rule);
    }

    // content2 exists when the content boundary is the start rule or some
    // attribute production jumps straight to it
    if g.content_index == 0 {
        g.has_content2 = true;
    } else {
        'outer: for rule in g.rules.iter().take(g.content_index) {
            for p in &rule.parts[0] {
                if p.event.is_attribute() && p.non_term == g.content_index {
                    g.has_content2 = true;
                    break 'outer;
                }
            }
        }
    }

    g
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qn(uri: usize, ln: usize) -> QNameId {
        QNameId { uri, ln }
    }

    #[test]
    fn simple_type_grammar_shape() {
        let g = create_simple_type_grammar(7);
        assert_eq!(g.rules.len(), 2);
        assert_eq!(g.rules[0].prods[0].event, EventType::Characters);
        assert_eq!(g.rules[0].prods[0].type_id, 7);
        assert!(g.rules[1].has_ee());
    }

    #[test]
    fn concatenate_replaces_ee_with_successor() {
        // L: R0 := EE        R: R0 := SE(q) R1; R1 := EE
        let mut left = ProtoGrammar::with_rules(0);
        left.add_rule().add_ee();
        let right = create_element_term_grammar(qn(4, 0), 11);

        concatenate(&mut left, &right).unwrap();

        // L gains R's rule 1 and its start rule now opens the element
        assert_eq!(left.rules.len(), 2);
        assert_eq!(left.rules[0].prods.len(), 1);
        assert_eq!(left.rules[0].prods[0].event, EventType::StartElementQName);
        assert_eq!(left.rules[0].prods[0].non_term, 1);
        assert!(left.rules[1].has_ee());
    }

    #[test]
    fn optional_particle_keeps_ee_alongside() {
        let mut term = create_element_term_grammar(qn(4, 0), 3);
        let particle = create_particle_grammar(0, Some(1), &mut term).unwrap();

        // minOccurs=0: the start rule offers both the element and EE
        let r0 = &particle.rules[0].prods;
        assert!(r0.iter().any(|p| p.event == EventType::StartElementQName));
        assert!(particle.rules[0].has_ee());
    }

    #[test]
    fn unbounded_particle_loops_back() {
        let mut term = create_element_term_grammar(qn(4, 0), 3);
        let particle = create_particle_grammar(1, None, &mut term).unwrap();

        // after one mandatory occurrence the element can repeat
        let after = particle
            .rules
            .iter()
            .skip(1)
            .any(|r| r.prods.iter().any(|p| p.event == EventType::StartElementQName) && r.has_ee());
        assert!(after, "the post-occurrence rule must both repeat and end");
    }

    #[test]
    fn sequence_orders_members() {
        let mut a = create_element_term_grammar(qn(4, 0), 1);
        let mut b = create_element_term_grammar(qn(4, 1), 2);
        let pa = create_particle_grammar(1, Some(1), &mut a).unwrap();
        let pb = create_particle_grammar(1, Some(1), &mut b).unwrap();
        let seq = create_sequence_grammar(&[pa, pb]).unwrap();

        // start rule accepts only the first member
        assert_eq!(seq.rules[0].prods.len(), 1);
        assert_eq!(seq.rules[0].prods[0].qname_id, qn(4, 0));

        // somewhere later the second member opens and the grammar can end
        assert!(seq
            .rules
            .iter()
            .any(|r| r.prods.iter().any(|p| p.qname_id == qn(4, 1))));
        assert!(seq.rules.iter().any(|r| r.has_ee()));
    }

    #[test]
    fn choice_unions_start_rules() {
        let mut a = create_element_term_grammar(qn(4, 0), 1);
        let mut b = create_element_term_grammar(qn(4, 1), 2);
        let pa = create_particle_grammar(1, Some(1), &mut a).unwrap();
        let pb = create_particle_grammar(1, Some(1), &mut b).unwrap();
        let choice = create_choice_grammar(&[pa, pb]).unwrap();

        let starts: Vec<QNameId> = choice.rules[0]
            .prods
            .iter()
            .filter(|p| p.event == EventType::StartElementQName)
            .map(|p| p.qname_id)
            .collect();
        assert!(starts.contains(&qn(4, 0)));
        assert!(starts.contains(&qn(4, 1)));
    }

    #[test]
    fn assign_codes_puts_attributes_behind_elements() {
        let uri_table = UriTable::with_initial_entries(true);
        let mut pg = ProtoGrammar::with_rules(0);
        let r0 = pg.add_rule();
        r0.add_ee();
        r0.prods
            .push(Production::with_qname(EventType::AttributeQName, 0, 1, qn(3, 0)));
        r0.prods
            .push(Production::with_qname(EventType::StartElementQName, 1, 2, qn(3, 1)));

        assign_codes(&mut pg, &uri_table);

        // descending event kind: AT, EE, SE -> SE gets the smallest code
        let events: Vec<EventType> = pg.rules[0].prods.iter().map(|p| p.event).collect();
        assert_eq!(
            events,
            vec![EventType::AttributeQName, EventType::EndElement, EventType::StartElementQName]
        );

        let g = convert_proto_grammar(&pg);
        let idx = g.rules[0].index_of_code(0, 0).unwrap();
        assert_eq!(g.rules[0].parts[0][idx].event, EventType::StartElementQName);
    }

    #[test]
    fn attribute_uses_sort_by_qname_for_codes() {
        let mut uri_table = UriTable::with_initial_entries(true);
        let u = uri_table.add_uri("urn:a".to_owned());
        let ln_b = uri_table.add_ln(u, "beta".to_owned());
        let ln_a = uri_table.add_ln(u, "alpha".to_owned());

        let mut pg = ProtoGrammar::with_rules(0);
        let r0 = pg.add_rule();
        r0.prods
            .push(Production::with_qname(EventType::AttributeQName, 1, 0, qn(u, ln_b)));
        r0.prods
            .push(Production::with_qname(EventType::AttributeQName, 1, 0, qn(u, ln_a)));

        assign_codes(&mut pg, &uri_table);
        let g = convert_proto_grammar(&pg);

        // within one namespace the smaller local-name id wins code 0
        let idx = g.rules[0].index_of_code(0, 0).unwrap();
        assert_eq!(g.rules[0].parts[0][idx].qname_id.ln, ln_a.min(ln_b));
    }
}
