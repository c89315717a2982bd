/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::exi_error::{ErrorKind, ExiError};
use crate::structs::exi_value::{ExiDateTime, ExiDecimal, ExiFloat};

/// Returned by every callback; `Stop` aborts the parse with
/// `ErrorKind::HandlerStop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerAction {
    Continue,
    Stop,
}

/// The application-facing callback set, one method per infoset event. All
/// methods default to no-ops so a handler implements only what it consumes.
/// The grammar machine is step-synchronous; these stay plain calls.
pub trait ContentHandler {
    fn start_document(&mut self) -> HandlerAction {
        HandlerAction::Continue
    }

    fn end_document(&mut self) -> HandlerAction {
        HandlerAction::Continue
    }

    fn start_element(&mut self, _uri: &str, _local_name: &str) -> HandlerAction {
        HandlerAction::Continue
    }

    fn end_element(&mut self) -> HandlerAction {
        HandlerAction::Continue
    }

    fn attribute(&mut self, _uri: &str, _local_name: &str) -> HandlerAction {
        HandlerAction::Continue
    }

    fn string_data(&mut self, _value: &str) -> HandlerAction {
        HandlerAction::Continue
    }

    fn int_data(&mut self, _value: i64) -> HandlerAction {
        HandlerAction::Continue
    }

    fn boolean_data(&mut self, _value: bool) -> HandlerAction {
        HandlerAction::Continue
    }

    fn decimal_data(&mut self, _value: ExiDecimal) -> HandlerAction {
        HandlerAction::Continue
    }

    fn float_data(&mut self, _value: ExiFloat) -> HandlerAction {
        HandlerAction::Continue
    }

    fn binary_data(&mut self, _value: &[u8]) -> HandlerAction {
        HandlerAction::Continue
    }

    fn date_time_data(&mut self, _value: ExiDateTime) -> HandlerAction {
        HandlerAction::Continue
    }

    fn qname_data(&mut self, _uri: &str, _local_name: &str) -> HandlerAction {
        HandlerAction::Continue
    }

    fn list_data(&mut self, _item_count: usize) -> HandlerAction {
        HandlerAction::Continue
    }

    fn namespace_declaration(&mut self, _uri: &str, _prefix: &str, _is_local_element: bool) -> HandlerAction {
        HandlerAction::Continue
    }

    fn processing_instruction(&mut self, _target: &str, _data: &str) -> HandlerAction {
        HandlerAction::Continue
    }

    fn comment(&mut self, _text: &str) -> HandlerAction {
        HandlerAction::Continue
    }

    fn doctype(&mut self, _name: &str, _public_id: &str, _system_id: &str, _text: &str) -> HandlerAction {
        HandlerAction::Continue
    }

    fn entity_reference(&mut self, _name: &str) -> HandlerAction {
        HandlerAction::Continue
    }

    fn self_contained(&mut self) -> HandlerAction {
        HandlerAction::Continue
    }

    /// Called before a terminal error propagates, so the application can
    /// log or classify it.
    fn fatal_error(&mut self, _error: &ExiError) {}

    fn warning(&mut self, _kind: ErrorKind, _message: &str) {}
}

/// Turns a callback verdict into control flow for the decode loop.
pub fn check(action: HandlerAction) -> crate::exi_error::Result<()> {
    match action {
        HandlerAction::Continue => Ok(()),
        HandlerAction::Stop => Err(ExiError::new(ErrorKind::HandlerStop, "content handler requested stop")),
    }
}
