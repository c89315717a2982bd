/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use exi_codec::structs::exi_value::{ExiDateTime, ExiDecimal, ExiFloat};
use exi_codec::{ContentHandler, HandlerAction};

/// Records every callback as one line, so tests can assert whole event
/// traces in order.
#[derive(Default)]
pub struct EventTrace {
    pub events: Vec<String>,
    pub stop_after: Option<usize>,
}

impl EventTrace {
    pub fn new() -> Self {
        EventTrace::default()
    }

    fn push(&mut self, s: String) -> HandlerAction {
        self.events.push(s);
        match self.stop_after {
            Some(n) if self.events.len() >= n => HandlerAction::Stop,
            _ => HandlerAction::Continue,
        }
    }
}

impl ContentHandler for EventTrace {
    fn start_document(&mut self) -> HandlerAction {
        self.push("SD".to_owned())
    }

    fn end_document(&mut self) -> HandlerAction {
        self.push("ED".to_owned())
    }

    fn start_element(&mut self, uri: &str, local_name: &str) -> HandlerAction {
        self.push(format!("SE {{{}}}{}", uri, local_name))
    }

    fn end_element(&mut self) -> HandlerAction {
        self.push("EE".to_owned())
    }

    fn attribute(&mut self, uri: &str, local_name: &str) -> HandlerAction {
        self.push(format!("AT {{{}}}{}", uri, local_name))
    }

    fn string_data(&mut self, value: &str) -> HandlerAction {
        self.push(format!("CH {}", value))
    }

    fn int_data(&mut self, value: i64) -> HandlerAction {
        self.push(format!("INT {}", value))
    }

    fn boolean_data(&mut self, value: bool) -> HandlerAction {
        self.push(format!("BOOL {}", value))
    }

    fn decimal_data(&mut self, value: ExiDecimal) -> HandlerAction {
        self.push(format!(
            "DEC {}{}.{}",
            if value.negative { "-" } else { "" },
            value.integral,
            value.fractional_reversed
        ))
    }

    fn float_data(&mut self, value: ExiFloat) -> HandlerAction {
        self.push(format!("FLT {}E{}", value.mantissa, value.exponent))
    }

    fn binary_data(&mut self, value: &[u8]) -> HandlerAction {
        self.push(format!("BIN {:02X?}", value))
    }

    fn date_time_data(&mut self, value: ExiDateTime) -> HandlerAction {
        self.push(format!(
            "DT {:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            value.year, value.month, value.day, value.hour, value.minute, value.second
        ))
    }

    fn qname_data(&mut self, uri: &str, local_name: &str) -> HandlerAction {
        self.push(format!("QN {{{}}}{}", uri, local_name))
    }

    fn namespace_declaration(&mut self, uri: &str, prefix: &str, is_local: bool) -> HandlerAction {
        self.push(format!("NS {}={} local={}", prefix, uri, is_local))
    }
}
