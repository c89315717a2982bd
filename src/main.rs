/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use exi_codec::structs::exi_value::{ExiDateTime, ExiDecimal, ExiFloat};
use exi_codec::{ContentHandler, ExiOptions, HandlerAction, Parser};

use log::info;

use std::fs::File;
use std::io::{BufReader, Write};
use std::process::ExitCode;

/// Writes the decoded event stream back out as literal XML text.
struct XmlPrintHandler<W: Write> {
    out: W,
    open_elements: Vec<String>,
    /// Tag still waiting for '>' because attributes may follow
    tag_open: bool,
    pending_attr: Option<String>,
}

impl<W: Write> XmlPrintHandler<W> {
    fn new(out: W) -> Self {
        XmlPrintHandler {
            out,
            open_elements: Vec::new(),
            tag_open: false,
            pending_attr: None,
        }
    }

    fn close_tag_if_open(&mut self) {
        if self.tag_open {
            let _ = write!(self.out, ">");
            self.tag_open = false;
        }
    }

    fn text(&mut self, value: &str) {
        match self.pending_attr.take() {
            Some(name) => {
                let _ = write!(self.out, " {}=\"{}\"", name, value);
            }
            None => {
                self.close_tag_if_open();
                let _ = write!(self.out, "{}", value);
            }
        }
    }
}

impl<W: Write> ContentHandler for XmlPrintHandler<W> {
    fn start_element(&mut self, uri: &str, local_name: &str) -> HandlerAction {
        self.close_tag_if_open();
        if uri.is_empty() {
            let _ = write!(self.out, "<{}", local_name);
        } else {
            let _ = write!(self.out, "<{{{}}}{}", uri, local_name);
        }
        self.open_elements.push(local_name.to_owned());
        self.tag_open = true;
        HandlerAction::Continue
    }

    fn end_element(&mut self) -> HandlerAction {
        let name = self.open_elements.pop().unwrap_or_default();
        if self.tag_open {
            let _ = write!(self.out, "/>");
            self.tag_open = false;
        } else {
            let _ = write!(self.out, "</{}>", name);
        }
        HandlerAction::Continue
    }

    fn attribute(&mut self, uri: &str, local_name: &str) -> HandlerAction {
        self.pending_attr = Some(if uri.is_empty() {
            local_name.to_owned()
        } else {
            format!("{{{}}}{}", uri, local_name)
        });
        HandlerAction::Continue
    }

    fn string_data(&mut self, value: &str) -> HandlerAction {
        self.text(value);
        HandlerAction::Continue
    }

    fn int_data(&mut self, value: i64) -> HandlerAction {
        self.text(&value.to_string());
        HandlerAction::Continue
    }

    fn boolean_data(&mut self, value: bool) -> HandlerAction {
        self.text(if value { "true" } else { "false" });
        HandlerAction::Continue
    }

    fn decimal_data(&mut self, value: ExiDecimal) -> HandlerAction {
        let sign = if value.negative { "-" } else { "" };
        let mut frac: Vec<u8> = Vec::new();
        let mut rest = value.fractional_reversed;
        while rest > 0 {
            frac.push(b'0' + (rest % 10) as u8);
            rest /= 10;
        }
        let frac = String::from_utf8(frac).unwrap_or_default();
        self.text(&format!("{}{}.{}", sign, value.integral, frac));
        HandlerAction::Continue
    }

    fn float_data(&mut self, value: ExiFloat) -> HandlerAction {
        self.text(&format!("{}E{}", value.mantissa, value.exponent));
        HandlerAction::Continue
    }

    fn binary_data(&mut self, value: &[u8]) -> HandlerAction {
        let hex: String = value.iter().map(|b| format!("{:02X}", b)).collect();
        self.text(&hex);
        HandlerAction::Continue
    }

    fn date_time_data(&mut self, value: ExiDateTime) -> HandlerAction {
        self.text(&format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            value.year, value.month, value.day, value.hour, value.minute, value.second
        ));
        HandlerAction::Continue
    }

    fn qname_data(&mut self, uri: &str, local_name: &str) -> HandlerAction {
        self.text(&format!("{{{}}}{}", uri, local_name));
        HandlerAction::Continue
    }

    fn end_document(&mut self) -> HandlerAction {
        let _ = writeln!(self.out);
        HandlerAction::Continue
    }
}

fn print_usage() {
    eprintln!("usage: exi_codec_util decode <exi-file-in> [-fragment]");
    eprintln!("       exi_codec_util header <exi-file-in>");
}

fn main() -> ExitCode {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .env()
        .init()
        .unwrap();

    let mut args = pico_args::Arguments::from_env();
    let command: Option<String> = args.subcommand().ok().flatten();

    match command.as_deref() {
        Some("decode") => {
            let fragment = args.contains("-fragment");
            let path: String = match args.free_from_str() {
                Ok(p) => p,
                Err(_) => {
                    print_usage();
                    return ExitCode::FAILURE;
                }
            };
            let file = match File::open(&path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("cannot open {}: {}", path, e);
                    return ExitCode::FAILURE;
                }
            };

            let mut parser = Parser::new(BufReader::new(file), None);
            let oob = fragment.then(|| ExiOptions {
                fragment: true,
                ..Default::default()
            });
            if let Err(e) = parser.parse_header(oob.as_ref()) {
                eprintln!("header: {}", e);
                return ExitCode::FAILURE;
            }
            info!("header parsed, decoding body");

            let mut handler = XmlPrintHandler::new(std::io::stdout().lock());
            if let Err(e) = parser.parse_all(&mut handler) {
                eprintln!("decode: {}", e);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Some("header") => {
            let path: String = match args.free_from_str() {
                Ok(p) => p,
                Err(_) => {
                    print_usage();
                    return ExitCode::FAILURE;
                }
            };
            let file = match File::open(&path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("cannot open {}: {}", path, e);
                    return ExitCode::FAILURE;
                }
            };
            let mut parser = Parser::new(BufReader::new(file), None);
            match parser.parse_header(None) {
                Ok(h) => {
                    println!("cookie: {}", h.has_cookie);
                    println!("options in header: {}", h.opts_in_header);
                    println!("{:#?}", h.opts);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("header: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        _ => {
            print_usage();
            ExitCode::FAILURE
        }
    }
}
