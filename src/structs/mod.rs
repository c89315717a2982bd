/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

pub mod bit_reader;
pub mod bit_writer;
pub mod body_decoder;
pub mod body_encoder;
pub mod content_handler;
pub mod events;
pub mod exi_value;
pub mod grammar;
pub mod grammar_gen;
pub mod grammar_stack;
pub mod header;
pub mod parser;
pub mod proto_grammar;
pub mod schema;
pub mod serializer;
pub mod stream;
pub mod string_tables;
pub mod tree_table;
