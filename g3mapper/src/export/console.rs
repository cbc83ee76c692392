/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io::Write;

use super::Exporter;
use crate::pipeline::MetricDocument;

/// Print one JSON document per line to stdout.
#[derive(Default)]
pub struct ConsoleExporter {}

impl ConsoleExporter {
    fn format_line(doc: &MetricDocument, buf: &mut Vec<u8>) {
        doc.write_json(buf);
        buf.push(b'\n');
    }
}

impl Exporter for ConsoleExporter {
    #[inline]
    fn name(&self) -> &str {
        "console"
    }

    #[inline]
    fn r#type(&self) -> &'static str {
        "Console"
    }

    fn add_document(&self, doc: &MetricDocument) {
        let mut buf = Vec::with_capacity(256);
        ConsoleExporter::format_line(doc, &mut buf);
        let _ = std::io::stdout().lock().write_all(&buf);
    }

    fn flush(&self) {
        let _ = std::io::stdout().lock().flush();
    }
}
