/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::io::{self, Write};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Local;
use slog::{Drain, KV, Level, OwnedKVList, Record, Serializer, slog_o};
use slog_scope::GlobalLoggerGuard;

const PROCESS_LOG_THREAD_NAME: &str = "log-process";
const PROCESS_LOG_CHANNEL_CAPACITY: usize = 4096;

struct ProcessLogValue {
    level: Level,
    message: String,
    kv_pairs: Vec<(String, String)>,
    location: String,
}

impl ProcessLogValue {
    fn message_str(&self) -> &str {
        if self.message.is_empty() {
            "()"
        } else {
            &self.message
        }
    }

    fn write_plain<IO: Write>(&self, io: &mut IO) -> io::Result<()> {
        write!(io, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.6f"))?;
        self.write_record(io)
    }

    fn write_record<IO: Write>(&self, io: &mut IO) -> io::Result<()> {
        write!(io, " {}", self.level.as_short_str())?;
        for (k, v) in &self.kv_pairs {
            write!(io, " {k}: {v},")?;
        }
        write!(io, " {}", self.message_str())?;
        if !self.location.is_empty() {
            write!(io, " <{}>", self.location)?;
        }
        writeln!(io)
    }
}

#[derive(Default)]
pub struct ProcessLogStats {
    passed: AtomicU64,
    dropped: AtomicU64,
}

impl ProcessLogStats {
    pub fn passed(&self) -> u64 {
        self.passed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Format records on the caller side and hand them over to the io thread.
struct ProcessLogDrain {
    sender: AssertUnwindSafe<kanal::Sender<ProcessLogValue>>,
    stats: Arc<ProcessLogStats>,
}

impl Drain for ProcessLogDrain {
    type Ok = ();
    type Err = slog::Error;

    fn log(&self, record: &Record, logger_values: &OwnedKVList) -> Result<(), slog::Error> {
        let mut kv_pairs = Vec::new();
        let mut kv_formatter = FormatterKv(&mut kv_pairs);
        logger_values.serialize(record, &mut kv_formatter)?;
        record.kv().serialize(record, &mut kv_formatter)?;

        let file = record.file();
        let file = file.rsplit_once('/').map(|x| x.1).unwrap_or(file);
        let value = ProcessLogValue {
            level: record.level(),
            message: record.msg().to_string(),
            kv_pairs,
            location: format!("{file}:{}", record.line()),
        };
        match self.sender.try_send(value) {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

struct FormatterKv<'a>(&'a mut Vec<(String, String)>);

impl FormatterKv<'_> {
    fn emit_str_value(&mut self, key: slog::Key, value: &str) -> slog::Result {
        self.0.push((key.to_string(), value.to_string()));
        Ok(())
    }
}

impl Serializer for FormatterKv<'_> {
    fn emit_usize(&mut self, key: slog::Key, val: usize) -> slog::Result {
        let mut buffer = itoa::Buffer::new();
        self.emit_str_value(key, buffer.format(val))
    }

    fn emit_u64(&mut self, key: slog::Key, val: u64) -> slog::Result {
        let mut buffer = itoa::Buffer::new();
        self.emit_str_value(key, buffer.format(val))
    }

    fn emit_i64(&mut self, key: slog::Key, val: i64) -> slog::Result {
        let mut buffer = itoa::Buffer::new();
        self.emit_str_value(key, buffer.format(val))
    }

    fn emit_f64(&mut self, key: slog::Key, val: f64) -> slog::Result {
        let mut buffer = ryu::Buffer::new();
        self.emit_str_value(key, buffer.format(val))
    }

    fn emit_str(&mut self, key: slog::Key, val: &str) -> slog::Result {
        self.emit_str_value(key, val)
    }

    fn emit_arguments(&mut self, key: slog::Key, val: &fmt::Arguments) -> slog::Result {
        self.0.push((key.to_string(), val.to_string()));
        Ok(())
    }
}

struct ProcessLogIoThread {
    receiver: kanal::Receiver<ProcessLogValue>,
    stats: Arc<ProcessLogStats>,
}

impl ProcessLogIoThread {
    fn run_to_end<IO: Write>(self, mut io: IO) {
        let mut buf: Vec<u8> = Vec::with_capacity(1024);
        while let Ok(v) = self.receiver.recv() {
            self.write_value(&mut io, &mut buf, v);
            while let Ok(Some(v)) = self.receiver.try_recv() {
                self.write_value(&mut io, &mut buf, v);
            }
            let _ = io.flush();
        }
    }

    fn write_value<IO: Write>(&self, io: &mut IO, buf: &mut Vec<u8>, v: ProcessLogValue) {
        buf.clear();
        let _ = v.write_plain(buf);
        match io.write_all(buf) {
            Ok(_) => {
                self.stats.passed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn new_process_drain(
    capacity: usize,
) -> (ProcessLogDrain, ProcessLogIoThread, Arc<ProcessLogStats>) {
    let (sender, receiver) = kanal::bounded::<ProcessLogValue>(capacity);
    let stats = Arc::new(ProcessLogStats::default());
    let drain = ProcessLogDrain {
        sender: AssertUnwindSafe(sender),
        stats: Arc::clone(&stats),
    };
    let io_thread = ProcessLogIoThread {
        receiver,
        stats: Arc::clone(&stats),
    };
    (drain, io_thread, stats)
}

/// Map the `-v` count to the max enabled level.
pub fn verbose_level_to_log_level(verbose_level: u8) -> log::Level {
    match verbose_level {
        0 => log::Level::Warn,
        1 => log::Level::Info,
        2 => log::Level::Debug,
        _ => log::Level::Trace,
    }
}

/// Install the process logger, the returned guard must be kept alive.
pub fn setup(verbose_level: u8) -> anyhow::Result<GlobalLoggerGuard> {
    let (drain, io_thread, _stats) = new_process_drain(PROCESS_LOG_CHANNEL_CAPACITY);
    std::thread::Builder::new()
        .name(PROCESS_LOG_THREAD_NAME.to_string())
        .spawn(move || io_thread.run_to_end(io::stderr()))?;

    let logger = slog::Logger::root(drain.fuse(), slog_o!());
    let scope_guard = slog_scope::set_global_logger(logger);

    slog_stdlog::init_with_level(verbose_level_to_log_level(verbose_level))?;
    Ok(scope_guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_format() {
        let v = ProcessLogValue {
            level: Level::Warning,
            message: "reload failed".to_string(),
            kv_pairs: vec![("file".to_string(), "m.yaml".to_string())],
            location: "mod.rs:42".to_string(),
        };
        let mut buf = Vec::new();
        v.write_record(&mut buf).unwrap();
        assert_eq!(
            std::str::from_utf8(&buf).unwrap(),
            " WARN file: m.yaml, reload failed <mod.rs:42>\n"
        );

        let v = ProcessLogValue {
            level: Level::Info,
            message: String::new(),
            kv_pairs: Vec::new(),
            location: String::new(),
        };
        let mut buf = Vec::new();
        v.write_record(&mut buf).unwrap();
        assert_eq!(std::str::from_utf8(&buf).unwrap(), " INFO ()\n");
    }

    #[test]
    fn drain_to_thread() {
        let (drain, io_thread, stats) = new_process_drain(16);
        let logger = slog::Logger::root(drain.fuse(), slog_o!("component" => "test"));
        slog::info!(logger, "hello {}", "world"; "count" => 3u64, "ratio" => 0.5f64);

        let v = io_thread.receiver.try_recv().unwrap().unwrap();
        let mut out = Vec::new();
        let mut buf = Vec::new();
        io_thread.write_value(&mut out, &mut buf, v);
        let s = String::from_utf8(out).unwrap();
        assert!(s.contains(" INFO "));
        assert!(s.contains("component: test,"));
        assert!(s.contains("count: 3,"));
        assert!(s.contains("ratio: 0.5,"));
        assert!(s.contains("hello world <log.rs:"));
        assert_eq!(stats.passed(), 1);
        assert_eq!(stats.dropped(), 0);
    }

    #[test]
    fn overflow_drops() {
        let (drain, _io_thread, stats) = new_process_drain(1);
        let logger = slog::Logger::root(drain.fuse(), slog_o!());
        slog::info!(logger, "first");
        slog::info!(logger, "second");
        assert_eq!(stats.dropped(), 1);
    }

    #[test]
    fn verbosity() {
        assert_eq!(verbose_level_to_log_level(0), log::Level::Warn);
        assert_eq!(verbose_level_to_log_level(1), log::Level::Info);
        assert_eq!(verbose_level_to_log_level(2), log::Level::Debug);
        assert_eq!(verbose_level_to_log_level(9), log::Level::Trace);
    }
}
