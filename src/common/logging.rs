// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Process-wide tracing setup.
//!
//! Each line reads `L<mmdd hh:mm:ss.micros> <thread> <target>] fields`. Output goes to
//! `$OVERWIN_LOG_FILE` when it names a writable file and to stderr otherwise.

use std::fmt;
use std::fs::OpenOptions;
use std::sync::{Mutex, OnceLock};

use chrono::Local;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

pub use tracing::{debug, info, warn};

static INIT: OnceLock<()> = OnceLock::new();

struct LineFormat;

fn level_tag(level: &Level) -> char {
    match *level {
        Level::ERROR => 'E',
        Level::WARN => 'W',
        Level::INFO => 'I',
        Level::DEBUG => 'D',
        Level::TRACE => 'T',
    }
}

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let thread = std::thread::current();
        write!(
            writer,
            "{}{} {} {}] ",
            level_tag(metadata.level()),
            Local::now().format("%m%d %H:%M:%S%.6f"),
            thread.name().unwrap_or("-"),
            metadata.target()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Installs the global subscriber once; later calls are no-ops.
pub fn init_with_level(filter: &str) {
    INIT.get_or_init(|| {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(filter));
        let log_file = std::env::var("OVERWIN_LOG_FILE")
            .ok()
            .filter(|path| !path.trim().is_empty());
        if let Some(path) = log_file {
            match OpenOptions::new().create(true).append(true).open(path.trim()) {
                Ok(file) => {
                    let _ = builder
                        .with_ansi(false)
                        .event_format(LineFormat)
                        .with_writer(Mutex::new(file))
                        .try_init();
                    return;
                }
                Err(err) => eprintln!("cannot open log file {}: {}, using stderr", path, err),
            }
        }
        let _ = builder
            .with_ansi(atty::is(atty::Stream::Stderr))
            .event_format(LineFormat)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

/// Initializes logging from `overwin.toml` when present, `info` otherwise.
pub fn init() {
    match crate::overwin_config::config() {
        Ok(cfg) => init_with_level(cfg.effective_log_filter()),
        Err(_) => init_with_level("info"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_tags() {
        let tags: String = [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE]
            .iter()
            .map(level_tag)
            .collect();
        assert_eq!(tags, "EWIDT");
    }

    #[test]
    fn repeated_init_is_harmless() {
        init_with_level("warn");
        init_with_level("debug");
        init();
        info!("logging initialized twice");
    }
}
