/*
 * Copyright (C) 2024 The Podtimer Authors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 * http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::fmt;
use std::io::{self, IsTerminal, Write};

const COLOR_ERROR: &str = "\x1b[31m";
const COLOR_RESET: &str = "\x1b[0m";

/// Plain command output, kept apart from structured log lines.
pub struct Terminal;

impl Terminal {
    pub fn stdout(args: fmt::Arguments<'_>) {
        let mut handle = io::stdout().lock();
        let _ = handle.write_fmt(args).and_then(|_| handle.write_all(b"\n"));
    }

    pub fn error(args: fmt::Arguments<'_>) {
        let stderr = io::stderr();
        let colored = stderr.is_terminal();
        let mut handle = stderr.lock();
        let _ = (|| -> io::Result<()> {
            if colored {
                handle.write_all(COLOR_ERROR.as_bytes())?;
            }
            handle.write_fmt(args)?;
            if colored {
                handle.write_all(COLOR_RESET.as_bytes())?;
            }
            handle.write_all(b"\n")
        })();
    }
}
