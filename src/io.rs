//! User-feedback sink.
//!
//! The library never prints directly: progress and warnings go through the
//! [`Io`] trait so the host environment decides how to render them and tests
//! can assert on the produced log.

use colored::Colorize;
use std::cell::RefCell;
use std::io::Write as _;

pub trait Io {
    /// Write a message followed by a newline.
    fn write(&self, message: &str);

    /// Write a message without a trailing newline (progress prefixes).
    fn write_partial(&self, message: &str);

    /// Write an error/warning message.
    fn write_error(&self, message: &str);

    fn is_verbose(&self) -> bool;
}

/// Renders messages to stdout/stderr, errors in red.
pub struct ConsoleIo {
    verbose: bool,
}

impl ConsoleIo {
    pub fn new(verbose: bool) -> Self {
        ConsoleIo { verbose }
    }
}

impl Io for ConsoleIo {
    fn write(&self, message: &str) {
        println!("{message}");
    }

    fn write_partial(&self, message: &str) {
        print!("{message}");
        let _ = std::io::stdout().flush();
    }

    fn write_error(&self, message: &str) {
        eprintln!("{}", message.red());
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Captures everything written to it. Used by tests and embedders that want
/// to inspect the log of an install cycle.
#[derive(Default)]
pub struct BufferIo {
    verbose: bool,
    contents: RefCell<String>,
}

impl BufferIo {
    pub fn new(verbose: bool) -> Self {
        BufferIo {
            verbose,
            contents: RefCell::new(String::new()),
        }
    }

    /// Everything logged so far, errors included.
    pub fn contents(&self) -> String {
        self.contents.borrow().clone()
    }

    fn append(&self, message: &str, newline: bool) {
        let mut contents = self.contents.borrow_mut();
        contents.push_str(message);
        if newline {
            contents.push('\n');
        }
    }
}

impl Io for BufferIo {
    fn write(&self, message: &str) {
        self.append(message, true);
    }

    fn write_partial(&self, message: &str) {
        self.append(message, false);
    }

    fn write_error(&self, message: &str) {
        self.append(message, true);
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }
}
