use std::io::{BufRead, Write};

use super::errors;
use super::interpreter::LuaRuntime;

pub const PROMPT: &str = "> ";
pub const SENTINEL: &[u8] = b"quit";

const DESCRIPTION: &str = "This is a REPL for the Lua scripting language.";
const USAGE: &str = "Enter \"quit\" to exit.";

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exit {
    Sentinel,
    EndOfInput,
}

/// Where the shell takes its lines from. Lines are raw bytes; Lua source
/// need not be UTF-8.
pub trait LineSource {
    /// Appends the next line, terminator included, to `buf`. Returns the
    /// number of bytes read, 0 at end of input.
    fn next_line(&mut self, buf: &mut Vec<u8>) -> errors::Result<usize>;
}

impl<T: BufRead> LineSource for T {
    fn next_line(&mut self, buf: &mut Vec<u8>) -> errors::Result<usize> {
        Ok(self.read_until(b'\n', buf)?)
    }
}

pub struct Shell<R, W> {
    input: R,
    output: W,
    runtime: LuaRuntime,
}

impl<R: LineSource, W: Write> Shell<R, W> {
    pub fn new(runtime: LuaRuntime, input: R, output: W) -> Shell<R, W> {
        Shell { input: input, output: output, runtime: runtime }
    }

    pub fn print_banner(&mut self) -> errors::Result<()> {
        writeln!(self.output, "{}", DESCRIPTION)?;
        writeln!(self.output, "{}", self.runtime.version())?;
        writeln!(self.output)?;
        writeln!(self.output, "{}", USAGE)?;
        writeln!(self.output)?;

        Ok(())
    }

    /// Reads and evaluates lines until the sentinel or end of input. The
    /// interpreter state is released when the shell is dropped.
    pub fn run(mut self) -> errors::Result<Exit> {
        self.print_banner()?;

        let mut line = Vec::new();
        loop {
            self.output.write_all(PROMPT.as_bytes())?;
            self.output.flush()?;

            line.clear();
            if self.input.next_line(&mut line)? == 0 {
                log::info!("end of input, leaving");
                return Ok(Exit::EndOfInput);
            }
            let source = strip_line_ending(&line);
            log::trace!("read {:?}", String::from_utf8_lossy(source));

            if is_sentinel(source) {
                log::info!("quit requested");
                return Ok(Exit::Sentinel);
            }

            self.eval_line(source)?;
        }
    }

    /// Evaluates one line, reporting recoverable failures on the output.
    pub fn eval_line(&mut self, source: &[u8]) -> errors::Result<()> {
        match self.runtime.eval(source) {
            Ok(()) => Ok(()),
            Err(ref e) if e.is_recoverable() => {
                writeln!(self.output, "ERROR: {}", e)?;
                self.output.flush()?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

pub fn is_sentinel(line: &[u8]) -> bool {
    line == SENTINEL
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    if line.ends_with(b"\r\n") {
        &line[..line.len() - 2]
    } else if line.ends_with(b"\n") {
        &line[..line.len() - 1]
    } else {
        line
    }
}
