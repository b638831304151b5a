//! Narrow wrapper around the embedded Lua state.
//!
//! The foreign interpreter reports failures by leaving a value on its own
//! stack; everything here turns that into an `errors::Result` so callers
//! never have to look at the stack themselves.

use mlua::{Function, Lua, LuaOptions, MultiValue, StdLib, Table};

use super::errors::{self, ErrorKind};
use super::shell::LineSource;

// Must follow the Lua release vendored by mlua-sys (lua-src 547 for mlua 0.10).
const RELEASE: &str = "Lua 5.4.7";
const COPYRIGHT: &str = "Copyright (C) 1994-2024 Lua.org, PUC-Rio";
const TRACEBACK_MARKER: &str = "\nstack traceback:";

// Captures `io.stdin` and its `read` method once, so later scripts that
// swap `io.input` or `io.read` do not change where the shell reads from.
const STDIN_READER: &str = "\
local f = io.stdin
local read = f.read
return function() return read(f, 'L') end";

/// A line of source that parsed successfully but has not run yet.
pub struct CompiledUnit(Function);

/// Reads lines through the interpreter's own C `stdin` stream, so the shell
/// and scripts calling `io.read` share one buffer.
pub struct LuaStdin(Function);

impl LineSource for LuaStdin {
    fn next_line(&mut self, buf: &mut Vec<u8>) -> errors::Result<usize> {
        let line = self
            .0
            .call::<Option<mlua::String>>(())
            .map_err(|e| format!("cannot read stdin: {}", describe(&e)))?;

        match line {
            Some(line) => {
                let bytes = line.as_bytes();
                buf.extend_from_slice(&bytes);
                Ok(bytes.len())
            }
            None => Ok(0),
        }
    }
}

/// Owns the interpreter state for the whole session. The state is closed
/// exactly once, when this value is dropped.
pub struct LuaRuntime {
    lua: Lua,
}

impl LuaRuntime {
    /// Creates a fresh state with the standard libraries installed.
    pub fn new() -> errors::Result<LuaRuntime> {
        let lua = Lua::new_with(StdLib::ALL_SAFE, LuaOptions::new())
            .map_err(|e| ErrorKind::StateCreation(e.to_string()))?;
        log::debug!("interpreter state created, {} KiB in use", lua.used_memory() / 1024);

        Ok(LuaRuntime { lua: lua })
    }

    /// Version and copyright line, e.g. `Lua 5.4.7  Copyright (C) ...`.
    pub fn version(&self) -> String {
        let version = self
            .lua
            .globals()
            .get::<String>("_VERSION")
            .unwrap_or_else(|_| "Lua".to_owned());

        if RELEASE.starts_with(&version) {
            format!("{}  {}", RELEASE, COPYRIGHT)
        } else {
            format!("{}  {}", version, COPYRIGHT)
        }
    }

    pub fn stdin_reader(&self) -> errors::Result<LuaStdin> {
        let io = self
            .lua
            .globals()
            .get::<Option<Table>>("io")
            .map_err(|e| describe(&e))?;
        if io.is_none() {
            bail!("the io library is not loaded");
        }

        let read = self
            .lua
            .load(STDIN_READER)
            .set_name("=stdin")
            .call::<Function>(())
            .map_err(|e| describe(&e))?;

        Ok(LuaStdin(read))
    }

    /// Compiles `source` up to its first NUL byte, as a C string would be.
    pub fn compile(&self, source: &[u8]) -> errors::Result<CompiledUnit> {
        let source = until_nul(source);

        self.lua
            .load(source)
            .set_name(String::from_utf8_lossy(source))
            .into_function()
            .map(CompiledUnit)
            .map_err(|e| ErrorKind::Compile(describe(&e)).into())
    }

    /// Runs a unit with no arguments; whatever it returns is discarded.
    pub fn execute(&self, unit: CompiledUnit) -> errors::Result<()> {
        unit.0
            .call::<MultiValue>(())
            .map(|_| ())
            .map_err(|e| ErrorKind::Runtime(describe(&e)).into())
    }

    pub fn eval(&self, source: &[u8]) -> errors::Result<()> {
        let unit = self.compile(source).map_err(|e| {
            log::debug!("load failed: {}", e);
            e
        })?;

        self.execute(unit).map_err(|e| {
            log::debug!("call failed: {}", e);
            e
        })
    }
}

impl Drop for LuaRuntime {
    fn drop(&mut self) {
        log::debug!("closing interpreter state");
    }
}

fn until_nul(source: &[u8]) -> &[u8] {
    match source.iter().position(|&b| b == 0) {
        Some(idx) => &source[..idx],
        None => source,
    }
}

/// The message the interpreter attached to a failure, on a single line.
fn describe(err: &mlua::Error) -> String {
    let message = match *err {
        mlua::Error::SyntaxError { ref message, .. } => message.clone(),
        mlua::Error::RuntimeError(ref message) => message.clone(),
        mlua::Error::MemoryError(ref message) => message.clone(),
        mlua::Error::CallbackError { ref cause, .. } => return describe(cause),
        ref other => other.to_string(),
    };

    strip_traceback(&message).to_owned()
}

fn strip_traceback(message: &str) -> &str {
    match message.find(TRACEBACK_MARKER) {
        Some(idx) => &message[..idx],
        None => message,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn runtime() -> LuaRuntime {
        LuaRuntime::new().unwrap()
    }

    #[test]
    fn test_version() {
        let v = runtime().version();
        assert!(v.starts_with("Lua 5.4.7  Copyright"), "got: {}", v);
        assert!(v.contains("Lua.org"));
    }

    #[test]
    fn test_valid_lines() {
        let rt = runtime();
        let lines = ["1+1", "return 1+1", "x = 2", "local y = x * 3", "", "-- comment"];

        for l in &lines {
            assert!(rt.eval(l.as_bytes()).is_ok(), "input: {}", l);
        }
    }

    #[test]
    fn test_state_persists_between_lines() {
        let rt = runtime();
        rt.eval(b"x = 40").unwrap();
        rt.eval(b"function add(a, b) return a + b end").unwrap();
        rt.eval(b"assert(add(x, 2) == 42)").unwrap();
        assert_eq!(rt.lua.globals().get::<i64>("x").unwrap(), 40);
    }

    #[test]
    fn test_compile_error() {
        let err = runtime().eval(b"x = (").unwrap_err();
        match *err.kind() {
            ErrorKind::Compile(ref m) => {
                assert!(m.starts_with("[string \"x = (\"]:1:"), "got: {}", m);
            }
            ref k => panic!("unexpected kind: {:?}", k),
        }
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_compile_does_not_execute() {
        let rt = runtime();
        let unit = rt.compile(b"ran = true").unwrap();
        assert!(rt.lua.globals().get::<Option<bool>>("ran").unwrap().is_none());
        rt.execute(unit).unwrap();
        assert_eq!(rt.lua.globals().get::<bool>("ran").unwrap(), true);
    }

    #[test]
    fn test_runtime_error() {
        let err = runtime().eval(b"undefinedFunc()").unwrap_err();
        match *err.kind() {
            ErrorKind::Runtime(ref m) => {
                assert!(m.contains("undefinedFunc"), "got: {}", m);
                assert!(!m.contains('\n'), "got: {}", m);
            }
            ref k => panic!("unexpected kind: {:?}", k),
        }
    }

    #[test]
    fn test_error_with_non_string_value() {
        let err = runtime().eval(b"error(42)").unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("42"), "got: {}", err);
    }

    #[test]
    fn test_source_stops_at_nul() {
        let rt = runtime();
        rt.eval(b"x = 1 \0 -- c").unwrap();
        assert_eq!(rt.lua.globals().get::<i64>("x").unwrap(), 1);

        let err = rt.eval(b"x = (\0").unwrap_err();
        assert!(err.to_string().starts_with("[string \"x = (\"]:1:"), "got: {}", err);
    }

    #[test]
    fn test_non_utf8_source() {
        let rt = runtime();
        rt.eval(b"s = \"\xe9\"").unwrap();
        rt.eval(b"assert(#s == 1 and s:byte() == 0xe9)").unwrap();
    }

    #[test]
    fn test_stdin_reader_builds() {
        assert!(runtime().stdin_reader().is_ok());
    }

    #[test]
    fn test_stdin_reader_needs_io() {
        let rt = runtime();
        rt.eval(b"io = nil").unwrap();
        let err = rt.stdin_reader().err().unwrap();
        assert!(err.to_string().contains("io library"), "got: {}", err);
    }

    #[test]
    fn test_strip_traceback() {
        let tests = [
            ("boom", "boom"),
            ("boom\nstack traceback:\n\t[C]: in ?", "boom"),
            ("a\nb", "a\nb"),
        ];

        for t in &tests {
            assert_eq!(t.1, strip_traceback(t.0), "input: {}", t.0);
        }
    }
}
