#[macro_use]
extern crate error_chain;

mod errors;
mod interpreter;
mod shell;

use std::io;

use interpreter::LuaRuntime;
use shell::Shell;

fn run() -> errors::Result<()> {
    let runtime = LuaRuntime::new()?;

    let stdin = runtime.stdin_reader()?;
    let stdout = io::stdout();
    let exit = Shell::new(runtime, stdin, stdout.lock()).run()?;
    log::debug!("session finished: {:?}", exit);

    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("fatal: {}", e);
        ::std::process::exit(1);
    }
}
