error_chain! {
    foreign_links {
        Io(::std::io::Error);
    }

    errors {
        Compile(m: String) {
            description("compile error")
            display("{}", m)
        }
        Runtime(m: String) {
            description("runtime error")
            display("{}", m)
        }
        StateCreation(m: String) {
            description("cannot create interpreter state")
            display("cannot create interpreter state: {}", m)
        }
    }
}

impl Error {
    /// Compile and runtime errors are reported to the user and never end the session.
    pub fn is_recoverable(&self) -> bool {
        match *self.kind() {
            ErrorKind::Compile(_) | ErrorKind::Runtime(_) => true,
            _ => false,
        }
    }
}
