use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    pub fn size_overflow(count: usize, quantum: usize) -> Error {
        Error(ErrorKind::SizeOverflow { count, quantum }.into())
    }

    pub fn out_of_memory(size: usize) -> Error {
        Error(ErrorKind::OutOfMemory { size }.into())
    }

    pub fn virtual_memory_exhausted(size: usize) -> Error {
        Error(ErrorKind::VirtualMemoryExhausted { size }.into())
    }

    pub fn resource_limit(resource: &'static str, amount: u64) -> Error {
        Error(ErrorKind::ResourceLimit { resource, amount }.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }

    /// Returns `true` if the request was rejected because `count * quantum`
    /// does not fit in `usize`.
    pub fn is_overflow(&self) -> bool {
        matches!(self.kind(), ErrorKind::SizeOverflow { .. })
    }

    /// Returns `true` if the underlying allocator (or every virtual memory
    /// strategy) ran out of memory.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::OutOfMemory { .. } | ErrorKind::VirtualMemoryExhausted { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("allocation size overflow: {count} x {quantum} bytes")]
    SizeOverflow { count: usize, quantum: usize },

    #[error("memory allocation of {size} bytes failed")]
    OutOfMemory { size: usize },

    #[error("virtual memory allocation of {size} bytes failed: all backing strategies exhausted")]
    VirtualMemoryExhausted { size: usize },

    #[error("{resource} resource limit exceeded by a request of {amount} bytes")]
    ResourceLimit { resource: &'static str, amount: u64 },

    #[error("IO error for '{context}': {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}
