mod address;
mod buffer;
mod process;
mod provider;

#[cfg(test)]
pub mod mock;

pub use address::{
    ForeignAddress, decode_pointer, encode_pointer, encode_pointer_with_width, format_bytes,
};
pub use buffer::ByteBuffer;
pub use process::ProcessMemory;
pub use provider::MemoryProvider;

#[cfg(test)]
pub use mock::{MockMemory, MockMemoryBuilder};
