pub mod price_stream;
pub mod stream_message;

#[cfg(test)]
pub mod tests;

pub use price_stream::{ConnectionState, PriceStreamActor, PriceStreamHandle, StreamConfig};
