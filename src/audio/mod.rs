pub mod capture;
pub mod pipeline;
pub mod ring_buffer;
pub mod vad;
