pub mod config;
pub mod decode;
pub mod dsp;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod playback;
pub mod presentation;
pub mod scheduler;
pub mod session;
pub mod terminal;
pub mod token;
pub mod transcriber;
pub mod types;
