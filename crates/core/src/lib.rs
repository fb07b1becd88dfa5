pub mod config;
pub mod error;
pub mod http;
pub mod server;
pub mod supervisor;
pub mod transcoder;

pub use config::{HttpConfig, RelayConfig, StopSignal, TranscoderConfig};
pub use error::{RelayError, Result};
pub use server::Server;
pub use supervisor::{ExitRecord, Outcome, Status, Supervisor};
pub use transcoder::{LineSink, OutputLine, OutputStream, TracingSink};
