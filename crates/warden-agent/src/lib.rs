//! Warden agent library.
//!
//! Building blocks of the unattended server-management agent:
//! - `supervisor`: lifecycle of the one supervised server process
//! - `session`: authenticated control session and its heartbeat loop
//! - `channels`: the four secondary channels gated by the login state
//! - `transport`: secured channel connections to the control server
//! - `output`: console line pump and listener fan-out
//! - `config`: configuration loading, re-read per call
//! - `jar` / `java`: launch artifact and interpreter resolution
//! - `prestart`: hooks run before every launch

pub mod channels;
pub mod config;
pub mod error;
pub mod jar;
pub mod java;
pub mod output;
pub mod prestart;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use config::{Config, ConfigStore};
pub use session::SessionManager;
pub use supervisor::Supervisor;
