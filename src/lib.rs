//! Shared core for the three `platterd-*` daemon binaries: state machines,
//! data model, message bus adapter, configuration and the external-
//! collaborator interfaces. Process supervision lives in `src/bin/*.rs`.

pub mod audio_sink;
pub mod bus;
pub mod commander;
pub mod config;
pub mod error;
pub mod interfaces;
pub mod library;
pub mod model;
pub mod player;
pub mod ripper;
pub mod wire;
