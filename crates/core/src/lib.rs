pub use config::{ConfigError, ConfigManager, ConfigSchema, Settings};
pub use control::ControlFacade;
pub use display::{DisplayId, DisplaySink, DisplayState, SharedDisplay};
pub use error::{LtcError, TimecodeError};
pub use generator::{GeneratorSession, GeneratorStatus};
pub use messages::{ControlEvent, EngineSnapshot, GeneratorTransition, ReaderStatus};
pub use process::{
    probe_program, DecoderLauncher, EncoderLauncher, ManagedProcess, SystemDecoder,
    SystemEncoder,
};
pub use reader::ReaderState;
pub use sim::{SimulatedDecoder, SimulatedEncoder};
pub use timecode::{FrameRate, TimeCode};

pub mod config;
mod control;
pub mod display;
mod error;
pub mod generator;
pub mod messages;
pub mod process;
pub mod reader;
pub mod sim;
pub mod timecode;
