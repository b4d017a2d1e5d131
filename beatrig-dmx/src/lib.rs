//! DMX512 output for beatrig
//!
//! Fixture models with logical channels, the patched rig, and a dispatcher
//! that transmits the merged universe over a serial DMX interface at a
//! fixed frame rate.

mod channel;
mod dispatcher;
mod error;
mod fixture;
mod port;
mod profile;
mod rig;
mod universe;
mod update;

pub use channel::Channel;
pub use dispatcher::{DmxDispatcher, DmxHandle, PreSend, DEFAULT_FPS};
pub use error::{DmxError, Result};
pub use fixture::Fixture;
pub use port::{
    DmxPort, FrameSender, NullPort, RecordingPort, SerialDmxPort, BREAK_TIME, DMX_BAUD_RATE,
    MARK_AFTER_BREAK, START_CODE,
};
pub use profile::{FixtureKind, FixtureProfile};
pub use rig::{groups, Rig, RigEntry};
pub use universe::{Universe, UNIVERSE_SIZE};
pub use update::{ChannelUpdate, Color};
