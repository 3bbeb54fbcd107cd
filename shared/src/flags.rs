//! Run flags owned by the controller

use serde::{Deserialize, Serialize};

/// Flags the controller pushes to the runtime layer.
///
/// The layer only reads these; the controller is the single writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFlags {
    /// Frame rate numerator (frames per `framerate_den` seconds)
    #[serde(default = "default_framerate")]
    pub framerate: u32,
    /// Frame rate denominator
    #[serde(default = "default_framerate_den")]
    pub framerate_den: u32,
    /// Skip real-time pacing sleeps
    #[serde(default)]
    pub fast_forward: bool,
    /// Playback is running (false = paused by the controller)
    #[serde(default = "default_running")]
    pub running: bool,
}

fn default_framerate() -> u32 {
    60
}
fn default_framerate_den() -> u32 {
    1
}
fn default_running() -> bool {
    true
}

impl Default for RunFlags {
    fn default() -> Self {
        Self {
            framerate: default_framerate(),
            framerate_den: default_framerate_den(),
            fast_forward: false,
            running: default_running(),
        }
    }
}
