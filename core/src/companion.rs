//! Companion process link
//!
//! The companion (the controller driving the run) receives the game window
//! identifier once per window and pushes run flag updates back. The protocol
//! thread that reads from the socket lives outside this crate; it forwards
//! decoded flags through the channel handed out by [`StreamLink::new`].

use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use tracing::debug;

use ticklock_shared::{RunFlags, WindowHandle, encode_window_id};

/// Companion errors
#[derive(Debug, thiserror::Error)]
pub enum CompanionError {
    #[error("companion i/o error: {0}")]
    Io(#[from] io::Error),
}

/// What the frame layer needs from the companion
pub trait CompanionLink: Send {
    /// Send the window identifier message.
    fn send_window_id(&mut self, handle: WindowHandle) -> Result<(), CompanionError>;

    /// Next pending run flag update, if any.
    fn poll_flags(&mut self) -> Option<RunFlags>;

    /// The companion is gone and no further update will arrive.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Link writing messages to a byte stream (usually a unix socket)
pub struct StreamLink<W> {
    writer: W,
    flags: Receiver<RunFlags>,
    disconnected: bool,
}

impl<W: Write + Send> StreamLink<W> {
    /// Wrap `writer`. The returned sender feeds [`CompanionLink::poll_flags`].
    pub fn new(writer: W) -> (Self, Sender<RunFlags>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                writer,
                flags: rx,
                disconnected: false,
            },
            tx,
        )
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> CompanionLink for StreamLink<W> {
    fn send_window_id(&mut self, handle: WindowHandle) -> Result<(), CompanionError> {
        encode_window_id(&mut self.writer, handle)?;
        self.writer.flush()?;
        Ok(())
    }

    fn poll_flags(&mut self) -> Option<RunFlags> {
        match self.flags.try_recv() {
            Ok(flags) => Some(flags),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                if !self.disconnected {
                    debug!("Companion flag channel closed");
                    self.disconnected = true;
                }
                None
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.disconnected
    }
}

/// Sends the window identifier exactly once per window lifetime.
#[derive(Debug, Default)]
pub struct WindowAnnouncer {
    sent: bool,
}

impl WindowAnnouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new window exists; it has not been announced yet.
    pub fn window_created(&mut self) {
        self.sent = false;
    }

    pub fn window_destroyed(&mut self) {
        self.sent = false;
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Announce the window unless already done.
    ///
    /// Without a real handle, `0` is sent and the companion falls back to the
    /// active window. Returns whether a message was sent; a failed send is
    /// retried on the next call.
    pub fn announce(
        &mut self,
        link: &mut dyn CompanionLink,
        handle: Option<WindowHandle>,
    ) -> Result<bool, CompanionError> {
        if self.sent {
            return Ok(false);
        }
        let handle = handle.unwrap_or_else(|| {
            debug!("No window handle available, sending 0");
            0
        });
        link.send_window_id(handle)?;
        self.sent = true;
        debug!("Sent window id {:#x}", handle);
        Ok(true)
    }
}
