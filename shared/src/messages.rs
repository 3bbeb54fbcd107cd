//! Controller protocol messages
//!
//! Every message starts with a message-kind tag. Payloads are raw and
//! untagged, so the receiver must know the payload layout from the tag.
//!
//! # Wire Format
//!
//! ```text
//! [tag:i32 native-endian][payload...]
//! ```
//!
//! The window identifier message is the only payload the frame layer
//! produces itself:
//!
//! ```text
//! [MessageKind::WindowId:i32][handle:u64 native-endian]
//! ```

use std::io::{self, Read, Write};

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};

/// Raw platform window handle (an X11 `Window` is an unsigned long).
pub type WindowHandle = u64;

/// Size in bytes of a complete window identifier message.
pub const WINDOW_ID_MESSAGE_LEN: usize = 4 + 8;

/// Message-kind tags understood by both sides.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Layer -> controller: the game window identifier follows
    WindowId = 0,
    /// Layer -> controller: a frame boundary was entered
    FrameBoundary = 1,
    /// Controller -> layer: a new set of run flags follows
    RunFlags = 2,
    /// Controller -> layer: the frame may end
    EndFrameBoundary = 3,
    /// Either direction: the session is over
    Quit = 4,
}

impl MessageKind {
    /// Map a raw tag back to a known kind.
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(Self::WindowId),
            1 => Some(Self::FrameBoundary),
            2 => Some(Self::RunFlags),
            3 => Some(Self::EndFrameBoundary),
            4 => Some(Self::Quit),
            _ => None,
        }
    }

    /// Raw tag value as written on the wire.
    pub fn tag(self) -> i32 {
        self as i32
    }
}

/// Errors produced while decoding controller messages
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The tag is not a known message kind
    #[error("unknown message tag {0}")]
    UnknownTag(i32),

    /// A different message kind was found where another was expected
    #[error("expected {expected:?} message, found {found:?}")]
    UnexpectedKind {
        expected: MessageKind,
        found: MessageKind,
    },

    /// The underlying stream failed or ended early
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Write a bare message-kind tag.
pub fn write_message_kind<W: Write>(writer: &mut W, kind: MessageKind) -> io::Result<()> {
    writer.write_i32::<NativeEndian>(kind.tag())
}

/// Read a message-kind tag.
pub fn read_message_kind<R: Read>(reader: &mut R) -> Result<MessageKind, WireError> {
    let tag = reader.read_i32::<NativeEndian>()?;
    MessageKind::from_tag(tag).ok_or(WireError::UnknownTag(tag))
}

/// Write the two-part window identifier message (tag, then raw handle).
pub fn encode_window_id<W: Write>(writer: &mut W, handle: WindowHandle) -> io::Result<()> {
    write_message_kind(writer, MessageKind::WindowId)?;
    writer.write_u64::<NativeEndian>(handle)
}

/// Read a window identifier message written by [`encode_window_id`].
pub fn decode_window_id<R: Read>(reader: &mut R) -> Result<WindowHandle, WireError> {
    let kind = read_message_kind(reader)?;
    if kind != MessageKind::WindowId {
        return Err(WireError::UnexpectedKind {
            expected: MessageKind::WindowId,
            found: kind,
        });
    }
    Ok(reader.read_u64::<NativeEndian>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_window_id_layout_is_tag_then_handle() {
        let mut buf = Vec::new();
        encode_window_id(&mut buf, 0x0420_0001).unwrap();

        assert_eq!(buf.len(), WINDOW_ID_MESSAGE_LEN);
        assert_eq!(&buf[..4], &0i32.to_ne_bytes());
        assert_eq!(&buf[4..], &0x0420_0001u64.to_ne_bytes());
    }

    #[test]
    fn test_decode_window_id() {
        let mut buf = Vec::new();
        encode_window_id(&mut buf, 77).unwrap();
        let handle = decode_window_id(&mut Cursor::new(buf)).unwrap();
        assert_eq!(handle, 77);
    }

    #[test]
    fn test_decode_rejects_other_kind() {
        let mut buf = Vec::new();
        write_message_kind(&mut buf, MessageKind::Quit).unwrap();
        buf.extend_from_slice(&[0u8; 8]);

        let err = decode_window_id(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(
            err,
            WireError::UnexpectedKind {
                found: MessageKind::Quit,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_unknown_tag() {
        let buf = 99i32.to_ne_bytes().to_vec();
        let err = read_message_kind(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, WireError::UnknownTag(99)));
    }

    #[test]
    fn test_truncated_handle_is_io_error() {
        let mut buf = Vec::new();
        encode_window_id(&mut buf, 5).unwrap();
        buf.truncate(6);
        let err = decode_window_id(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, WireError::Io(_)));
    }
}
