//! # Message Dispatcher
//!
//! The root dispatcher sits atop the transport adapter (§4.6). It pulls
//! frames until the transport returns empty, decodes each frame's header,
//! checks the declared size against the bytes actually delivered, and
//! routes the payload to whichever handler slot is registered for that
//! message type — falling back to a default slot if one exists. A
//! configured auto-close flag tears the connection down after dispatching
//! a QUIT frame, once user handlers for QUIT have run (§5 Auto-close).
//!
//! Each L4 service registers one thunk per message type it cares about;
//! the thunk extracts that service's own correlation key (a `RequestId` or
//! `EventId`) from the payload and forwards to the service's own registry.
//! This is the Rust rendering of §4.6's "when enabled on a parent
//! dispatcher, ... registers a thunk" — composed via ordinary ownership
//! and closures rather than the original's CRTP dispatcher-of-dispatchers.

pub mod drivers;

use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::Result;
use crate::handler::{HandlerPolicy, MultiPolicy, Registration, SingleThreadedRegistry};
use crate::message::{well_known, FrameHeader, MessageTypeId};
use crate::transport::Transport;

/// One decoded frame handed to a per-message-type thunk: the header plus
/// the payload slice that follows it.
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

/// The root dispatcher: keyed by message-type id, fanning out to whichever
/// services have registered interest in that type.
pub struct Dispatcher {
    registry: SingleThreadedRegistry<MessageTypeId, Frame, MultiPolicy<Frame>>,
    auto_close_on_quit: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            registry: SingleThreadedRegistry::new_single_threaded(),
            auto_close_on_quit: false,
        }
    }

    /// Whether dispatching a QUIT frame should close the connection
    /// afterwards.
    pub fn set_auto_close_on_quit(&mut self, enabled: bool) {
        self.auto_close_on_quit = enabled;
    }

    /// Registers a thunk invoked for every frame of `message_type`.
    /// Returns the handler id, usable with `unregister`.
    pub fn on_message(
        &self,
        message_type: MessageTypeId,
        callback: impl FnMut(&Frame) + Send + 'static,
    ) -> u32 {
        self.registry.register(
            message_type,
            Registration::new(Box::new(callback), false),
        )
    }

    /// Registers the dispatcher-wide default handler, invoked when no
    /// per-type slot matches.
    pub fn on_unhandled(&self, callback: impl FnMut(&Frame) + Send + 'static) -> u32 {
        self.registry
            .register_default(Registration::new(Box::new(callback), false))
    }

    /// Removes a thunk previously registered with `on_message`.
    pub fn remove(&self, message_type: MessageTypeId, id: u32) {
        self.registry.unregister(&message_type, id);
    }

    /// Drains every frame currently queued by the transport, dispatching
    /// each to the matching slot. Returns `true` if at least one frame was
    /// processed.
    pub fn drain_once<T: Transport>(&self, connection: &mut Connection<T>) -> Result<bool> {
        let mut any = false;
        loop {
            if !connection.is_open() {
                break;
            }
            let raw = connection.transport_mut().get_next_dispatch()?;
            let Some(raw) = raw else { break };
            any = true;

            match FrameHeader::parse(&raw) {
                Ok((header, payload)) => {
                    debug!(message_type = header.id, "dispatching frame");
                    let frame = Frame {
                        header,
                        payload: payload.to_vec(),
                    };
                    let is_quit = header.id == well_known::QUIT;
                    self.registry.dispatch(header.id, &frame);
                    if is_quit && self.auto_close_on_quit {
                        connection.close()?;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "dropping malformed frame");
                }
            }
        }
        Ok(any)
    }
}
