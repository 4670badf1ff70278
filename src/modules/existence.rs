use log::{debug, info, warn};
use crate::modules::channel::{ChannelError, EventChannel};
use crate::modules::session::{Session, SessionId};
use crate::modules::types::{ExistenceRequest, ServerMessage, CHECK_EVENT};

pub const EXISTS_WARNING: &str = "Project already exists, if you want to overwrite it, check the overwrite checkbox. If the box is not checked every new layout will be added to the existing project. Layouts which already exist will be overwritten.";

/// Sends project-name lookups and tracks the resulting warning.
///
/// Requests are fire-and-forget. Each carries a sequence number; a reply
/// echoing an older sequence than one already applied is dropped, while
/// replies without one are applied in arrival order.
pub struct ExistenceChecker<C: EventChannel> {
    channel: C,
    uid: SessionId,
    next_seq: u64,
    applied_seq: Option<u64>,
    warning: Option<String>,
}

impl<C: EventChannel> ExistenceChecker<C> {
    pub fn new(channel: C, session: &Session) -> Self {
        Self {
            channel,
            uid: session.uid().clone(),
            next_seq: 0,
            applied_seq: None,
            warning: None,
        }
    }

    /// Returns the sequence number the request was sent with.
    pub fn on_name_changed(&mut self, name: &str) -> u64 {
        self.next_seq += 1;
        let request = ExistenceRequest {
            project_name: name.to_string(),
            uid: self.uid.to_string(),
            seq: self.next_seq,
        };
        let sent = serde_json::to_value(&request)
            .map_err(ChannelError::from)
            .and_then(|data| self.channel.emit(CHECK_EVENT, data));
        match sent {
            Ok(()) => debug!("Existence check #{} sent for {name:?}", self.next_seq),
            Err(e) => warn!("Existence check for {name:?} dropped: {e}"),
        }
        self.next_seq
    }

    /// Applies one server message. Returns true when the warning state was updated.
    pub fn on_server_message(&mut self, message: &ServerMessage) -> bool {
        match message {
            ServerMessage::ExistenceResult { exists, seq } => {
                if let (Some(seq), Some(applied)) = (seq, self.applied_seq) {
                    if *seq < applied {
                        debug!("Discarding stale existence reply #{seq} (applied #{applied})");
                        return false;
                    }
                }
                if seq.is_some() {
                    self.applied_seq = *seq;
                }
                self.warning = exists.then(|| EXISTS_WARNING.to_string());
                true
            }
            ServerMessage::Status { message } => {
                info!("Server status: {message}");
                false
            }
            ServerMessage::Other { .. } => {
                debug!("Ignoring {message}");
                false
            }
        }
    }

    /// Drains every frame currently waiting on the channel.
    /// Returns how many of them updated the warning.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.channel.try_recv() {
                Ok(Some(frame)) => {
                    if self.on_server_message(&ServerMessage::from(&frame)) {
                        applied += 1;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Channel unavailable: {e}");
                    break;
                }
            }
        }
        applied
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }
}
