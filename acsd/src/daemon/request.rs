//! Per-request state machine for asynchronous dismounts.

use super::{ClientToken, ConnTable};
use crate::error::AcsError;
use crate::library::channel::{ChannelResponse, LibraryChannel, LibraryOp, ResponseBody};
use crate::library::{FinalBody, SeqNo};
use acs_proto::{AcsReply, DriveAddr, VolumeId};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lifecycle of an asynchronous request. `ToExecute` is initial,
/// `ToDelete` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    ToExecute,
    Running,
    Completed,
    Failed,
    ToDelete,
}

/// One in-flight dismount, owned by the registry and advanced by its
/// tick/sweep passes.
pub struct AsyncRequest {
    seq: SeqNo,
    vid: VolumeId,
    drive: DriveAddr,
    force: bool,
    state: RequestState,
    client: ClientToken,
    last_response: Option<ChannelResponse>,
    reply: Option<AcsReply>,
    reply_sent: bool,
    submitted_at: Option<Instant>,
    last_polled: Option<Instant>,
}

impl AsyncRequest {
    pub fn new(
        seq: SeqNo,
        vid: VolumeId,
        drive: DriveAddr,
        force: bool,
        client: ClientToken,
    ) -> Self {
        Self {
            seq,
            vid,
            drive,
            force,
            state: RequestState::ToExecute,
            client,
            last_response: None,
            reply: None,
            reply_sent: false,
            submitted_at: None,
            last_polled: None,
        }
    }

    pub fn seq(&self) -> SeqNo {
        self.seq
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn vid(&self) -> &VolumeId {
        &self.vid
    }

    pub fn drive(&self) -> DriveAddr {
        self.drive
    }

    pub fn client(&self) -> ClientToken {
        self.client
    }

    /// When the library last produced a response for this request.
    pub fn last_polled(&self) -> Option<Instant> {
        self.last_polled
    }

    /// The most recent library response routed to this request.
    pub fn last_response(&self) -> Option<&ChannelResponse> {
        self.last_response.as_ref()
    }

    /// Advance the state machine one step.
    ///
    /// `ToExecute` fires the library call; `Running` checks the
    /// cooperative timeout. Terminal states are a no-op. Every failure is
    /// absorbed into `Failed` with a synthesized exception reply; nothing
    /// escapes.
    pub fn tick(&mut self, channel: &mut LibraryChannel, timeout: Duration) {
        match self.state {
            RequestState::ToExecute => {
                let op = LibraryOp::Dismount {
                    vid: self.vid.clone(),
                    drive: self.drive,
                    force: self.force,
                };
                match channel.submit(self.seq, &op) {
                    Ok(()) => {
                        debug!(seq = self.seq, vid = %self.vid, "dismount submitted");
                        self.submitted_at = Some(Instant::now());
                        self.state = RequestState::Running;
                    }
                    Err(err) => self.fail(err),
                }
            }
            RequestState::Running => {
                if let Some(submitted_at) = self.submitted_at {
                    if submitted_at.elapsed() >= timeout {
                        self.fail(AcsError::RequestTimedOut(timeout));
                    }
                }
            }
            RequestState::Completed | RequestState::Failed | RequestState::ToDelete => {}
        }
    }

    /// Take in a library response routed here by sequence number.
    pub fn handle_response(&mut self, response: ChannelResponse) {
        if self.state != RequestState::Running {
            warn!(
                seq = self.seq,
                state = ?self.state,
                "dropping library response for request not running"
            );
            return;
        }
        self.last_polled = Some(Instant::now());

        match &response.body {
            ResponseBody::Acknowledge | ResponseBody::Intermediate => {
                debug!(seq = self.seq, body = ?response.body, "progress response");
                self.last_response = Some(response);
            }
            ResponseBody::Final(FinalBody::Dismount { status }) if status.is_success() => {
                self.last_response = Some(response);
                self.complete();
            }
            ResponseBody::Final(FinalBody::Dismount { status }) => {
                let reason = format!("library reported {status}");
                self.last_response = Some(response);
                self.fail(AcsError::DismountFailed {
                    vid: self.vid.to_string(),
                    drive: self.drive.to_string(),
                    reason,
                });
            }
            ResponseBody::Final(other) => {
                let reason = format!("unexpected final payload {other:?}");
                self.last_response = Some(response);
                self.fail(AcsError::DismountFailed {
                    vid: self.vid.to_string(),
                    drive: self.drive.to_string(),
                    reason,
                });
            }
        }
    }

    fn complete(&mut self) {
        info!(seq = self.seq, vid = %self.vid, drive = %self.drive, "dismount complete");
        self.reply = Some(AcsReply::ok());
        self.state = RequestState::Completed;
    }

    fn fail(&mut self, err: AcsError) {
        warn!(seq = self.seq, vid = %self.vid, error = %err, "dismount failed");
        self.reply = Some(AcsReply::exception(err.code(), err.to_string()));
        self.state = RequestState::Failed;
    }

    /// Deliver the synthesized reply to the client, exactly once.
    ///
    /// A second invocation fails with `DuplicateReply` and does not
    /// re-send. A failed delivery (client gone, queue full) is logged and
    /// terminal for this request only.
    pub fn send_reply_once(&mut self, conns: &ConnTable) -> Result<(), AcsError> {
        if self.reply_sent {
            return Err(AcsError::DuplicateReply(self.seq));
        }
        self.reply_sent = true;

        let reply = self
            .reply
            .clone()
            .unwrap_or_else(|| AcsReply::exception(libc::EIO, "request finished with no reply"));

        match reply.to_frame() {
            Ok(frame) => {
                if let Err(err) = conns.send(self.client, &frame) {
                    warn!(
                        seq = self.seq,
                        client = %self.client,
                        error = %err,
                        "failed to deliver reply"
                    );
                }
            }
            Err(err) => {
                warn!(seq = self.seq, error = %err, "failed to encode reply");
            }
        }
        Ok(())
    }

    /// Mark this request for removal by the next sweep.
    pub fn mark_to_delete(&mut self) {
        self.state = RequestState::ToDelete;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::sim::ScriptedLibrary;
    use crate::library::LibStatus;

    fn request(seq: SeqNo) -> AsyncRequest {
        AsyncRequest::new(
            seq,
            VolumeId::new("VOL001").unwrap(),
            "1:2:3:4".parse().unwrap(),
            false,
            ClientToken(1),
        )
    }

    fn channel_with(lib: ScriptedLibrary) -> LibraryChannel {
        LibraryChannel::new(Box::new(lib))
    }

    fn final_dismount(seq: SeqNo, status: LibStatus) -> ChannelResponse {
        ChannelResponse {
            seq,
            body: ResponseBody::Final(FinalBody::Dismount { status }),
        }
    }

    #[test]
    fn test_submit_moves_to_running() {
        let mut channel = channel_with(ScriptedLibrary::new());
        let mut req = request(1);

        req.tick(&mut channel, Duration::from_secs(1));
        assert_eq!(req.state(), RequestState::Running);
    }

    #[test]
    fn test_submit_rejection_moves_to_failed() {
        let mut channel =
            channel_with(ScriptedLibrary::new().with_accept(LibStatus::DriveInUse));
        let mut req = request(1);

        req.tick(&mut channel, Duration::from_secs(1));
        assert_eq!(req.state(), RequestState::Failed);
    }

    #[test]
    fn test_final_success_completes() {
        let mut channel = channel_with(ScriptedLibrary::new());
        let mut req = request(1);

        req.tick(&mut channel, Duration::from_secs(1));
        req.handle_response(final_dismount(1, LibStatus::Success));
        assert_eq!(req.state(), RequestState::Completed);
    }

    #[test]
    fn test_final_failure_fails() {
        let mut channel = channel_with(ScriptedLibrary::new());
        let mut req = request(1);

        req.tick(&mut channel, Duration::from_secs(1));
        req.handle_response(final_dismount(1, LibStatus::VolumeNotInLibrary));
        assert_eq!(req.state(), RequestState::Failed);
    }

    #[test]
    fn test_timeout_fails_with_timeout_reply() {
        let mut channel = channel_with(ScriptedLibrary::new());
        let mut req = request(1);

        req.tick(&mut channel, Duration::ZERO); // submit
        req.tick(&mut channel, Duration::ZERO); // budget already spent
        assert_eq!(req.state(), RequestState::Failed);

        // The synthesized reply must carry the timeout cause.
        let conns = ConnTable::new();
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        conns.register(ClientToken(1), tx);
        req.send_reply_once(&conns).unwrap();

        let bytes = rx.try_recv().expect("reply frame delivered");
        let frame = acs_proto::Frame::decode(&bytes).unwrap();
        let reply = AcsReply::from_frame(&frame).unwrap();
        assert_eq!(reply.code(), Some(libc::ETIMEDOUT));
        match reply {
            AcsReply::Exception { message, .. } => {
                assert!(message.contains("no final response within"));
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn test_tick_is_a_no_op_in_terminal_states() {
        let mut channel = channel_with(ScriptedLibrary::new());
        let mut req = request(1);

        req.tick(&mut channel, Duration::from_secs(1));
        req.handle_response(final_dismount(1, LibStatus::Success));
        assert_eq!(req.state(), RequestState::Completed);

        req.tick(&mut channel, Duration::ZERO);
        assert_eq!(req.state(), RequestState::Completed);
    }

    #[test]
    fn test_send_reply_twice_is_duplicate_reply() {
        let mut channel = channel_with(ScriptedLibrary::new());
        let mut req = request(1);

        req.tick(&mut channel, Duration::from_secs(1));
        req.handle_response(final_dismount(1, LibStatus::Success));

        let conns = ConnTable::new();
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        conns.register(ClientToken(1), tx);

        req.send_reply_once(&conns).unwrap();
        let err = req.send_reply_once(&conns).unwrap_err();
        assert!(matches!(err, AcsError::DuplicateReply(1)));

        // Exactly one frame went out.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reply_to_vanished_client_is_terminal_not_fatal() {
        let mut channel = channel_with(ScriptedLibrary::new());
        let mut req = request(1);

        req.tick(&mut channel, Duration::from_secs(1));
        req.handle_response(final_dismount(1, LibStatus::Success));

        // No connection registered for the client token.
        let conns = ConnTable::new();
        req.send_reply_once(&conns).unwrap();
        assert!(matches!(
            req.send_reply_once(&conns),
            Err(AcsError::DuplicateReply(1))
        ));
    }
}
