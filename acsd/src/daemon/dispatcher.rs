//! Client request dispatcher.
//!
//! The dispatcher is the boundary between the transport and the library
//! machinery: it decodes and validates envelopes, hands mounts to the
//! blocking executor pool and dismounts to the pending-request registry,
//! and turns every fault on the way into an exception reply. A client
//! always gets exactly one reply per request; no fault reaches the
//! transport layer.

use super::registry::PendingRequestRegistry;
use super::{ClientToken, ConnTable};
use acs_proto::{AcsReply, AcsRequest, DriveAddr, Frame, VolumeId};
use crossbeam_channel::{Sender, TrySendError};
use tracing::{debug, error, warn};

/// One mount handed to the executor pool. The executor builds and sends
/// the reply itself once the library concludes.
pub struct MountJob {
    pub client: ClientToken,
    pub vid: VolumeId,
    pub drive: DriveAddr,
    pub read_only: bool,
}

pub struct RequestDispatcher {
    registry: PendingRequestRegistry,
    mount_tx: Sender<MountJob>,
    conns: ConnTable,
}

impl RequestDispatcher {
    pub fn new(
        registry: PendingRequestRegistry,
        mount_tx: Sender<MountJob>,
        conns: ConnTable,
    ) -> Self {
        Self {
            registry,
            mount_tx,
            conns,
        }
    }

    /// Handle one inbound envelope, sending the immediate reply if the
    /// request produces one. Dismounts reply later, from the sweep.
    pub fn handle(&mut self, client: ClientToken, frame: Frame) {
        debug!(%client, msg_type = ?frame.header.msg_type, "request received");
        if let Some(reply) = self.dispatch(client, &frame) {
            self.send_reply(client, &reply);
        }
    }

    fn dispatch(&mut self, client: ClientToken, frame: &Frame) -> Option<AcsReply> {
        if !frame.verify() {
            warn!(%client, "payload hash verification failed");
            return Some(AcsReply::exception(
                libc::EINVAL,
                "payload hash verification failed",
            ));
        }

        let request = match AcsRequest::from_frame(frame) {
            Ok(request) => request,
            Err(err) => {
                warn!(%client, error = %err, "undecodable request");
                return Some(AcsReply::exception(libc::EINVAL, err.to_string()));
            }
        };

        let vid = match VolumeId::new(request.vid()) {
            Ok(vid) => vid,
            Err(err) => return Some(AcsReply::exception(libc::EINVAL, err.to_string())),
        };
        let drive = request.drive();
        if let Err(err) = drive.validate() {
            return Some(AcsReply::exception(libc::EINVAL, err.to_string()));
        }

        match request {
            AcsRequest::MountReadOnly(_) | AcsRequest::MountReadWrite(_) => {
                let read_only = matches!(request, AcsRequest::MountReadOnly(_));
                let job = MountJob {
                    client,
                    vid,
                    drive,
                    read_only,
                };
                match self.mount_tx.try_send(job) {
                    // The executor sends the reply when the mount concludes.
                    Ok(()) => None,
                    Err(TrySendError::Full(_)) => Some(AcsReply::exception(
                        libc::EBUSY,
                        "all mount executors are busy",
                    )),
                    Err(TrySendError::Disconnected(_)) => Some(AcsReply::exception(
                        libc::EIO,
                        "mount executors are unavailable",
                    )),
                }
            }
            AcsRequest::Dismount(_) | AcsRequest::ForceDismount(_) => {
                let force = matches!(request, AcsRequest::ForceDismount(_));
                match self.registry.admit(vid, drive, force, client) {
                    // The sweep sends the reply once the request finishes.
                    Ok(_seq) => None,
                    Err(err) => Some(AcsReply::exception(err.code(), err.to_string())),
                }
            }
        }
    }

    fn send_reply(&self, client: ClientToken, reply: &AcsReply) {
        match reply.to_frame() {
            Ok(frame) => {
                if let Err(err) = self.conns.send(client, &frame) {
                    warn!(%client, error = %err, "failed to deliver reply");
                }
            }
            Err(err) => error!(%client, error = %err, "failed to encode reply"),
        }
    }

    /// One control-loop pass over the registry.
    pub fn pump(&mut self) {
        self.registry.tick();
        self.registry.sweep(&self.conns);
    }

    pub fn registry(&self) -> &PendingRequestRegistry {
        &self.registry
    }
}
