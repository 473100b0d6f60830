//! Blocking operation executors.
//!
//! Each executor composes `submit` + `poll_until_final` into one complete
//! library operation and interprets the final payload's status. Executors
//! run one at a time to completion on a channel of their own, so a fixed
//! correlation id is safe.

use super::channel::{LibraryChannel, LibraryOp};
use super::{FinalBody, SeqNo};
use crate::error::AcsError;
use acs_proto::{DriveAddr, VolumeId};
use std::time::Duration;
use tracing::{info, warn};

const OP_SEQ: SeqNo = 1;
const QUERY_DIAG_SEQ: SeqNo = 2;

/// Mount a volume onto a drive, blocking until the library concludes.
///
/// Any submit failure, timeout, or non-success final status is wrapped
/// into `MountFailed` with the underlying cause in the message. On a
/// failed read-write mount a best-effort volume query is appended to the
/// message as a diagnostic; the diagnostic can never abort the failure
/// path.
pub fn mount_tape(
    channel: &mut LibraryChannel,
    vid: &VolumeId,
    drive: DriveAddr,
    read_only: bool,
    query_interval: Duration,
    timeout: Duration,
) -> Result<(), AcsError> {
    info!(%vid, %drive, read_only, "mounting volume");
    match run_mount(channel, vid, drive, read_only, query_interval, timeout) {
        Ok(()) => {
            info!(%vid, %drive, "mount complete");
            Ok(())
        }
        Err(mut reason) => {
            if !read_only {
                match query_volume_diagnostic(channel, vid, query_interval, timeout) {
                    Ok(diag) => reason.push_str(&format!(" (volume status: {diag})")),
                    Err(err) => reason.push_str(&format!(" (volume status unavailable: {err})")),
                }
            }
            warn!(%vid, %drive, %reason, "mount failed");
            Err(AcsError::MountFailed {
                vid: vid.to_string(),
                drive: drive.to_string(),
                reason,
            })
        }
    }
}

fn run_mount(
    channel: &mut LibraryChannel,
    vid: &VolumeId,
    drive: DriveAddr,
    read_only: bool,
    query_interval: Duration,
    timeout: Duration,
) -> Result<(), String> {
    channel
        .submit(
            OP_SEQ,
            &LibraryOp::Mount {
                vid: vid.clone(),
                drive,
                read_only,
                bypass: false,
            },
        )
        .map_err(|e| e.to_string())?;

    match channel
        .poll_until_final(OP_SEQ, query_interval, timeout)
        .map_err(|e| e.to_string())?
    {
        FinalBody::Mount { status } if status.is_success() => Ok(()),
        FinalBody::Mount { status } => Err(format!("library reported {status}")),
        other => Err(format!("unexpected final payload {other:?}")),
    }
}

/// Dismount a volume from a drive, blocking until the library concludes.
///
/// `force` selects the vendor's forced variant, which ejects regardless
/// of drive state.
pub fn dismount_tape(
    channel: &mut LibraryChannel,
    vid: &VolumeId,
    drive: DriveAddr,
    force: bool,
    query_interval: Duration,
    timeout: Duration,
) -> Result<(), AcsError> {
    info!(%vid, %drive, force, "dismounting volume");
    match run_dismount(channel, vid, drive, force, query_interval, timeout) {
        Ok(()) => {
            info!(%vid, %drive, "dismount complete");
            Ok(())
        }
        Err(reason) => {
            warn!(%vid, %drive, %reason, "dismount failed");
            Err(AcsError::DismountFailed {
                vid: vid.to_string(),
                drive: drive.to_string(),
                reason,
            })
        }
    }
}

fn run_dismount(
    channel: &mut LibraryChannel,
    vid: &VolumeId,
    drive: DriveAddr,
    force: bool,
    query_interval: Duration,
    timeout: Duration,
) -> Result<(), String> {
    channel
        .submit(
            OP_SEQ,
            &LibraryOp::Dismount {
                vid: vid.clone(),
                drive,
                force,
            },
        )
        .map_err(|e| e.to_string())?;

    match channel
        .poll_until_final(OP_SEQ, query_interval, timeout)
        .map_err(|e| e.to_string())?
    {
        FinalBody::Dismount { status } if status.is_success() => Ok(()),
        FinalBody::Dismount { status } => Err(format!("library reported {status}")),
        other => Err(format!("unexpected final payload {other:?}")),
    }
}

/// Ask the library where a volume is. Used only to enrich mount failure
/// messages.
fn query_volume_diagnostic(
    channel: &mut LibraryChannel,
    vid: &VolumeId,
    query_interval: Duration,
    timeout: Duration,
) -> Result<String, AcsError> {
    channel.submit(
        QUERY_DIAG_SEQ,
        &LibraryOp::QueryVolume {
            vids: vec![vid.clone()],
        },
    )?;

    match channel.poll_until_final(QUERY_DIAG_SEQ, query_interval, timeout)? {
        FinalBody::QueryVolume { status, volumes } if status.is_success() => {
            if volumes.is_empty() {
                return Ok("no volume information".to_string());
            }
            Ok(volumes
                .iter()
                .map(|v| format!("{} {} at {}", v.vid, v.status, v.location))
                .collect::<Vec<_>>()
                .join(", "))
        }
        FinalBody::QueryVolume { status, .. } => {
            Err(AcsError::QueryVolumeFailed(status.to_string()))
        }
        other => Err(AcsError::QueryVolumeFailed(format!(
            "unexpected final payload {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::sim::{LibraryCall, ScriptedLibrary};
    use crate::library::{LibStatus, PollOutcome, VolumeStatus};

    fn vid() -> VolumeId {
        VolumeId::new("VOL001").unwrap()
    }

    fn drive() -> DriveAddr {
        "1:2:3:4".parse().unwrap()
    }

    fn intervals() -> (Duration, Duration) {
        (Duration::from_millis(5), Duration::from_millis(200))
    }

    fn channel_with(lib: ScriptedLibrary) -> LibraryChannel {
        LibraryChannel::new(Box::new(lib))
    }

    fn mount_final(status: LibStatus) -> PollOutcome {
        PollOutcome::final_response(OP_SEQ, 1, FinalBody::Mount { status })
    }

    #[test]
    fn test_mount_read_only_success() {
        let lib = ScriptedLibrary::new().then_poll(mount_final(LibStatus::Success));
        let mut channel = channel_with(lib);
        let (qi, to) = intervals();

        mount_tape(&mut channel, &vid(), drive(), true, qi, to).unwrap();
    }

    #[test]
    fn test_mount_passes_read_only_flag_to_library() {
        for read_only in [true, false] {
            let lib = ScriptedLibrary::new().then_poll(mount_final(LibStatus::Success));
            let log = lib.log();
            let mut channel = channel_with(lib);
            let (qi, to) = intervals();

            mount_tape(&mut channel, &vid(), drive(), read_only, qi, to).unwrap();

            let calls = log.calls();
            assert_eq!(calls.len(), 1);
            match &calls[0] {
                LibraryCall::Mount {
                    seq,
                    read_only: recorded,
                    ..
                } => {
                    assert_eq!(*seq, OP_SEQ);
                    assert_eq!(*recorded, read_only);
                }
                other => panic!("unexpected call {other:?}"),
            }
        }
    }

    #[test]
    fn test_read_only_mount_failure_skips_diagnostic() {
        let lib = ScriptedLibrary::new().then_poll(mount_final(LibStatus::DriveInUse));
        let mut channel = channel_with(lib);
        let (qi, to) = intervals();

        let err = mount_tape(&mut channel, &vid(), drive(), true, qi, to).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("drive in use"));
        assert!(!text.contains("volume status"));
    }

    #[test]
    fn test_read_write_mount_failure_appends_volume_diagnostic() {
        let lib = ScriptedLibrary::new()
            .then_poll(mount_final(LibStatus::DriveInUse))
            .then_poll(PollOutcome::final_response(
                QUERY_DIAG_SEQ,
                2,
                FinalBody::QueryVolume {
                    status: LibStatus::Success,
                    volumes: vec![VolumeStatus {
                        vid: vid(),
                        status: LibStatus::VolumeInUse,
                        location: "drive 000:001:002:003".to_string(),
                    }],
                },
            ));
        let mut channel = channel_with(lib);
        let (qi, to) = intervals();

        let err = mount_tape(&mut channel, &vid(), drive(), false, qi, to).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("drive in use"));
        assert!(text.contains("volume status: VOL001 volume in use at drive 000:001:002:003"));
    }

    #[test]
    fn test_failed_diagnostic_does_not_mask_mount_failure() {
        // Mount submit succeeds, query submit is rejected: the reply must
        // still be the mount failure, with the diagnostic failure noted.
        let lib = ScriptedLibrary::new()
            .with_accept(LibStatus::Success)
            .with_accept(LibStatus::IpcFailure)
            .then_poll(mount_final(LibStatus::DriveInUse));
        let mut channel = channel_with(lib);
        let (qi, to) = intervals();

        let err = mount_tape(&mut channel, &vid(), drive(), false, qi, to).unwrap_err();
        let text = err.to_string();
        assert!(matches!(err, AcsError::MountFailed { .. }));
        assert!(text.contains("drive in use"));
        assert!(text.contains("volume status unavailable"));
    }

    #[test]
    fn test_mount_submit_rejection_becomes_mount_failed() {
        let lib = ScriptedLibrary::new().with_accept(LibStatus::InvalidDrive);
        let mut channel = channel_with(lib);
        let (qi, to) = intervals();

        let err = mount_tape(&mut channel, &vid(), drive(), true, qi, to).unwrap_err();
        assert!(matches!(err, AcsError::MountFailed { .. }));
        assert!(err.to_string().contains("invalid drive"));
    }

    #[test]
    fn test_mount_timeout_becomes_mount_failed() {
        let lib = ScriptedLibrary::new();
        let mut channel = channel_with(lib);

        let err = mount_tape(
            &mut channel,
            &vid(),
            drive(),
            true,
            Duration::from_millis(5),
            Duration::from_millis(20),
        )
        .unwrap_err();
        assert!(matches!(err, AcsError::MountFailed { .. }));
        assert!(err.to_string().contains("no final response within"));
    }

    #[test]
    fn test_dismount_passes_force_flag_to_library() {
        let lib = ScriptedLibrary::new().then_poll(PollOutcome::final_response(
            OP_SEQ,
            1,
            FinalBody::Dismount {
                status: LibStatus::Success,
            },
        ));
        let log = lib.log();
        let mut channel = channel_with(lib);
        let (qi, to) = intervals();

        dismount_tape(&mut channel, &vid(), drive(), true, qi, to).unwrap();

        let calls = log.calls();
        assert!(matches!(
            calls[0],
            LibraryCall::Dismount { seq: OP_SEQ, force: true, .. }
        ));
    }

    #[test]
    fn test_dismount_failure_wraps_status() {
        let lib = ScriptedLibrary::new().then_poll(PollOutcome::final_response(
            OP_SEQ,
            1,
            FinalBody::Dismount {
                status: LibStatus::VolumeNotInLibrary,
            },
        ));
        let mut channel = channel_with(lib);
        let (qi, to) = intervals();

        let err = dismount_tape(&mut channel, &vid(), drive(), false, qi, to).unwrap_err();
        assert!(matches!(err, AcsError::DismountFailed { .. }));
        assert!(err.to_string().contains("volume not in library"));
    }
}
