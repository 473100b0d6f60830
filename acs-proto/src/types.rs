//! Volume and drive identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a volume label (vendor external-label limit).
pub const MAX_VID_LEN: usize = 6;

/// Maximum value of a single drive-address component (three decimal digits).
pub const MAX_DRIVE_COMPONENT: u16 = 999;

/// Malformed identifier input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid argument: {0}")]
pub struct InvalidArgument(pub String);

/// A tape volume label.
///
/// Labels longer than [`MAX_VID_LEN`] are truncated to the vendor limit;
/// the retained prefix must be printable ASCII and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeId(String);

impl VolumeId {
    pub fn new(label: &str) -> Result<Self, InvalidArgument> {
        let label: String = label.chars().take(MAX_VID_LEN).collect();
        if label.is_empty() {
            return Err(InvalidArgument("empty volume label".to_string()));
        }
        if !label.chars().all(|c| c.is_ascii_graphic()) {
            return Err(InvalidArgument(format!(
                "volume label {label:?} contains non-printable characters"
            )));
        }
        Ok(Self(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VolumeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The four-part address of a drive inside the robotic library:
/// library zone (acs), sub-zone (lsm), panel, and drive unit.
///
/// Parses from a colon-delimited string of 1-3 digit fields and formats
/// back to the canonical zero-padded form (`001:002:003:004`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriveAddr {
    pub acs: u16,
    pub lsm: u16,
    pub panel: u16,
    pub drive: u16,
}

impl DriveAddr {
    pub fn new(acs: u16, lsm: u16, panel: u16, drive: u16) -> Result<Self, InvalidArgument> {
        let addr = Self {
            acs,
            lsm,
            panel,
            drive,
        };
        addr.validate()?;
        Ok(addr)
    }

    /// Check every component against the vendor numeric range.
    ///
    /// Needed separately from [`DriveAddr::new`] because addresses decoded
    /// from the wire bypass the constructor.
    pub fn validate(&self) -> Result<(), InvalidArgument> {
        for (name, value) in [
            ("acs", self.acs),
            ("lsm", self.lsm),
            ("panel", self.panel),
            ("drive", self.drive),
        ] {
            if value > MAX_DRIVE_COMPONENT {
                return Err(InvalidArgument(format!(
                    "drive address component {name}={value} exceeds {MAX_DRIVE_COMPONENT}"
                )));
            }
        }
        Ok(())
    }
}

impl FromStr for DriveAddr {
    type Err = InvalidArgument;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(':').collect();
        if fields.len() != 4 {
            return Err(InvalidArgument(format!(
                "drive address {s:?} must have 4 colon-separated fields, got {}",
                fields.len()
            )));
        }
        let mut values = [0u16; 4];
        for (i, field) in fields.iter().enumerate() {
            if field.is_empty() || field.len() > 3 {
                return Err(InvalidArgument(format!(
                    "drive address field {field:?} must be 1-3 digits"
                )));
            }
            if !field.bytes().all(|b| b.is_ascii_digit()) {
                return Err(InvalidArgument(format!(
                    "drive address field {field:?} is not numeric"
                )));
            }
            values[i] = field
                .parse()
                .map_err(|_| InvalidArgument(format!("drive address field {field:?} is out of range")))?;
        }
        Self::new(values[0], values[1], values[2], values[3])
    }
}

impl fmt::Display for DriveAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:03}:{:03}:{:03}:{:03}",
            self.acs, self.lsm, self.panel, self.drive
        )
    }
}
