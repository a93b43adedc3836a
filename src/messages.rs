//! Protocol vocabulary shared between the PV layer and a transport.
//!
//! This module deliberately stops short of message framing: it only models the
//! values that cross the [`Channel`](crate::channel::Channel) boundary. Those are
//! the CA status codes reported with failed operations, the event mask selected
//! for subscriptions, and the access rights granted to a channel.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Severity bits encoded in the low three bits of a CA status code
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorSeverity {
    Warning = 0,
    Success = 1,
    Error = 2,
    Info = 3,
    Severe = 4,
}

/// CA status conditions, as reported by a server for failed operations
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCondition {
    Normal = 0,
    AllocMem = 6,
    TooLarge = 9,
    Timeout = 10,
    BadType = 14,
    Internal = 17,
    DblClFail = 18,
    GetFail = 19,
    PutFail = 20,
    BadCount = 22,
    BadStr = 23,
    Disconn = 24,
    EvDisallow = 26,
    BadMonId = 30,
    BadMask = 41,
    IoDone = 42,
    IoInProgress = 43,
    BadSyncGrp = 44,
    PutCbInProg = 45,
    NoRdAccess = 46,
    NoWtAccess = 47,
    Anachronism = 48,
    NoSearchAddr = 49,
    NoConvert = 50,
    BadChId = 51,
    BadFuncPtr = 52,
    IsAttached = 53,
    UnavailInServ = 54,
    ChanDestroy = 55,
    BadPriority = 56,
    NotThreaded = 57,
    Array16kClient = 58,
    ConnSeqTmo = 59,
    UnrespTmo = 60,
}

impl ErrorCondition {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Normal => ErrorSeverity::Success,
            Self::IoDone | Self::IoInProgress => ErrorSeverity::Info,
            Self::Internal => ErrorSeverity::Severe,
            Self::BadType
            | Self::BadStr
            | Self::EvDisallow
            | Self::BadMonId
            | Self::BadMask
            | Self::BadSyncGrp
            | Self::PutCbInProg
            | Self::Anachronism
            | Self::BadChId
            | Self::BadFuncPtr
            | Self::BadPriority
            | Self::NotThreaded => ErrorSeverity::Error,
            _ => ErrorSeverity::Warning,
        }
    }

    /// Decode a full CA status word (`message_number << 3 | severity`)
    pub fn from_status_code(code: u32) -> Option<Self> {
        Self::try_from((code >> 3) as u16).ok()
    }

    /// Encode into the full CA status word
    pub fn status_code(&self) -> u32 {
        ((*self as u32) << 3) | self.severity() as u32
    }
}

impl TryFrom<u16> for ErrorCondition {
    type Error = ();
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Normal,
            6 => Self::AllocMem,
            9 => Self::TooLarge,
            10 => Self::Timeout,
            14 => Self::BadType,
            17 => Self::Internal,
            18 => Self::DblClFail,
            19 => Self::GetFail,
            20 => Self::PutFail,
            22 => Self::BadCount,
            23 => Self::BadStr,
            24 => Self::Disconn,
            26 => Self::EvDisallow,
            30 => Self::BadMonId,
            41 => Self::BadMask,
            42 => Self::IoDone,
            43 => Self::IoInProgress,
            44 => Self::BadSyncGrp,
            45 => Self::PutCbInProg,
            46 => Self::NoRdAccess,
            47 => Self::NoWtAccess,
            48 => Self::Anachronism,
            49 => Self::NoSearchAddr,
            50 => Self::NoConvert,
            51 => Self::BadChId,
            52 => Self::BadFuncPtr,
            53 => Self::IsAttached,
            54 => Self::UnavailInServ,
            55 => Self::ChanDestroy,
            56 => Self::BadPriority,
            57 => Self::NotThreaded,
            58 => Self::Array16kClient,
            59 => Self::ConnSeqTmo,
            60 => Self::UnrespTmo,
            _ => return Err(()),
        })
    }
}

impl fmt::Display for ErrorCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "Normal successful completion",
            Self::AllocMem => "Unable to allocate additional dynamic memory",
            Self::TooLarge => "The requested data transfer is greater than available memory or EPICS_CA_MAX_ARRAY_BYTES",
            Self::Timeout => "User specified timeout on IO operation expired",
            Self::BadType => "The data type specified is invalid",
            Self::Internal => "Channel Access Internal Failure",
            Self::DblClFail => "The requested local DB operation failed",
            Self::GetFail => "Channel read request failed",
            Self::PutFail => "Channel write request failed",
            Self::BadCount => "Invalid element count requested",
            Self::BadStr => "Invalid string",
            Self::Disconn => "Virtual circuit disconnect",
            Self::EvDisallow => "Request inappropriate within subscription (monitor) update callback",
            Self::BadMonId => "Bad event subscription (monitor) identifier",
            Self::BadMask => "Invalid event selection mask",
            Self::IoDone => "IO operations have completed",
            Self::IoInProgress => "IO operations are in progress",
            Self::BadSyncGrp => "Invalid synchronous group identifier",
            Self::PutCbInProg => "Put callback timed out",
            Self::NoRdAccess => "Read access denied",
            Self::NoWtAccess => "Write access denied",
            Self::Anachronism => "Requested feature is no longer supported",
            Self::NoSearchAddr => "Empty PV search address list",
            Self::NoConvert => "No reasonable data conversion between client and server types",
            Self::BadChId => "Invalid channel identifier",
            Self::BadFuncPtr => "Invalid function pointer",
            Self::IsAttached => "Thread is already attached to a client context",
            Self::UnavailInServ => "Not supported by attached service",
            Self::ChanDestroy => "User destroyed channel",
            Self::BadPriority => "Invalid channel priority",
            Self::NotThreaded => "Preemptive callback not enabled - additional threads may not join context",
            Self::Array16kClient => "Client's protocol revision does not support transfers exceeding 16k bytes",
            Self::ConnSeqTmo => "Virtual circuit connection sequence aborted",
            Self::UnrespTmo => "Virtual circuit unresponsive",
        })
    }
}

/// Access rights granted to a channel, as last reported by the server
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Access {
    #[default]
    None = 0,
    Read = 1,
    Write = 2,
    ReadWrite = 3,
}

impl Access {
    pub fn can_read(&self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }
    pub fn can_write(&self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

impl TryFrom<u32> for Access {
    type Error = ();
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Access::None),
            1 => Ok(Access::Read),
            2 => Ok(Access::Write),
            3 => Ok(Access::ReadWrite),
            _ => Err(()),
        }
    }
}

/// Event classes that trigger an update on a subscription (`DBE_*`)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MonitorMask {
    pub value: bool,
    pub log: bool,
    pub alarm: bool,
    pub property: bool,
}

impl MonitorMask {
    pub const NONE: MonitorMask = MonitorMask {
        value: false,
        log: false,
        alarm: false,
        property: false,
    };
    pub const PROPERTY: MonitorMask = MonitorMask {
        property: true,
        ..Self::NONE
    };

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }

    /// The bit representation used on the wire
    pub fn bits(&self) -> u16 {
        (self.value as u16) | (self.log as u16) << 1 | (self.alarm as u16) << 2 | (self.property as u16) << 3
    }

    pub fn from_bits(bits: u16) -> Self {
        MonitorMask {
            value: bits & 0x1 != 0,
            log: bits & 0x2 != 0,
            alarm: bits & 0x4 != 0,
            property: bits & 0x8 != 0,
        }
    }
}

impl Default for MonitorMask {
    /// `DBE_VALUE | DBE_ALARM`
    fn default() -> Self {
        MonitorMask {
            value: true,
            alarm: true,
            ..Self::NONE
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown event mask token '{0}'")]
pub struct InvalidMaskToken(pub String);

impl FromStr for MonitorMask {
    type Err = InvalidMaskToken;

    /// Parse `DBE_*` tokens joined by `|`, e.g. `DBE_VALUE | DBE_ALARM`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mask = MonitorMask::NONE;
        for token in s.split('|').map(str::trim) {
            match token {
                "DBE_VALUE" => mask.value = true,
                // DBE_LOG is the older name for the archive class
                "DBE_ARCHIVE" | "DBE_LOG" => mask.log = true,
                "DBE_ALARM" => mask.alarm = true,
                "DBE_PROPERTY" => mask.property = true,
                other => return Err(InvalidMaskToken(other.to_string())),
            }
        }
        Ok(mask)
    }
}

impl fmt::Display for MonitorMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (self.value, "DBE_VALUE"),
            (self.log, "DBE_ARCHIVE"),
            (self.alarm, "DBE_ALARM"),
            (self.property, "DBE_PROPERTY"),
        ]
        .iter()
        .filter_map(|(set, name)| set.then_some(*name))
        .collect();
        if names.is_empty() {
            f.write_str("DBE_NONE")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}
