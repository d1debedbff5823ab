//! Read timeout and misuse policies

use core::fmt;
use core::str::FromStr;
use std::time::Duration;

/// How long a threshold read may wait for `min` bytes
///
/// Mirrors the termios `VMIN`/`VTIME` knobs. Managed pairs only honour
/// `NoWait` and `BlockIndefinitely`; the timed variants exist so a caller
/// can ask for them and be refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Return whatever is buffered right now, possibly nothing
    NoWait,
    /// Wait until `min` bytes are buffered or the peer closes
    #[default]
    BlockIndefinitely,
    /// Inter-byte timer (`VTIME`)
    InterByte(Duration),
    /// Overall deadline for the whole read
    Deadline(Duration),
}

impl TimeoutPolicy {
    /// True for the two policies managed pairs support
    #[inline]
    pub const fn is_supported(&self) -> bool {
        matches!(self, TimeoutPolicy::NoWait | TimeoutPolicy::BlockIndefinitely)
    }
}

impl fmt::Display for TimeoutPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutPolicy::NoWait => write!(f, "no-wait"),
            TimeoutPolicy::BlockIndefinitely => write!(f, "block"),
            TimeoutPolicy::InterByte(d) => write!(f, "inter-byte {:?}", d),
            TimeoutPolicy::Deadline(d) => write!(f, "deadline {:?}", d),
        }
    }
}

/// What a registry does when a caller breaks the usage contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MisusePolicy {
    /// Log the violation and terminate the process
    #[default]
    Abort,
    /// Refuse the call with `VsError::PreconditionViolated`
    Fail,
}

impl FromStr for MisusePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" | "exit" | "0" => Ok(MisusePolicy::Abort),
            "fail" | "error" | "1" => Ok(MisusePolicy::Fail),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_policies() {
        assert!(TimeoutPolicy::NoWait.is_supported());
        assert!(TimeoutPolicy::BlockIndefinitely.is_supported());
        assert!(!TimeoutPolicy::InterByte(Duration::from_millis(100)).is_supported());
        assert!(!TimeoutPolicy::Deadline(Duration::from_secs(1)).is_supported());
        assert_eq!(TimeoutPolicy::default(), TimeoutPolicy::BlockIndefinitely);
    }

    #[test]
    fn test_misuse_policy_parse() {
        assert_eq!("abort".parse::<MisusePolicy>(), Ok(MisusePolicy::Abort));
        assert_eq!("FAIL".parse::<MisusePolicy>(), Ok(MisusePolicy::Fail));
        assert!("sometimes".parse::<MisusePolicy>().is_err());
    }
}
