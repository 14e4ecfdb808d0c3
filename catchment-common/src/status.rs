use core::fmt::{self, Display, Formatter};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug)]
pub enum Status {
    SystemStatus,
    HelpMessage,
    ServiceReady,
    GoodBye,
    AuthSuccessful,
    Ok,
    CannotVerify,
    AuthContinue,
    StartMailInput,
    Unavailable,
    ActionUnavailable,
    SyntaxError,
    ParameterError,
    NotImplemented,
    InvalidCommandSequence,
    ParameterNotImplemented,
    ExceededStorage,
    TransactionFailed,
    Unknown(u32),
}

impl From<u32> for Status {
    fn from(value: u32) -> Self {
        match value {
            211 => Self::SystemStatus,
            214 => Self::HelpMessage,
            220 => Self::ServiceReady,
            221 => Self::GoodBye,
            235 => Self::AuthSuccessful,
            250 => Self::Ok,
            252 => Self::CannotVerify,
            334 => Self::AuthContinue,
            354 => Self::StartMailInput,
            421 => Self::Unavailable,
            451 => Self::ActionUnavailable,
            500 => Self::SyntaxError,
            501 => Self::ParameterError,
            502 => Self::NotImplemented,
            503 => Self::InvalidCommandSequence,
            504 => Self::ParameterNotImplemented,
            552 => Self::ExceededStorage,
            554 => Self::TransactionFailed,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Status> for u32 {
    fn from(value: Status) -> Self {
        match value {
            Status::SystemStatus => 211,
            Status::HelpMessage => 214,
            Status::ServiceReady => 220,
            Status::GoodBye => 221,
            Status::AuthSuccessful => 235,
            Status::Ok => 250,
            Status::CannotVerify => 252,
            Status::AuthContinue => 334,
            Status::StartMailInput => 354,
            Status::Unavailable => 421,
            Status::ActionUnavailable => 451,
            Status::SyntaxError => 500,
            Status::ParameterError => 501,
            Status::NotImplemented => 502,
            Status::InvalidCommandSequence => 503,
            Status::ParameterNotImplemented => 504,
            Status::ExceededStorage => 552,
            Status::TransactionFailed => 554,
            Status::Unknown(v) => v,
        }
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", u32::from(*self))
    }
}

/// Enhanced mail system status code (RFC 3463), e.g. `4.3.0`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EnhancedCode(pub u8, pub u16, pub u16);

impl EnhancedCode {
    pub const OK: Self = Self(2, 0, 0);
    pub const AUTH_OK: Self = Self(2, 7, 0);
    pub const SENDER_OK: Self = Self(2, 1, 0);
    pub const DESTINATION_OK: Self = Self(2, 1, 5);
    pub const BYE: Self = Self(2, 0, 0);
    pub const CANNOT_VERIFY: Self = Self(2, 5, 0);
    pub const SYSTEM_TRANSIENT: Self = Self(4, 3, 0);
    pub const ABORTED: Self = Self(5, 0, 0);
    pub const SYNTAX: Self = Self(5, 5, 2);
    pub const INVALID_ARGUMENTS: Self = Self(5, 5, 4);
    pub const BAD_SEQUENCE: Self = Self(5, 5, 1);
    pub const NOT_IMPLEMENTED: Self = Self(5, 5, 1);
    pub const MESSAGE_TOO_BIG: Self = Self(5, 3, 4);
    pub const CONTENT_INVALID: Self = Self(5, 6, 0);
}

impl Display for EnhancedCode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}.{}.{}", self.0, self.1, self.2)
    }
}
