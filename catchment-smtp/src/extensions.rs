use core::fmt::{self, Display};

use crate::auth::Mechanism;

/// SMTP service extensions advertised in the EHLO response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    /// SIZE extension (RFC 1870).
    ///
    /// A limit of 0 is advertised as a bare `SIZE` and means no limit is
    /// enforced. Otherwise a declared `SIZE=` above the limit is refused at
    /// MAIL FROM, and a message body that grows past it is refused at DATA,
    /// both with 552.
    Size(usize),
    EightBitMime,
    Pipelining,
    EnhancedStatusCodes,
    Auth(Vec<Mechanism>),
}

impl Extension {
    /// Everything this server supports, for the given size limit.
    #[must_use]
    pub fn supported(max_message_size: usize) -> Vec<Self> {
        vec![
            Self::Size(max_message_size),
            Self::EightBitMime,
            Self::Pipelining,
            Self::EnhancedStatusCodes,
            Self::Auth(vec![Mechanism::Plain, Mechanism::Login]),
        ]
    }
}

impl Display for Extension {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::Size(0) => fmt.write_str("SIZE"),
            Self::Size(max) => write!(fmt, "SIZE {max}"),
            Self::EightBitMime => fmt.write_str("8BITMIME"),
            Self::Pipelining => fmt.write_str("PIPELINING"),
            Self::EnhancedStatusCodes => fmt.write_str("ENHANCEDSTATUSCODES"),
            Self::Auth(mechanisms) => {
                fmt.write_str("AUTH")?;
                for mechanism in mechanisms {
                    write!(fmt, " {mechanism}")?;
                }
                Ok(())
            }
        }
    }
}
