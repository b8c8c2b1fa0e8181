use thiserror::Error;

/// A parser over a token slice. `pos` is the index of the next unread token and
/// a successful parse returns the index just past what it consumed.
pub trait Parser<I, O> {
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<O>;
}

pub type ParseResult<O> = Result<(usize, O), ParseError>;

/// Every failure remembers the token index it happened at, so alternatives can
/// report the one that got furthest.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected end of input")]
    EOF { position: usize },
    #[error("unexpected token at {position}")]
    Mismatch { position: usize },
    #[error("no alternative matched at {position}")]
    NoAlternative { position: usize },
    #[error("{message}")]
    Fail { message: String, position: usize },
    #[error("{message}: {inner}")]
    WithContext {
        message: String,
        inner: Box<ParseError>,
    },
}

impl ParseError {
    pub fn position(&self) -> usize {
        match self {
            ParseError::EOF { position }
            | ParseError::Mismatch { position }
            | ParseError::NoAlternative { position }
            | ParseError::Fail { position, .. } => *position,
            ParseError::WithContext { inner, .. } => inner.position(),
        }
    }

    /// The innermost explicit failure message, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            ParseError::Fail { message, .. } => Some(message),
            ParseError::WithContext { inner, .. } => inner.message(),
            _ => None,
        }
    }

    /// Keeps whichever of two errors got further into the input. On a tie an
    /// explicit failure message wins.
    pub fn furthest(self, other: ParseError) -> ParseError {
        match other.position().cmp(&self.position()) {
            std::cmp::Ordering::Greater => other,
            std::cmp::Ordering::Equal if self.message().is_none() && other.message().is_some() => {
                other
            }
            _ => self,
        }
    }
}
