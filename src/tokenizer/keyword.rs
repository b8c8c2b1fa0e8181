use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Reserved words. Identifiers are looked up here after they are scanned, so
/// `iffy` stays an identifier while `if` becomes a keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, EnumIter, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    #[strum(serialize = "True")]
    True,
    #[strum(serialize = "False")]
    False,
    #[strum(serialize = "None")]
    None,
    And,
    As,
    Assert,
    Async,
    Await,
    Break,
    Class,
    Continue,
    Def,
    Del,
    Elif,
    Else,
    Except,
    Finally,
    For,
    From,
    Global,
    If,
    Import,
    In,
    Is,
    Lambda,
    Nonlocal,
    Not,
    Or,
    Pass,
    Raise,
    Return,
    Try,
    While,
    With,
    Yield,
}

impl Keyword {
    /// Keywords that open a compound statement and therefore a block.
    pub fn opens_block(&self) -> bool {
        matches!(
            self,
            Keyword::If
                | Keyword::While
                | Keyword::For
                | Keyword::Def
                | Keyword::Class
                | Keyword::Try
                | Keyword::With
                | Keyword::Async
        )
    }

    /// Keywords that continue a compound statement at the outer indentation.
    pub fn continues_block(&self) -> bool {
        matches!(
            self,
            Keyword::Elif | Keyword::Else | Keyword::Except | Keyword::Finally
        )
    }
}
