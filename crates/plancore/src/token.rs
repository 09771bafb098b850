use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type TokenId = Uuid;

/// Unit of flow moving through a workplan.
///
/// Tokens are plain values: they never point back at the holder they sit in.
/// Two tokens are equal only if they are the same instance (same id), so a
/// place holding two fresh main tokens holds two distinct entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Token {
    Main(MainToken),
    Split(SplitToken),
}

impl Token {
    /// Fresh primary token, as injected into start places.
    pub fn main() -> Self {
        Token::Main(MainToken::new())
    }

    /// Wrap `original` as one branch of a split.
    pub fn split(original: Token) -> Self {
        Token::Split(SplitToken::new(original))
    }

    pub fn id(&self) -> TokenId {
        match self {
            Token::Main(t) => t.id,
            Token::Split(t) => t.id,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Token::Main(t) => t.name().to_string(),
            Token::Split(t) => t.name(),
        }
    }

    pub fn is_main(&self) -> bool {
        matches!(self, Token::Main(_))
    }

    /// The wrapped token for split branches.
    pub fn original(&self) -> Option<&Token> {
        match self {
            Token::Split(t) => Some(&t.original),
            Token::Main(_) => None,
        }
    }

    /// Strip every split layer.
    pub fn root(&self) -> &Token {
        let mut current = self;
        while let Some(original) = current.original() {
            current = original;
        }
        current
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl From<MainToken> for Token {
    fn from(token: MainToken) -> Self {
        Token::Main(token)
    }
}

impl From<SplitToken> for Token {
    fn from(token: SplitToken) -> Self {
        Token::Split(token)
    }
}

/// The canonical primary-execution token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MainToken {
    pub id: TokenId,
}

impl MainToken {
    pub const NAME: &'static str = "Main";

    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn name(&self) -> &str {
        Self::NAME
    }
}

impl Default for MainToken {
    fn default() -> Self {
        Self::new()
    }
}

/// One branch of a split execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SplitToken {
    pub id: TokenId,
    pub original: Box<Token>,
}

impl SplitToken {
    pub fn new(original: Token) -> Self {
        Self {
            id: Uuid::new_v4(),
            original: Box::new(original),
        }
    }

    pub fn name(&self) -> String {
        format!("{}-Partial", self.original.name())
    }
}
