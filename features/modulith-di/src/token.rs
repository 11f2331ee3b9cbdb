use std::{
    borrow::Cow,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        LazyLock,
    },
};

use crate::types::TypeInfo;

static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(1);

/// Token of the ambient "current request" value.
///
/// Lives in the internal core module, which is global, so every module can
/// inject it without importing anything.
pub static REQUEST: LazyLock<Token> = LazyLock::new(|| Token::Symbol(Symbol::new("REQUEST")));

/// Opaque symbolic key
///
/// Every call to [`Symbol::new`] yields a distinct key, even for equal
/// descriptions. The description only shows up in diagnostics.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol {
    id: u64,
    description: &'static str,
}
impl Symbol {
    pub fn new(description: &'static str) -> Self {
        Symbol {
            id: NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed),
            description,
        }
    }

    pub fn description(&self) -> &'static str {
        self.description
    }
}
impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({}#{})", self.description, self.id)
    }
}

/// Identity under which a provider is registered and looked up
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// A Rust type, the equivalent of a class reference
    Type(TypeInfo),
    /// A plain string key
    Name(Cow<'static, str>),
    /// A unique symbolic key
    Symbol(Symbol),
}

impl Token {
    pub fn of<T: 'static + ?Sized>() -> Token {
        Token::Type(TypeInfo::of::<T>())
    }

    pub fn named(name: impl Into<Cow<'static, str>>) -> Token {
        Token::Name(name.into())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Type(info) => f.write_str(info.type_name),
            Token::Name(name) => write!(f, "\"{name}\""),
            Token::Symbol(symbol) => write!(f, "Symbol({})", symbol.description),
        }
    }
}

impl From<&'static str> for Token {
    fn from(name: &'static str) -> Self {
        Token::Name(Cow::Borrowed(name))
    }
}
impl From<String> for Token {
    fn from(name: String) -> Self {
        Token::Name(Cow::Owned(name))
    }
}
impl From<Symbol> for Token {
    fn from(symbol: Symbol) -> Self {
        Token::Symbol(symbol)
    }
}
impl From<TypeInfo> for Token {
    fn from(info: TypeInfo) -> Self {
        Token::Type(info)
    }
}
impl From<&Token> for Token {
    fn from(token: &Token) -> Self {
        token.clone()
    }
}
