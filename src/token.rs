use crate::ease::Ease;
use crate::value::Value;

/// Instruction opcodes, one per script keyword.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Opcode {
    // Declarations, global scope only.
    Object,
    Bundle,
    Load,
    Inst,
    Post,
    // Procedure definition marker.
    Proc,
    // Valid in both contexts; eagerly applied at global scope during pass 1.
    SetG,
    SetA,
    // Procedure bodies only.
    Call,
    Loop,
    Set,
    Key,
    Event,
}

impl Opcode {
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "object" => Some(Self::Object),
            "bundle" => Some(Self::Bundle),
            "load" => Some(Self::Load),
            "inst" => Some(Self::Inst),
            "post" => Some(Self::Post),
            "proc" => Some(Self::Proc),
            "setg" => Some(Self::SetG),
            "seta" => Some(Self::SetA),
            "call" => Some(Self::Call),
            "loop" => Some(Self::Loop),
            "set" => Some(Self::Set),
            "key" => Some(Self::Key),
            "event" => Some(Self::Event),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Bundle => "bundle",
            Self::Load => "load",
            Self::Inst => "inst",
            Self::Post => "post",
            Self::Proc => "proc",
            Self::SetG => "setg",
            Self::SetA => "seta",
            Self::Call => "call",
            Self::Loop => "loop",
            Self::Set => "set",
            Self::Key => "key",
            Self::Event => "event",
        }
    }

    /// Declaration opcodes execute eagerly in pass 1 and may not appear
    /// inside a procedure body.
    pub fn is_declaration(self) -> bool {
        matches!(
            self,
            Self::Object | Self::Bundle | Self::Load | Self::Inst | Self::Post
        )
    }

    /// Opcodes that only make sense inside a procedure body.
    pub fn is_procedure_only(self) -> bool {
        matches!(
            self,
            Self::Call | Self::Loop | Self::Set | Self::Key | Self::Event
        )
    }
}

/// Shallow per-argument AST. Produced once by the lexer, never mutated, only
/// resolved against a scope.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// Bare identifier.
    Name(String),
    /// Dotted/indexed access: a sequence of `Name` and `Indexer` tokens.
    Chain(Vec<Token>),
    /// `[expr]` step inside a chain; the inner token is the index expression.
    Indexer(Box<Token>),
    /// `name(arg, arg)`.
    FuncCall { name: String, args: Vec<Token> },
    /// `{a b c}`.
    Array(Vec<Token>),
    /// Literal resolved at lex time (string, number, bool, timestamp, ease).
    Constant(Value),
    /// Reserved instruction keyword.
    Opcode(Opcode),
}

impl Token {
    pub fn constant_ease(ease: Ease) -> Self {
        Self::Constant(Value::Ease(ease))
    }

    /// The literal name this token carries, for declarations that need the
    /// raw identifier rather than its value.
    pub fn raw_name(&self) -> Option<&str> {
        match self {
            Self::Name(n) => Some(n),
            _ => None,
        }
    }
}
