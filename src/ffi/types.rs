//! Boundary Type System
//!
//! Describes entry-point and callback signatures as data, so both sides can
//! state what they were built against.

use std::fmt;

/// Callback shapes agreed between host and module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    /// `fn()`
    Probe,
    /// `fn(bool)`
    Bool,
    /// `fn(string)`, the string lent for the duration of the call
    String,
}

impl CallbackKind {
    /// Parameter type of this shape, if any
    pub fn param(&self) -> Option<BoundaryType> {
        match self {
            CallbackKind::Probe => None,
            CallbackKind::Bool => Some(BoundaryType::Bool),
            CallbackKind::String => Some(BoundaryType::String),
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.param() {
            Some(param) => write!(f, "fn({})", param),
            None => write!(f, "fn()"),
        }
    }
}

/// Types allowed across the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryType {
    /// No value
    Void,
    /// C `bool`
    Bool,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// Opaque pointer (image handles and the like)
    Ptr,
    /// Boundary string handle
    String,
    /// Callback reference of an agreed shape
    Callback(CallbackKind),
}

impl BoundaryType {
    /// Size in bytes at the ABI
    pub fn size(&self) -> usize {
        match self {
            BoundaryType::Void => 0,
            BoundaryType::Bool => 1,
            BoundaryType::I32 => 4,
            BoundaryType::I64 => 8,
            BoundaryType::Ptr | BoundaryType::String | BoundaryType::Callback(_) => {
                std::mem::size_of::<usize>()
            }
        }
    }

    /// Whether the value is passed as an address
    pub fn is_pointer(&self) -> bool {
        matches!(
            self,
            BoundaryType::Ptr | BoundaryType::String | BoundaryType::Callback(_)
        )
    }

    /// Parse from the textual form used in signatures
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix("fn(").and_then(|r| r.strip_suffix(')')) {
            let kind = match BoundaryType::parse(inner) {
                None if inner.trim().is_empty() => CallbackKind::Probe,
                Some(BoundaryType::Bool) => CallbackKind::Bool,
                Some(BoundaryType::String) => CallbackKind::String,
                _ => return None,
            };
            return Some(BoundaryType::Callback(kind));
        }

        match s.to_lowercase().as_str() {
            "void" => Some(BoundaryType::Void),
            "bool" => Some(BoundaryType::Bool),
            "i32" | "int" | "int32_t" => Some(BoundaryType::I32),
            "i64" | "long" | "int64_t" => Some(BoundaryType::I64),
            "ptr" | "pointer" | "void*" => Some(BoundaryType::Ptr),
            "string" | "cstr" | "char*" => Some(BoundaryType::String),
            _ => None,
        }
    }
}

impl fmt::Display for BoundaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryType::Void => write!(f, "void"),
            BoundaryType::Bool => write!(f, "bool"),
            BoundaryType::I32 => write!(f, "i32"),
            BoundaryType::I64 => write!(f, "i64"),
            BoundaryType::Ptr => write!(f, "ptr"),
            BoundaryType::String => write!(f, "string"),
            BoundaryType::Callback(kind) => write!(f, "{}", kind),
        }
    }
}

/// Signature of an exported entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Exported symbol name
    pub name: String,
    /// Parameter types
    pub params: Vec<BoundaryType>,
    /// Return type
    pub return_type: BoundaryType,
}

impl Signature {
    /// Create a new signature
    pub fn new(
        name: impl Into<String>,
        params: Vec<BoundaryType>,
        return_type: BoundaryType,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            return_type,
        }
    }

    /// Parse the C-like form `"return_type name(param, param)"`
    pub fn parse(signature: &str) -> Option<Self> {
        let signature = signature.trim();

        let open = signature.find('(')?;
        let close = signature.rfind(')')?;
        if close < open || !signature[close + 1..].trim().is_empty() {
            return None;
        }

        let before = signature[..open].trim();
        let parts: Vec<&str> = before.rsplitn(2, char::is_whitespace).collect();
        if parts.len() < 2 {
            return None;
        }
        let name = parts[0].trim();
        let return_type = BoundaryType::parse(parts[1])?;

        let inner = &signature[open + 1..close];
        let mut params = Vec::new();
        for param in split_params(inner) {
            if param.trim().is_empty() {
                continue;
            }
            params.push(BoundaryType::parse(param)?);
        }

        Some(Self {
            name: name.to_string(),
            params,
            return_type,
        })
    }
}

/// Split a parameter list on top-level commas
fn split_params(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&list[start..]);
    parts
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.return_type, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")")
    }
}
