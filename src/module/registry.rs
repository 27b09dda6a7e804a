//! Entry Point Registry
//!
//! The fixed set of operations the module exports, and the self-describing
//! table (`hl_module_entries`) the host reads before calling any of them.

use std::ffi::{c_char, CStr, CString};
use std::fmt;

use once_cell::sync::Lazy;

use crate::error::{BridgeError, BridgeResult};
use crate::ffi::{BoundaryType, CallbackKind, Signature};

/// Version of the boundary ABI; host and module must agree
pub const ABI_VERSION: u32 = 1;

/// Symbol of the entry table export
pub const ENTRY_TABLE_SYMBOL: &str = "hl_module_entries";

pub const BOOTSTRAP: &str = "hl_bootstrap";
pub const PRINT: &str = "hl_print";
pub const INVOKE_WITH_BOOL: &str = "hl_invoke_with_bool";
pub const INVOKE_WITH_STRING: &str = "hl_invoke_with_string";
pub const PRODUCE_STRING: &str = "hl_produce_string";
pub const ECHO_STRING: &str = "hl_echo_string";
pub const LAST_ERROR: &str = "hl_last_error";

/// Deployment variant of the entry point set
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// The host calls `hl_bootstrap` with its image handle first
    Bootstrap = 1,
    /// No bootstrap entry; the module seeds itself on first use
    Direct = 2,
}

impl Variant {
    /// The variant this build was configured with
    #[cfg(feature = "bootstrap")]
    pub const ACTIVE: Variant = Variant::Bootstrap;
    #[cfg(feature = "direct")]
    pub const ACTIVE: Variant = Variant::Direct;

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Variant::Bootstrap),
            2 => Some(Variant::Direct),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Bootstrap => write!(f, "bootstrap"),
            Variant::Direct => write!(f, "direct"),
        }
    }
}

/// Signatures of the entry points exported by a module of `variant`
pub fn entry_points(variant: Variant) -> Vec<Signature> {
    use BoundaryType::*;

    let mut entries = Vec::new();
    if variant == Variant::Bootstrap {
        entries.push(Signature::new(BOOTSTRAP, vec![Ptr], Void));
    }
    entries.extend([
        Signature::new(PRINT, vec![String], Void),
        Signature::new(INVOKE_WITH_BOOL, vec![Callback(CallbackKind::Bool)], Void),
        Signature::new(
            INVOKE_WITH_STRING,
            vec![Callback(CallbackKind::String)],
            Void,
        ),
        Signature::new(PRODUCE_STRING, vec![], String),
        Signature::new(ECHO_STRING, vec![String], String),
        Signature::new(LAST_ERROR, vec![], String),
    ]);
    entries
}

/// One row of the entry table
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct EntryDescriptor {
    /// Exported symbol name, NUL-terminated
    pub name: *const c_char,
    /// Signature in textual form, NUL-terminated
    pub signature: *const c_char,
}

/// Entry table returned by `hl_module_entries`
///
/// The pointers refer to static storage inside the module and stay valid
/// while it is loaded.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct EntryPointTable {
    pub version: u32,
    pub variant: u32,
    pub entry_count: u32,
    pub entries: *const EntryDescriptor,
}

struct TableStorage {
    _strings: Vec<CString>,
    descriptors: Vec<EntryDescriptor>,
}

// Immutable after construction; the pointers target the owned CStrings.
unsafe impl Send for TableStorage {}
unsafe impl Sync for TableStorage {}

static TABLE: Lazy<TableStorage> = Lazy::new(|| {
    let mut strings = Vec::new();
    let mut descriptors = Vec::new();
    for sig in entry_points(Variant::ACTIVE) {
        let name = CString::new(sig.name.as_str()).unwrap_or_default();
        let signature = CString::new(sig.to_string()).unwrap_or_default();
        descriptors.push(EntryDescriptor {
            name: name.as_ptr(),
            signature: signature.as_ptr(),
        });
        strings.push(name);
        strings.push(signature);
    }
    TableStorage {
        _strings: strings,
        descriptors,
    }
});

/// The entry table of this build
pub fn entry_table() -> EntryPointTable {
    EntryPointTable {
        version: ABI_VERSION,
        variant: Variant::ACTIVE as u32,
        entry_count: TABLE.descriptors.len() as u32,
        entries: TABLE.descriptors.as_ptr(),
    }
}

/// An entry decoded from a module's table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedEntry {
    pub name: String,
    pub signature: String,
}

impl EntryPointTable {
    /// Decode the table rows.
    ///
    /// # Safety
    ///
    /// The table must come from `hl_module_entries` of a module that is
    /// still loaded.
    pub unsafe fn decode(&self) -> BridgeResult<Vec<AdvertisedEntry>> {
        if self.entries.is_null() {
            return Err(BridgeError::InvalidBoundaryValue(
                "entry table has no rows".to_string(),
            ));
        }
        let rows = std::slice::from_raw_parts(self.entries, self.entry_count as usize);
        rows.iter()
            .map(|row| -> BridgeResult<AdvertisedEntry> {
                Ok(AdvertisedEntry {
                    name: read_c_str(row.name)?,
                    signature: read_c_str(row.signature)?,
                })
            })
            .collect()
    }
}

unsafe fn read_c_str(ptr: *const c_char) -> BridgeResult<String> {
    if ptr.is_null() {
        return Err(BridgeError::InvalidBoundaryValue(
            "null string in entry table".to_string(),
        ));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(str::to_owned)
        .map_err(|e| BridgeError::InvalidBoundaryValue(format!("entry table: {}", e)))
}

/// Check a module's advertised entries against what this build expects.
///
/// Returns the module's variant. Extra advertised entries are ignored.
pub fn verify(version: u32, variant: u32, advertised: &[AdvertisedEntry]) -> BridgeResult<Variant> {
    if version != ABI_VERSION {
        return Err(BridgeError::VersionMismatch {
            expected: ABI_VERSION,
            found: version,
        });
    }
    let variant = Variant::from_raw(variant).ok_or_else(|| {
        BridgeError::InvalidBoundaryValue(format!("unknown module variant {}", variant))
    })?;

    for expected in entry_points(variant) {
        let entry = advertised
            .iter()
            .find(|e| e.name == expected.name)
            .ok_or_else(|| BridgeError::UnresolvedSymbol(expected.name.clone()))?;

        if Signature::parse(&entry.signature).as_ref() != Some(&expected) {
            return Err(BridgeError::SignatureDisagreement {
                entry: expected.name.clone(),
                expected: expected.to_string(),
                found: entry.signature.clone(),
            });
        }
    }

    Ok(variant)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advertised(variant: Variant) -> Vec<AdvertisedEntry> {
        entry_points(variant)
            .into_iter()
            .map(|sig| AdvertisedEntry {
                name: sig.name.clone(),
                signature: sig.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_own_table_verifies() {
        let table = entry_table();
        let rows = unsafe { table.decode() }.unwrap();
        assert_eq!(rows.len(), entry_points(Variant::ACTIVE).len());
        let variant = verify(table.version, table.variant, &rows).unwrap();
        assert_eq!(variant, Variant::ACTIVE);
    }

    #[test]
    fn test_variant_entry_sets() {
        let bootstrap = entry_points(Variant::Bootstrap);
        let direct = entry_points(Variant::Direct);
        assert!(bootstrap.iter().any(|s| s.name == BOOTSTRAP));
        assert!(!direct.iter().any(|s| s.name == BOOTSTRAP));
        assert_eq!(bootstrap.len(), direct.len() + 1);
    }

    #[test]
    fn test_version_mismatch() {
        let rows = advertised(Variant::Bootstrap);
        assert!(matches!(
            verify(ABI_VERSION + 1, 1, &rows),
            Err(BridgeError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_signature_disagreement() {
        let mut rows = advertised(Variant::Direct);
        for row in rows.iter_mut().filter(|r| r.name == INVOKE_WITH_BOOL) {
            row.signature = "void hl_invoke_with_bool(fn(string))".to_string();
        }
        match verify(ABI_VERSION, 2, &rows) {
            Err(BridgeError::SignatureDisagreement { entry, .. }) => {
                assert_eq!(entry, INVOKE_WITH_BOOL)
            }
            other => panic!("expected disagreement, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_entry() {
        let rows: Vec<_> = advertised(Variant::Bootstrap)
            .into_iter()
            .filter(|r| r.name != ECHO_STRING)
            .collect();
        assert!(matches!(
            verify(ABI_VERSION, 1, &rows),
            Err(BridgeError::UnresolvedSymbol(name)) if name == ECHO_STRING
        ));
    }

    #[test]
    fn test_unknown_variant() {
        assert!(verify(ABI_VERSION, 9, &[]).is_err());
    }
}
