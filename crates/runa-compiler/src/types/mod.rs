//! The Runa type system.
//!
//! Types live in an arena owned by the [`TypeRegistry`] and are referred
//! to by [`TypeId`]. Every type has a stable printed name; the registry
//! interns by that name, so id equality is printed-name equality. The
//! registry also owns the compatibility predicate, overload selection,
//! and template instantiation.

mod registry;

#[cfg(test)]
mod registry_tests;

pub use registry::{SelectError, TypeDecl, TypeError, TypeRegistry};

use indexmap::IndexMap;

/// A lightweight handle to an interned type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TypeId(u32);

impl TypeId {
    #[inline]
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Whether a method is an initializer, a destructor, or neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Plain,
    Init,
    Del,
}

/// A fully typed function or method signature.
///
/// `symbol` is the mangled name emitted for calls: the plain name for
/// free functions, `Type.method` for methods, with an argument-derived
/// suffix appended to disambiguate overloads.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSig {
    pub symbol: String,
    pub ret: TypeId,
    pub formals: Vec<(String, TypeId)>,
    pub kind: MethodKind,
}

impl FunctionSig {
    pub fn formal_types(&self) -> Vec<TypeId> {
        self.formals.iter().map(|(_, t)| *t).collect()
    }
}

/// The closed family of type shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Void,
    Bool,
    Int { signed: bool, bits: u8 },
    Float,
    /// Placeholder for an integer literal, unified at use sites.
    AnyInt,
    /// Placeholder for a float literal, unified at use sites.
    AnyFloat,
    Module,
    VarArgs,
    /// Unresolved template parameter inside a template body.
    Stub(String),
    Owner(TypeId),
    Ref(TypeId),
    Opt(TypeId),
    Function { ret: TypeId, formals: Vec<TypeId> },
    /// Nominal product type; `filled` is the two-phase sentinel.
    Record { filled: bool },
    Trait { filled: bool },
    Template { params: Vec<String> },
    /// Instantiation of a template (or a tuple) at fixed parameters.
    Concrete {
        template: Option<TypeId>,
        params: Vec<TypeId>,
        symbol: String,
    },
}

/// An interned type: printed name, shape, and member tables.
///
/// Attribute order is field order. The methods table maps a method name
/// to its overloads; traits keep exactly one signature per name.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeEntry {
    pub name: String,
    pub kind: TypeKind,
    pub byval: bool,
    pub attribs: IndexMap<String, TypeId>,
    pub methods: IndexMap<String, Vec<FunctionSig>>,
}

impl TypeEntry {
    pub(crate) fn new(name: impl Into<String>, kind: TypeKind, byval: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            byval,
            attribs: IndexMap::new(),
            methods: IndexMap::new(),
        }
    }
}
