//! Deterministic hash-based type identity.
//!
//! [`TypeHash`] is a 64-bit hash that identifies a registered host type or a
//! callable member. Hashes are computed from names and signatures, so the
//! same type registered twice, or referenced before it is registered, always
//! maps to the same key.
//!
//! # Hash Computation
//!
//! Uses XXHash64 with domain-specific mixing constants so that a type, a
//! method and a constructor sharing a name never collide.
//!
//! # Examples
//!
//! ```
//! use hostbridge_core::TypeHash;
//!
//! let widget = TypeHash::from_name("Demo.Widget");
//! assert_eq!(widget, TypeHash::from_name("Demo.Widget"));
//!
//! let int32 = TypeHash::from_name("Int32");
//! let double = TypeHash::from_name("Double");
//! let a = TypeHash::from_method(widget, "Resize", &[int32]);
//! let b = TypeHash::from_method(widget, "Resize", &[double]);
//! assert_ne!(a, b);
//! ```

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain-specific mixing constants for hash computation.
pub mod hash_constants {
    /// Separator constant for chained components
    pub const SEP: u64 = 0x4bc94d6bd06053ad;

    /// Domain marker for type hashes
    pub const TYPE: u64 = 0x2fac10b63a6cc57c;

    /// Domain marker for method hashes
    pub const METHOD: u64 = 0x7d3c8b4a92e15f6d;

    /// Domain marker for constructor hashes
    pub const CONSTRUCTOR: u64 = 0x9a7f3d5e2b8c4601;

    /// Parameter position mixing constants.
    /// Each position gets its own constant so that parameter order matters.
    pub const PARAM_MARKERS: [u64; 16] = [
        0x9e3779b97f4a7c15,
        0xbf58476d1ce4e5b9,
        0x94d049bb133111eb,
        0xd6e8feb86659fd93,
        0xe7037ed1a0b428db,
        0xc6a4a7935bd1e995,
        0x8648dbbc94d49b8d,
        0xa2b48b2c69e0d657,
        0x7c3e9f2a5b8d1403,
        0x5d8c7b4a3e9f2106,
        0x3f1e9d8c7b5a4203,
        0x1a2b3c4d5e6f7089,
        0x9f8e7d6c5b4a3210,
        0x2468ace013579bdf,
        0xfdb97531eca86420,
        0x123456789abcdef0,
    ];
}

/// A deterministic 64-bit hash identifying a host type or callable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Create a type hash from a full type name.
    ///
    /// # Examples
    ///
    /// ```
    /// use hostbridge_core::{TypeHash, primitives};
    ///
    /// assert_eq!(TypeHash::from_name("Int32"), primitives::INT32);
    /// ```
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(hash_constants::TYPE ^ xxh64(name.as_bytes(), 0))
    }

    /// Create a method hash from the declaring type, name and parameter type hashes.
    #[inline]
    pub fn from_method(owner: TypeHash, name: &str, param_hashes: &[TypeHash]) -> Self {
        let seed = hash_constants::METHOD ^ owner.0 ^ xxh64(name.as_bytes(), 0);
        TypeHash(mix_params(seed, param_hashes))
    }

    /// Create a constructor hash from the declaring type and parameter type hashes.
    #[inline]
    pub fn from_constructor(owner: TypeHash, param_hashes: &[TypeHash]) -> Self {
        TypeHash(mix_params(hash_constants::CONSTRUCTOR ^ owner.0, param_hashes))
    }

    /// Create a hash for a constructed generic type from its definition and type arguments.
    #[inline]
    pub fn from_generic_instance(definition: TypeHash, args: &[TypeHash]) -> Self {
        TypeHash(mix_params(definition.0, args))
    }

    /// Check if this is an empty/invalid hash.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Get the underlying u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

fn mix_params(seed: u64, params: &[TypeHash]) -> u64 {
    let mut hash = seed;
    for (i, param) in params.iter().enumerate() {
        let marker = hash_constants::PARAM_MARKERS
            .get(i)
            .copied()
            .unwrap_or_else(|| hash_constants::PARAM_MARKERS[0].wrapping_add(i as u64));
        // wrapping_mul keeps the mix order-dependent, unlike XOR
        hash = hash.wrapping_mul(hash_constants::SEP).wrapping_add(marker ^ param.0);
    }
    hash
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Well-known hashes for the built-in types.
///
/// These are pre-computed from `TypeHash::from_name()`; the values already
/// include the `TYPE` domain constant.
pub mod primitives {
    use super::TypeHash;

    /// Root of every type hierarchy.
    pub const OBJECT: TypeHash = TypeHash(0x3b851cdce78e08ca);
    /// Base of primitives, structs and boxes.
    pub const VALUE_TYPE: TypeHash = TypeHash(0x5f6b552acd090876);
    pub const VOID: TypeHash = TypeHash(0x20a75d69eb4a153a);
    pub const STRING: TypeHash = TypeHash(0xb496d499073b895b);
    pub const BOOLEAN: TypeHash = TypeHash(0xaf2b3bccc536e8fe);
    pub const CHAR: TypeHash = TypeHash(0x97da7d87504ee15d);
    pub const SBYTE: TypeHash = TypeHash(0x51efc77e8bd2d7a9);
    pub const BYTE: TypeHash = TypeHash(0xb11b85e7ab5a6ed6);
    pub const INT16: TypeHash = TypeHash(0x06a731872fed478d);
    pub const UINT16: TypeHash = TypeHash(0xd588807aef264e27);
    pub const INT32: TypeHash = TypeHash(0x06b4147a231b6775);
    pub const UINT32: TypeHash = TypeHash(0x38939f35ecbb07ac);
    pub const INT64: TypeHash = TypeHash(0x7557df1a212b9b99);
    pub const UINT64: TypeHash = TypeHash(0x1fc44ee57ed56e7f);
    pub const SINGLE: TypeHash = TypeHash(0xb928f4cddc986c5b);
    pub const DOUBLE: TypeHash = TypeHash(0xf8f78ce431fb853f);
    /// Base of every array type.
    pub const ARRAY: TypeHash = TypeHash(0xad4653788f7a1b72);
    /// Base of every delegate type.
    pub const DELEGATE: TypeHash = TypeHash(0xe9fb6293fce21080);
    pub const EXCEPTION: TypeHash = TypeHash(0x211c5c90941a91a5);
    pub const INT64_BOX: TypeHash = TypeHash(0x71e32935fb84ef11);
    pub const UINT64_BOX: TypeHash = TypeHash(0xac4b6cd4e636727e);
    pub const STATIC_CONTEXT: TypeHash = TypeHash(0x93500be20fa830c3);
    pub const PARTIAL_TARGET: TypeHash = TypeHash(0x47caeb02a719b127);
    pub const HINTED_TARGET: TypeHash = TypeHash(0x885cf235e80c69e0);
    pub const FOREIGN_TABLE: TypeHash = TypeHash(0x91b861a368f9a0ce);
    pub const FOREIGN_FUNCTION: TypeHash = TypeHash(0x2e9e6ede074c58a4);
    pub const FOREIGN_USERDATA: TypeHash = TypeHash(0x5747319ecb995a7a);
    pub const FOREIGN_THREAD: TypeHash = TypeHash(0x97797d170a64a015);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_hash_determinism() {
        assert_eq!(TypeHash::from_name("Demo.Widget"), TypeHash::from_name("Demo.Widget"));
        assert_ne!(TypeHash::from_name("Demo.Widget"), TypeHash::from_name("Demo.Gadget"));
    }

    #[test]
    fn builtin_constants_match_names() {
        let cases = [
            ("Object", primitives::OBJECT),
            ("ValueType", primitives::VALUE_TYPE),
            ("Void", primitives::VOID),
            ("String", primitives::STRING),
            ("Boolean", primitives::BOOLEAN),
            ("Char", primitives::CHAR),
            ("SByte", primitives::SBYTE),
            ("Byte", primitives::BYTE),
            ("Int16", primitives::INT16),
            ("UInt16", primitives::UINT16),
            ("Int32", primitives::INT32),
            ("UInt32", primitives::UINT32),
            ("Int64", primitives::INT64),
            ("UInt64", primitives::UINT64),
            ("Single", primitives::SINGLE),
            ("Double", primitives::DOUBLE),
            ("Array", primitives::ARRAY),
            ("Delegate", primitives::DELEGATE),
            ("Exception", primitives::EXCEPTION),
            ("Int64Box", primitives::INT64_BOX),
            ("UInt64Box", primitives::UINT64_BOX),
            ("StaticContext", primitives::STATIC_CONTEXT),
            ("PartialTarget", primitives::PARTIAL_TARGET),
            ("HintedTarget", primitives::HINTED_TARGET),
            ("ForeignTable", primitives::FOREIGN_TABLE),
            ("ForeignFunction", primitives::FOREIGN_FUNCTION),
            ("ForeignUserData", primitives::FOREIGN_USERDATA),
            ("ForeignThread", primitives::FOREIGN_THREAD),
        ];
        for (name, hash) in cases {
            assert_eq!(TypeHash::from_name(name), hash, "{name}");
        }
    }

    #[test]
    fn method_hash_parameter_order_matters() {
        let owner = TypeHash::from_name("Demo.Calc");
        let f1 = TypeHash::from_method(owner, "f", &[primitives::INT32, primitives::DOUBLE]);
        let f2 = TypeHash::from_method(owner, "f", &[primitives::DOUBLE, primitives::INT32]);
        assert_ne!(f1, f2);
    }

    #[test]
    fn method_hash_includes_owner() {
        let a = TypeHash::from_method(TypeHash::from_name("A"), "Run", &[]);
        let b = TypeHash::from_method(TypeHash::from_name("B"), "Run", &[]);
        assert_ne!(a, b);
    }

    #[test]
    fn constructor_differs_from_method() {
        let owner = TypeHash::from_name("Demo.Calc");
        let ctor = TypeHash::from_constructor(owner, &[primitives::INT32]);
        let method = TypeHash::from_method(owner, "", &[primitives::INT32]);
        assert_ne!(ctor, method);
    }

    #[test]
    fn generic_instance_argument_order_matters() {
        let map = TypeHash::from_name("Demo.Map");
        let a = TypeHash::from_generic_instance(map, &[primitives::STRING, primitives::INT32]);
        let b = TypeHash::from_generic_instance(map, &[primitives::INT32, primitives::STRING]);
        assert_ne!(a, b);
        assert_ne!(a, map);
    }

    #[test]
    fn empty_hash() {
        assert!(TypeHash::EMPTY.is_empty());
        assert!(!primitives::OBJECT.is_empty());
    }
}
