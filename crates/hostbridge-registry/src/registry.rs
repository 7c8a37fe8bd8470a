//! The host type table.
//!
//! [`TypeRegistry`] owns every registered [`TypeEntry`]. Entries are keyed
//! by [`TypeHash`] with a secondary index by full name. Members of
//! constructed generic types are produced on demand by substituting the
//! definition's members and cached for later lookups.

use std::sync::Arc;

use hostbridge_core::{
    BridgeError, HostType, MemberEntry, MethodEntry, TypeEntry, TypeFlags, TypeHash, primitives,
};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::RegistrationError;

/// Registry of all host types visible to the bridge.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    // === Types ===
    /// All registered types by hash.
    types: FxHashMap<TypeHash, Arc<TypeEntry>>,
    /// Full type name to hash.
    type_by_name: FxHashMap<String, TypeHash>,

    // === Constructed Generics ===
    /// Substituted members of constructed generic types.
    constructed_members: RwLock<FxHashMap<HostType, Arc<[Arc<MemberEntry>]>>>,
    /// Substituted constructors of constructed generic types.
    constructed_constructors: RwLock<FxHashMap<HostType, Arc<[Arc<MethodEntry>]>>>,
}

impl TypeRegistry {
    /// Create an empty registry.
    ///
    /// Most callers want [`TypeRegistry::with_builtins`] instead.
    pub fn new() -> Self {
        Self::default()
    }

    // ==========================================================================
    // Registration
    // ==========================================================================

    /// Register a type entry.
    ///
    /// Fails if a type with the same name exists or the declared base is an
    /// interface or a sealed type.
    pub fn register(&mut self, entry: TypeEntry) -> Result<TypeHash, RegistrationError> {
        if self.types.contains_key(&entry.type_hash) {
            return Err(RegistrationError::DuplicateType(entry.full_name));
        }

        if let Some(base) = entry.base.as_ref().and_then(|base| self.entry_of(base)) {
            let reason = if base.is_interface() {
                Some("base type is an interface")
            } else if base.flags.contains(TypeFlags::SEALED) {
                Some("base type is sealed")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(RegistrationError::InvalidBase {
                    name: entry.full_name,
                    reason: reason.to_string(),
                });
            }
        }

        let hash = entry.type_hash;
        tracing::debug!(
            type_name = %entry.full_name,
            members = entry.members.len(),
            constructors = entry.constructors.len(),
            "registered host type"
        );
        self.type_by_name.insert(entry.full_name.clone(), hash);
        self.types.insert(hash, Arc::new(entry));
        Ok(hash)
    }

    // ==========================================================================
    // Lookup
    // ==========================================================================

    /// Get a type by its hash.
    pub fn get(&self, hash: TypeHash) -> Option<&Arc<TypeEntry>> {
        self.types.get(&hash)
    }

    /// Get a type by its full name.
    pub fn get_by_name(&self, name: &str) -> Option<&Arc<TypeEntry>> {
        self.type_by_name.get(name).and_then(|hash| self.types.get(hash))
    }

    /// Check if a type is registered.
    pub fn contains(&self, hash: TypeHash) -> bool {
        self.types.contains_key(&hash)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterate over all registered types.
    pub fn types(&self) -> impl Iterator<Item = &Arc<TypeEntry>> {
        self.types.values()
    }

    /// The entry describing `ty`.
    ///
    /// Constructed generics resolve to their definition, arrays to `Array`
    /// and nullables to their underlying type. Generic parameters have no
    /// entry.
    pub fn entry_of(&self, ty: &HostType) -> Option<&Arc<TypeEntry>> {
        match ty {
            HostType::Named(hash) => self.get(*hash),
            HostType::Generic { definition, .. } => self.get(*definition),
            HostType::Array { .. } => self.get(primitives::ARRAY),
            HostType::Nullable(inner) => self.entry_of(inner),
            HostType::TypeParam(_) | HostType::MethodParam(_) => None,
        }
    }

    /// Members declared directly on `ty`.
    ///
    /// For a constructed generic type the definition's members are returned
    /// with the type arguments substituted.
    pub fn declared_members(&self, ty: &HostType) -> Arc<[Arc<MemberEntry>]> {
        let Some(entry) = self.entry_of(ty) else {
            return Arc::from([]);
        };
        let HostType::Generic { args, .. } = ty else {
            return Arc::from(entry.members.as_slice());
        };

        if let Some(members) = self.constructed_members.read().get(ty) {
            return Arc::clone(members);
        }

        let members: Arc<[Arc<MemberEntry>]> = entry
            .members
            .iter()
            .map(|member| Arc::new(member.substitute_type_params(ty, args)))
            .collect();
        self.constructed_members
            .write()
            .entry(ty.clone())
            .or_insert(members)
            .clone()
    }

    /// Constructors of `ty`, substituted for constructed generics.
    pub fn constructors_of(&self, ty: &HostType) -> Arc<[Arc<MethodEntry>]> {
        let Some(entry) = self.entry_of(ty) else {
            return Arc::from([]);
        };
        let HostType::Generic { args, .. } = ty else {
            return Arc::from(entry.constructors.as_slice());
        };

        if let Some(constructors) = self.constructed_constructors.read().get(ty) {
            return Arc::clone(constructors);
        }

        let constructors: Arc<[Arc<MethodEntry>]> = entry
            .constructors
            .iter()
            .map(|ctor| {
                let mut ctor = ctor.substitute_type_params(ty, args);
                ctor.return_type = ty.clone();
                Arc::new(ctor)
            })
            .collect();
        self.constructed_constructors
            .write()
            .entry(ty.clone())
            .or_insert(constructors)
            .clone()
    }

    /// Apply the generic type definition `definition` to `args`.
    pub fn make_generic(&self, definition: &HostType, args: &[HostType]) -> Result<HostType, BridgeError> {
        let unexpected =
            || BridgeError::BindingHints("Binding-hints table has unexpected type arguments".to_string());
        let HostType::Named(hash) = definition else {
            return Err(unexpected());
        };
        let entry = self.get(*hash).ok_or_else(unexpected)?;
        if !entry.is_generic_definition() || entry.generic_params.len() != args.len() {
            return Err(unexpected());
        }
        Ok(HostType::generic(*hash, args.to_vec()))
    }
}
