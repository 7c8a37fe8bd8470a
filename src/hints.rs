//! Binding hints given from the foreign side as tables.
//!
//! Calling an object or static context with a single table attaches
//! member hints:
//!
//! ```text
//! obj{ SpecialName = true }.get_Item      -- accessor methods become visible
//! List{ Int32 }                           -- generic definition specialized
//! ```
//!
//! Calling a method group with a single table selects overloads by
//! parameter types, with optional method type arguments under `_`:
//!
//! ```text
//! obj.f{ 'Double', 'Int32' }(1, 2)
//! obj.Convert{ _ = { Int32 } }(x)
//! ```

use hostbridge_binder::{ParamHint, SignatureBindingHints};
use hostbridge_core::{BridgeError, HostType, HostValue};
use hostbridge_foreign::ForeignValue;
use hostbridge_registry::MemberBindingHints;

use crate::state::LockedState;
use crate::targets::{HintedTarget, StaticContext};

/// Entries of a hint table, split into the sequence `1..=n` and the rest.
struct HintTable {
    positional: Vec<ForeignValue>,
    named: Vec<(ForeignValue, ForeignValue)>,
}

fn unexpected_type_args() -> BridgeError {
    BridgeError::BindingHints("Binding-hints table has unexpected type arguments".to_string())
}

impl LockedState<'_> {
    fn hint_table(&self, table: &ForeignValue) -> Result<HintTable, BridgeError> {
        let foreign = self.foreign();
        let len = foreign.raw_len(table).map_err(|e| self.error_from_foreign(e))?;
        let pairs = foreign.pairs(table).map_err(|e| self.error_from_foreign(e))?;

        let mut positional = vec![ForeignValue::Nil; len];
        let mut named = Vec::new();
        for (key, value) in pairs {
            match key.as_number() {
                Some(n) if n.fract() == 0.0 && n >= 1.0 && n <= len as f64 => positional[n as usize - 1] = value,
                _ => named.push((key, value)),
            }
        }
        Ok(HintTable { positional, named })
    }

    fn unexpected_hint(&self, key: &ForeignValue, value: &ForeignValue) -> BridgeError {
        let describe = |v: &ForeignValue| match self.to_host(v) {
            Ok(host) => self.describe(&host),
            Err(_) => v.display_raw(),
        };
        BridgeError::BindingHints(format!(
            "Binding-hints table has unexpected hint '[{}, {}]'",
            describe(key),
            describe(value)
        ))
    }

    /// A type given as a hint: a static context, or a registered type name.
    fn hinted_type(&self, value: &ForeignValue) -> Option<HostType> {
        if let ForeignValue::String(bytes) = value {
            let name = self.config().encoding.decode(bytes);
            return self
                .registry()
                .get_by_name(&name)
                .map(|entry| HostType::Named(entry.type_hash));
        }
        let object = self.host_object(value).ok().flatten()?;
        StaticContext::type_of(&object)
    }

    /// Attach the member hints in `table` to `target`.
    ///
    /// Type arguments are only valid on the static context of a generic
    /// type definition, which they specialize.
    pub(crate) fn attach_member_hints(&self, target: &HostValue, table: &ForeignValue) -> Result<HostValue, BridgeError> {
        let HintTable { positional, named } = self.hint_table(table)?;

        let mut special_name = None;
        for (key, value) in &named {
            match (key.as_str(), value) {
                (Some("SpecialName"), ForeignValue::Boolean(flag)) => special_name = Some(*flag),
                _ => return Err(self.unexpected_hint(key, value)),
            }
        }

        let Some(mut object) = target.as_object().cloned() else {
            return Err(BridgeError::BindingHints(format!(
                "Binding hints cannot be attached to a value of type '{}'",
                self.registry().value_type_name(target)
            )));
        };
        match StaticContext::type_of(&object) {
            Some(ty) if self.registry().is_generic_definition(&ty) => {
                let type_args = positional
                    .iter()
                    .map(|value| self.hinted_type(value))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(unexpected_type_args)?;
                let constructed = self.registry().make_generic(&ty, &type_args)?;
                tracing::debug!(type_name = %self.registry().type_name(&constructed), "specialized generic type");
                object = StaticContext::new(constructed).into_object();
            }
            _ if !positional.is_empty() => return Err(unexpected_type_args()),
            _ => {}
        }

        let hints = MemberBindingHints::new().with_special_name(special_name);
        Ok(HostValue::Object(HintedTarget { target: object, hints }.into_object()))
    }

    /// Parse signature hints for a method group.
    pub(crate) fn signature_hints(&self, table: &ForeignValue) -> Result<SignatureBindingHints, BridgeError> {
        let HintTable { positional, named } = self.hint_table(table)?;

        let params = positional
            .iter()
            .map(|value| match value {
                ForeignValue::String(bytes) => Ok(ParamHint::Name(self.config().encoding.decode(bytes))),
                other => self.hinted_type(other).map(ParamHint::Type).ok_or_else(|| {
                    let type_name = match self.to_host(other) {
                        Ok(host) => self.registry().value_type_name(&host),
                        Err(_) => other.type_name().to_string(),
                    };
                    BridgeError::BindingHints(format!("Parameter hint of unexpected type '{type_name}'"))
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut type_args = None;
        for (key, value) in &named {
            if key.as_str() == Some("_")
                && let ForeignValue::Table(_) = value
            {
                let HintTable { positional, named: extra } = self.hint_table(value)?;
                let args = positional.iter().map(|v| self.hinted_type(v)).collect::<Option<Vec<_>>>();
                if let Some(args) = args
                    && extra.is_empty()
                {
                    type_args = Some(args);
                    continue;
                }
            }
            return Err(self.unexpected_hint(key, value));
        }

        Ok(SignatureBindingHints::new(params, type_args))
    }
}
