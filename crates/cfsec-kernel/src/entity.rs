//! Revisioned records.
//!
//! An entity is a struct with an identity key, an audit stamp, a revision
//! counter, foreign keys and scalar attributes. [`Entity`] is the generic
//! surface the comparator, storage and controller work through;
//! [`define_entity!`](crate::define_entity) generates the struct, its typed
//! accessors and the trait impl from a field table.

use std::fmt::Debug;

use cfsec_types::{AuditStamp, IdentityKey, Revision};

use crate::compare::{self, Shape};
use crate::error::{KernelError, Result};
use crate::field::{FieldDef, IndexDef};
use crate::history::History;
use crate::value::Value;

/// A revisioned record type.
pub trait Entity: Clone + Debug + Default + Send + Sync + 'static {
    /// Entity name used in errors, logs and foreign-key references.
    const NAME: &'static str;
    /// Foreign keys then scalar attributes, in declaration order.
    const FIELDS: &'static [FieldDef];
    const INDEXES: &'static [IndexDef];

    fn pkey(&self) -> IdentityKey;

    /// Writes the identity key without the immutability check.
    #[doc(hidden)]
    fn replace_pkey(&mut self, key: IdentityKey);

    fn audit(&self) -> &AuditStamp;
    fn set_audit(&mut self, audit: AuditStamp);

    fn revision(&self) -> Revision;
    fn set_revision(&mut self, revision: Revision);

    /// Foreign keys and scalar attributes as values, aligned with `FIELDS`.
    fn values(&self) -> Vec<Value>;

    /// Copies foreign keys and scalar attributes from `other`.
    ///
    /// Identity key, audit stamp and revision are left alone.
    fn assign_from(&mut self, other: &Self);

    /// Assigns the identity key. Once non-null it can only be re-set to the
    /// same value.
    fn set_pkey(&mut self, key: IdentityKey) -> Result<()> {
        let current = self.pkey();
        if !current.is_null() && current != key {
            return Err(KernelError::ImmutableKey {
                entity: Self::NAME,
                current,
            });
        }
        self.replace_pkey(key);
        Ok(())
    }

    /// Loads business fields from a history row.
    ///
    /// The identity key and every foreign key and scalar are copied. The
    /// live row's revision and audit stamp are kept.
    fn set_from_history(&mut self, history: &History<Self>) {
        self.replace_pkey(history.record().pkey());
        self.assign_from(history.record());
    }

    /// First required foreign key left null, in declaration order.
    fn first_missing_required(&self) -> Option<&'static FieldDef> {
        let values = self.values();
        Self::FIELDS
            .iter()
            .zip(values.iter())
            .find(|(def, value)| def.is_required_key() && value.is_null())
            .map(|(def, _)| def)
    }

    fn index_def(name: &str) -> Option<&'static IndexDef> {
        Self::INDEXES.iter().find(|index| index.name == name)
    }

    /// Equality against any supported shape. Unsupported shapes and `None`
    /// are never equal.
    fn shape_eq(&self, other: Option<Shape<'_, Self>>) -> bool {
        compare::record_eq(self, other)
    }

    /// Ordering against any supported shape. `None` orders before `self`.
    fn shape_cmp(&self, other: Option<Shape<'_, Self>>) -> Result<std::cmp::Ordering> {
        compare::record_cmp(self, other)
    }

    fn structural_hash(&self) -> u32 {
        compare::record_hash(self)
    }
}

/// A parent given either as a loaded object or as its key.
#[derive(Debug, Clone, Copy)]
pub enum ParentRef<'a, P> {
    Object(&'a P),
    Key(IdentityKey),
}

impl<'a, P> From<&'a P> for ParentRef<'a, P> {
    fn from(parent: &'a P) -> Self {
        ParentRef::Object(parent)
    }
}

impl<P> From<IdentityKey> for ParentRef<'_, P> {
    fn from(key: IdentityKey) -> Self {
        ParentRef::Key(key)
    }
}

// ============================================================================
// Entity generation
// ============================================================================

/// Declares an entity struct and its [`Entity`] impl.
///
/// ```ignore
/// define_entity! {
///     /// A host within a cluster.
///     pub struct HostNode("HostNode") {
///         keys {
///             required cluster_id: Cluster ["requiredClusterId"]
///                 => set_cluster_id, container_cluster, set_container_cluster;
///         }
///         scalars {
///             description: Text(255) ["requiredDescription"] => set_description;
///         }
///         indexes {
///             index "ClusterIdx" => ["cluster_id"];
///             unique "UDescrIdx" => ["cluster_id", "description"];
///         }
///     }
/// }
/// ```
///
/// Scalar kinds: `Text(max)`, `OptText(max)`, `SmallInt(min, max)`,
/// `Integer(min, max)`, `Boolean()`, `Timestamp()`, `OptTimestamp()`.
/// Keys are `required` (stored as `IdentityKey`, setter rejects null) or
/// `optional` (stored as `Option<IdentityKey>`).
#[macro_export]
macro_rules! define_entity {
    (
        $(#[$meta:meta])*
        pub struct $name:ident ($label:literal) {
            keys {
                $(
                    $kreq:ident $kfield:ident : $kparent:ident [$kattr:literal]
                        => $kset:ident, $kresolve:ident, $klink:ident;
                )*
            }
            scalars {
                $(
                    $sfield:ident : $skind:ident ( $($sarg:expr),* ) [$sattr:literal]
                        => $sset:ident;
                )*
            }
            indexes {
                $(
                    $ikind:ident $iname:literal => [ $($ifield:literal),* $(,)? ];
                )*
            }
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, ::serde::Serialize, ::serde::Deserialize)]
        pub struct $name {
            pkey: $crate::IdentityKey,
            audit: $crate::AuditStamp,
            revision: $crate::Revision,
            $( $kfield: $crate::__entity_key_type!($kreq), )*
            $( $sfield: $crate::__entity_scalar_type!($skind), )*
        }

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }
        }

        $(
            $crate::__entity_key_accessors!(
                $name, $kreq, $kfield, $kparent, $kattr, $kset, $kresolve, $klink
            );
        )*

        $(
            $crate::__entity_scalar_accessors!(
                $name, $skind, ($($sarg),*), $sfield, $sset
            );
        )*

        impl $crate::Entity for $name {
            const NAME: &'static str = $label;

            const FIELDS: &'static [$crate::FieldDef] = &[
                $( $crate::__entity_key_def!($kreq, $kfield, $kattr, $kparent), )*
                $( $crate::__entity_scalar_def!($skind, ($($sarg),*), $sfield, $sattr), )*
            ];

            const INDEXES: &'static [$crate::IndexDef] = &[
                $(
                    $crate::IndexDef::new(
                        $iname,
                        $crate::__entity_index_unique!($ikind),
                        &[ $($ifield),* ],
                    ),
                )*
            ];

            fn pkey(&self) -> $crate::IdentityKey {
                self.pkey
            }

            fn replace_pkey(&mut self, key: $crate::IdentityKey) {
                self.pkey = key;
            }

            fn audit(&self) -> &$crate::AuditStamp {
                &self.audit
            }

            fn set_audit(&mut self, audit: $crate::AuditStamp) {
                self.audit = audit;
            }

            fn revision(&self) -> $crate::Revision {
                self.revision
            }

            fn set_revision(&mut self, revision: $crate::Revision) {
                self.revision = revision;
            }

            fn values(&self) -> ::std::vec::Vec<$crate::Value> {
                ::std::vec![
                    $( $crate::__entity_key_value!($kreq, self.$kfield), )*
                    $( $crate::__entity_scalar_value!($skind, self.$sfield), )*
                ]
            }

            #[allow(clippy::clone_on_copy)]
            fn assign_from(&mut self, other: &Self) {
                $( self.$kfield = other.$kfield; )*
                $( self.$sfield = other.$sfield.clone(); )*
            }
        }

        impl ::std::cmp::PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                $crate::compare::compare_records(self, other).is_eq()
            }
        }

        impl ::std::cmp::Eq for $name {}

        impl ::std::cmp::PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> ::std::option::Option<::std::cmp::Ordering> {
                ::std::option::Option::Some(::std::cmp::Ord::cmp(self, other))
            }
        }

        impl ::std::cmp::Ord for $name {
            fn cmp(&self, other: &Self) -> ::std::cmp::Ordering {
                $crate::compare::compare_records(self, other)
            }
        }

        impl ::std::hash::Hash for $name {
            fn hash<H: ::std::hash::Hasher>(&self, state: &mut H) {
                state.write_u32($crate::compare::record_hash(self));
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __entity_index_unique {
    (unique) => {
        true
    };
    (index) => {
        false
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __entity_key_type {
    (required) => { $crate::IdentityKey };
    (optional) => { ::std::option::Option<$crate::IdentityKey> };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __entity_key_def {
    (required, $field:ident, $attr:literal, $parent:ident) => {
        $crate::FieldDef::key(stringify!($field), $attr, true, <$parent as $crate::Entity>::NAME)
    };
    (optional, $field:ident, $attr:literal, $parent:ident) => {
        $crate::FieldDef::key(stringify!($field), $attr, false, <$parent as $crate::Entity>::NAME)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __entity_key_value {
    (required, $value:expr) => {
        $crate::Value::key($value)
    };
    (optional, $value:expr) => {
        $crate::Value::opt_key($value)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __entity_key_accessors {
    (
        $name:ident, required, $field:ident, $parent:ident, $attr:literal,
        $set:ident, $resolve:ident, $link:ident
    ) => {
        impl $name {
            pub fn $field(&self) -> $crate::IdentityKey {
                self.$field
            }

            pub fn $set(
                &mut self,
                value: $crate::IdentityKey,
            ) -> ::std::result::Result<(), $crate::KernelError> {
                $crate::field::check_key(concat!(stringify!($name), "::", stringify!($set)), &value)?;
                self.$field = value;
                Ok(())
            }

            /// Resolves the referenced parent through the registry.
            pub fn $resolve(
                &self,
                registry: &$crate::Registry,
            ) -> ::std::result::Result<::std::option::Option<$parent>, $crate::KernelError> {
                registry.resolve::<$parent>(&self.$field)
            }

            /// Points this record at a parent object or a parent key.
            pub fn $link<'p>(
                &mut self,
                registry: &$crate::Registry,
                parent: impl ::std::convert::Into<$crate::ParentRef<'p, $parent>>,
            ) -> ::std::result::Result<(), $crate::KernelError> {
                let key = registry.link::<$parent>(
                    <Self as $crate::Entity>::NAME,
                    $attr,
                    parent.into(),
                )?;
                self.$set(key)
            }
        }
    };
    (
        $name:ident, optional, $field:ident, $parent:ident, $attr:literal,
        $set:ident, $resolve:ident, $link:ident
    ) => {
        impl $name {
            pub fn $field(&self) -> ::std::option::Option<$crate::IdentityKey> {
                self.$field
            }

            pub fn $set(&mut self, value: ::std::option::Option<$crate::IdentityKey>) {
                self.$field = value;
            }

            /// Resolves the referenced parent through the registry.
            pub fn $resolve(
                &self,
                registry: &$crate::Registry,
            ) -> ::std::result::Result<::std::option::Option<$parent>, $crate::KernelError> {
                match self.$field {
                    Some(key) => registry.resolve::<$parent>(&key),
                    None => Ok(None),
                }
            }

            /// Points this record at a parent object or key. A null key clears it.
            pub fn $link<'p>(
                &mut self,
                registry: &$crate::Registry,
                parent: impl ::std::convert::Into<$crate::ParentRef<'p, $parent>>,
            ) -> ::std::result::Result<(), $crate::KernelError> {
                let key = registry.link::<$parent>(
                    <Self as $crate::Entity>::NAME,
                    $attr,
                    parent.into(),
                )?;
                self.$field = key.non_null();
                Ok(())
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __entity_scalar_type {
    (Text) => { ::std::string::String };
    (OptText) => { ::std::option::Option<::std::string::String> };
    (SmallInt) => { i16 };
    (Integer) => { i32 };
    (Boolean) => { bool };
    (Timestamp) => { $crate::Timestamp };
    (OptTimestamp) => { ::std::option::Option<$crate::Timestamp> };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __entity_scalar_def {
    (Text, ($max:expr), $field:ident, $attr:literal) => {
        $crate::FieldDef::text(stringify!($field), $attr, true, $max)
    };
    (OptText, ($max:expr), $field:ident, $attr:literal) => {
        $crate::FieldDef::text(stringify!($field), $attr, false, $max)
    };
    (SmallInt, ($min:expr, $max:expr), $field:ident, $attr:literal) => {
        $crate::FieldDef::small_int(stringify!($field), $attr, $min, $max)
    };
    (Integer, ($min:expr, $max:expr), $field:ident, $attr:literal) => {
        $crate::FieldDef::integer(stringify!($field), $attr, $min, $max)
    };
    (Boolean, (), $field:ident, $attr:literal) => {
        $crate::FieldDef::boolean(stringify!($field), $attr)
    };
    (Timestamp, (), $field:ident, $attr:literal) => {
        $crate::FieldDef::timestamp(stringify!($field), $attr, true)
    };
    (OptTimestamp, (), $field:ident, $attr:literal) => {
        $crate::FieldDef::timestamp(stringify!($field), $attr, false)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __entity_scalar_value {
    (Text, $value:expr) => {
        $crate::Value::Text($value.clone())
    };
    (OptText, $value:expr) => {
        $crate::Value::opt_text($value.as_deref())
    };
    (SmallInt, $value:expr) => {
        $crate::Value::SmallInt($value)
    };
    (Integer, $value:expr) => {
        $crate::Value::Integer($value)
    };
    (Boolean, $value:expr) => {
        $crate::Value::Boolean($value)
    };
    (Timestamp, $value:expr) => {
        $crate::Value::Timestamp($value)
    };
    (OptTimestamp, $value:expr) => {
        $crate::Value::opt_timestamp($value)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __entity_scalar_accessors {
    ($name:ident, Text, ($max:expr), $field:ident, $set:ident) => {
        impl $name {
            pub fn $field(&self) -> &str {
                &self.$field
            }

            pub fn $set(
                &mut self,
                value: impl ::std::convert::Into<::std::string::String>,
            ) -> ::std::result::Result<(), $crate::KernelError> {
                let value = value.into();
                $crate::field::check_text(
                    concat!(stringify!($name), "::", stringify!($set)),
                    &value,
                    $max,
                )?;
                self.$field = value;
                Ok(())
            }
        }
    };
    ($name:ident, OptText, ($max:expr), $field:ident, $set:ident) => {
        impl $name {
            pub fn $field(&self) -> ::std::option::Option<&str> {
                self.$field.as_deref()
            }

            pub fn $set(
                &mut self,
                value: ::std::option::Option<::std::string::String>,
            ) -> ::std::result::Result<(), $crate::KernelError> {
                if let Some(text) = &value {
                    $crate::field::check_text(
                        concat!(stringify!($name), "::", stringify!($set)),
                        text,
                        $max,
                    )?;
                }
                self.$field = value;
                Ok(())
            }
        }
    };
    ($name:ident, SmallInt, ($min:expr, $max:expr), $field:ident, $set:ident) => {
        impl $name {
            pub fn $field(&self) -> i16 {
                self.$field
            }

            pub fn $set(&mut self, value: i16) -> ::std::result::Result<(), $crate::KernelError> {
                $crate::field::check_range(
                    concat!(stringify!($name), "::", stringify!($set)),
                    i64::from(value),
                    $min,
                    $max,
                )?;
                self.$field = value;
                Ok(())
            }
        }
    };
    ($name:ident, Integer, ($min:expr, $max:expr), $field:ident, $set:ident) => {
        impl $name {
            pub fn $field(&self) -> i32 {
                self.$field
            }

            pub fn $set(&mut self, value: i32) -> ::std::result::Result<(), $crate::KernelError> {
                $crate::field::check_range(
                    concat!(stringify!($name), "::", stringify!($set)),
                    i64::from(value),
                    $min,
                    $max,
                )?;
                self.$field = value;
                Ok(())
            }
        }
    };
    ($name:ident, Boolean, (), $field:ident, $set:ident) => {
        impl $name {
            pub fn $field(&self) -> bool {
                self.$field
            }

            pub fn $set(&mut self, value: bool) {
                self.$field = value;
            }
        }
    };
    ($name:ident, Timestamp, (), $field:ident, $set:ident) => {
        impl $name {
            pub fn $field(&self) -> $crate::Timestamp {
                self.$field
            }

            pub fn $set(&mut self, value: $crate::Timestamp) {
                self.$field = value;
            }
        }
    };
    ($name:ident, OptTimestamp, (), $field:ident, $set:ident) => {
        impl $name {
            pub fn $field(&self) -> ::std::option::Option<$crate::Timestamp> {
                self.$field
            }

            pub fn $set(&mut self, value: ::std::option::Option<$crate::Timestamp>) {
                self.$field = value;
            }
        }
    };
}
