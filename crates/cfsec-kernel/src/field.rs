//! Field and index tables.
//!
//! Every entity publishes a static table of its foreign keys and scalar
//! attributes in declaration order, plus a table of its indexes. The
//! comparator, index projections, required-field checks and the controller
//! are all driven from these tables.

use cfsec_types::IdentityKey;

use crate::entity::Entity;
use crate::error::{KernelError, Result};

// ============================================================================
// Field definitions
// ============================================================================

/// Kind of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Key,
    Text,
    SmallInt,
    Integer,
    Boolean,
    Timestamp,
}

/// Declared bounds of a scalar attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bounds {
    Unbounded,
    /// Maximum length in characters.
    MaxLen(usize),
    /// Inclusive numeric range.
    Range { min: i64, max: i64 },
}

/// One foreign key or scalar attribute of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Rust field name, e.g. `sec_group_id`.
    pub name: &'static str,
    /// External attribute name, e.g. `requiredSecGroupId`.
    pub attr: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub bounds: Bounds,
    /// Entity name referenced by a foreign key.
    pub references: Option<&'static str>,
}

impl FieldDef {
    pub const fn key(
        name: &'static str,
        attr: &'static str,
        required: bool,
        references: &'static str,
    ) -> Self {
        Self {
            name,
            attr,
            kind: FieldKind::Key,
            required,
            bounds: Bounds::Unbounded,
            references: Some(references),
        }
    }

    pub const fn text(
        name: &'static str,
        attr: &'static str,
        required: bool,
        max_len: usize,
    ) -> Self {
        Self {
            name,
            attr,
            kind: FieldKind::Text,
            required,
            bounds: Bounds::MaxLen(max_len),
            references: None,
        }
    }

    pub const fn small_int(name: &'static str, attr: &'static str, min: i64, max: i64) -> Self {
        Self {
            name,
            attr,
            kind: FieldKind::SmallInt,
            required: true,
            bounds: Bounds::Range { min, max },
            references: None,
        }
    }

    pub const fn integer(name: &'static str, attr: &'static str, min: i64, max: i64) -> Self {
        Self {
            name,
            attr,
            kind: FieldKind::Integer,
            required: true,
            bounds: Bounds::Range { min, max },
            references: None,
        }
    }

    pub const fn boolean(name: &'static str, attr: &'static str) -> Self {
        Self {
            name,
            attr,
            kind: FieldKind::Boolean,
            required: true,
            bounds: Bounds::Unbounded,
            references: None,
        }
    }

    pub const fn timestamp(name: &'static str, attr: &'static str, required: bool) -> Self {
        Self {
            name,
            attr,
            kind: FieldKind::Timestamp,
            required,
            bounds: Bounds::Unbounded,
            references: None,
        }
    }

    /// True for foreign keys that must be set before create/update.
    pub fn is_required_key(&self) -> bool {
        self.kind == FieldKind::Key && self.required
    }
}

// ============================================================================
// Index definitions
// ============================================================================

/// A named index over an ordered list of fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDef {
    pub name: &'static str,
    pub unique: bool,
    pub fields: &'static [&'static str],
}

impl IndexDef {
    pub const fn new(name: &'static str, unique: bool, fields: &'static [&'static str]) -> Self {
        Self {
            name,
            unique,
            fields,
        }
    }

    /// Resolves the index fields to positions in `E::FIELDS`.
    pub fn positions<E: Entity>(&self) -> Result<Vec<usize>> {
        self.fields
            .iter()
            .map(|field| {
                E::FIELDS
                    .iter()
                    .position(|def| def.name == *field)
                    .ok_or_else(|| KernelError::InvalidIndexKey {
                        entity: E::NAME,
                        index: self.name,
                        reason: format!("field {field} is not declared"),
                    })
            })
            .collect()
    }
}

// ============================================================================
// Setter validation
// ============================================================================

/// Rejects the null key sentinel.
pub fn check_key(method: &'static str, value: &IdentityKey) -> Result<()> {
    if value.is_null() {
        return Err(KernelError::NullArgument {
            method,
            argument: "value",
        });
    }
    Ok(())
}

/// Rejects text longer than `max_len` characters.
pub fn check_text(method: &'static str, value: &str, max_len: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max_len {
        return Err(KernelError::ArgumentOverflow {
            method,
            argument: "value.length()",
            actual: i64::try_from(len).unwrap_or(i64::MAX),
            max: i64::try_from(max_len).unwrap_or(i64::MAX),
        });
    }
    Ok(())
}

/// Rejects numbers outside `min..=max`.
pub fn check_range(method: &'static str, value: i64, min: i64, max: i64) -> Result<()> {
    if value < min {
        return Err(KernelError::ArgumentUnderflow {
            method,
            argument: "value",
            actual: value,
            min,
        });
    }
    if value > max {
        return Err(KernelError::ArgumentOverflow {
            method,
            argument: "value",
            actual: value,
            max,
        });
    }
    Ok(())
}
