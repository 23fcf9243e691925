//! Index-key projections.
//!
//! An [`IndexKey`] holds exactly the values one index covers. It is used both
//! as a lookup argument and as a comparison shape that narrows equality to
//! the indexed fields.

use crate::entity::Entity;
use crate::error::{KernelError, Result};
use crate::field::IndexDef;
use crate::value::Value;

/// Values of one named index of one entity, in index field order.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexKey {
    entity: &'static str,
    index: &'static IndexDef,
    positions: Vec<usize>,
    values: Vec<Value>,
}

impl IndexKey {
    /// Builds a lookup key, checking arity and value kinds against the index.
    pub fn new<E: Entity>(index: &str, values: Vec<Value>) -> Result<Self> {
        let def = lookup::<E>(index)?;
        let positions = def.positions::<E>()?;

        if values.len() != positions.len() {
            return Err(KernelError::InvalidIndexKey {
                entity: E::NAME,
                index: def.name,
                reason: format!("expected {} values, got {}", positions.len(), values.len()),
            });
        }

        for (position, value) in positions.iter().zip(values.iter()) {
            let field = &E::FIELDS[*position];
            if let Some(kind) = value.kind() {
                if kind != field.kind {
                    return Err(KernelError::InvalidIndexKey {
                        entity: E::NAME,
                        index: def.name,
                        reason: format!(
                            "field {} expects {:?}, got {:?}",
                            field.name, field.kind, kind
                        ),
                    });
                }
            }
        }

        Ok(Self {
            entity: E::NAME,
            index: def,
            positions,
            values,
        })
    }

    /// Projects a record onto one of its indexes.
    pub fn project<E: Entity>(record: &E, index: &str) -> Result<Self> {
        let def = lookup::<E>(index)?;
        let positions = def.positions::<E>()?;
        let all = record.values();
        let values = positions.iter().map(|p| all[*p].clone()).collect();

        Ok(Self {
            entity: E::NAME,
            index: def,
            positions,
            values,
        })
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn index(&self) -> &'static IndexDef {
        self.index
    }

    pub fn name(&self) -> &'static str {
        self.index.name
    }

    pub fn is_unique(&self) -> bool {
        self.index.unique
    }

    /// Positions of the indexed fields in the entity's field table.
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// True if any covered value is null. Unique constraints skip such keys.
    pub fn has_null(&self) -> bool {
        self.values.iter().any(Value::is_null)
    }

    /// True if this key belongs to entity `E`.
    pub fn is_for<E: Entity>(&self) -> bool {
        self.entity == E::NAME && E::index_def(self.index.name) == Some(self.index)
    }
}

fn lookup<E: Entity>(index: &str) -> Result<&'static IndexDef> {
    E::index_def(index).ok_or_else(|| KernelError::UnknownIndex {
        entity: E::NAME,
        index: index.to_string(),
    })
}
