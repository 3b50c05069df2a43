//! Static description of entity types, their fields and the typed edges between them.
//!
//! A [`SchemaRegistry`] is assembled once through a [`RegistryBuilder`] and is
//! immutable afterwards. It is passed around explicitly (usually as
//! `Arc<SchemaRegistry>`), so independent registries can live side by side.

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

use crate::{
    entity::{FieldKind, Value},
    errors::{EntGraphError, Result},
};

/// Value check applied on create and update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Validator {
    /// Numeric value strictly greater than zero.
    Positive,
    /// Text value that is not blank.
    NotEmpty,
    /// Text value of at most `n` characters.
    MaxLen(usize),
    /// Integer value inside `min..=max`.
    Range { min: i64, max: i64 },
}

impl Validator {
    fn check(&self, field: &str, value: &Value) -> Result<()> {
        let ok = match (self, value) {
            (Validator::Positive, Value::Int(v)) => *v > 0,
            (Validator::Positive, Value::Float(v)) => *v > 0.0,
            (Validator::NotEmpty, Value::Text(v)) => !v.trim().is_empty(),
            (Validator::MaxLen(n), Value::Text(v)) => v.chars().count() <= *n,
            (Validator::Range { min, max }, Value::Int(v)) => (*min..=*max).contains(v),
            _ => true,
        };
        if ok {
            Ok(())
        } else {
            Err(EntGraphError::constraint(format!(
                "field {field} failed {self:?} with value {value}"
            )))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub optional: bool,
    pub default: Option<Value>,
    pub validators: Vec<Validator>,
}

impl FieldDef {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            optional: false,
            default: None,
            validators: Vec::new(),
        }
    }

    pub fn int(name: &str) -> Self {
        Self::new(name, FieldKind::Int)
    }

    pub fn float(name: &str) -> Self {
        Self::new(name, FieldKind::Float)
    }

    pub fn text(name: &str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn bool(name: &str) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    pub fn time(name: &str) -> Self {
        Self::new(name, FieldKind::Time)
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn positive(self) -> Self {
        self.validate(Validator::Positive)
    }

    pub fn not_empty(self) -> Self {
        self.validate(Validator::NotEmpty)
    }

    pub fn max_len(self, n: usize) -> Self {
        self.validate(Validator::MaxLen(n))
    }

    pub fn range(self, min: i64, max: i64) -> Self {
        self.validate(Validator::Range { min, max })
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Checks kind and validators of a caller-supplied value.
    pub fn check(&self, value: &Value) -> Result<()> {
        if value.kind() != self.kind {
            return Err(EntGraphError::constraint(format!(
                "field {} expects {}, got {}",
                self.name,
                self.kind,
                value.kind()
            )));
        }
        for validator in &self.validators {
            validator.check(&self.name, value)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    One,
    Many,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeDirection {
    /// The edge owns its membership rows.
    Owning,
    /// Back-reference to the owning edge `reference` declared on the target type.
    Inverse { reference: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDef {
    pub name: String,
    pub target: String,
    pub cardinality: Cardinality,
    pub direction: EdgeDirection,
    pub required: bool,
}

impl EdgeDef {
    /// Owning edge towards `target`.
    pub fn to(name: &str, target: &str) -> Self {
        Self {
            name: name.to_string(),
            target: target.to_string(),
            cardinality: Cardinality::Many,
            direction: EdgeDirection::Owning,
            required: false,
        }
    }

    /// Inverse of the owning edge `reference` declared on `target`.
    pub fn from(name: &str, target: &str, reference: &str) -> Self {
        Self {
            name: name.to_string(),
            target: target.to_string(),
            cardinality: Cardinality::Many,
            direction: EdgeDirection::Inverse {
                reference: reference.to_string(),
            },
            required: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.cardinality = Cardinality::One;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn is_owning(&self) -> bool {
        matches!(self.direction, EdgeDirection::Owning)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub edges: Vec<EdgeDef>,
}

impl EntityType {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn edge(mut self, edge: EdgeDef) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn edge_def(&self, name: &str) -> Option<&EdgeDef> {
        self.edges.iter().find(|e| e.name == name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraversalDirection {
    /// Follow stored rows from `from_id` to `to_id`.
    Outgoing,
    /// Follow stored rows from `to_id` back to `from_id`.
    Incoming,
}

/// Storage-level description of one owning edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwningEdge {
    /// Storage key, `"{SourceType}.{edge}"`.
    pub key: String,
    pub source_type: String,
    pub target_type: String,
    /// Max rows per source id.
    pub from_cardinality: Cardinality,
    /// Max rows per target id; `One` only when a unique inverse is declared.
    pub to_cardinality: Cardinality,
}

/// An edge as seen from one entity type, resolved to its storage key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdgeRef {
    pub source_type: String,
    pub name: String,
    pub target_type: String,
    pub key: String,
    pub direction: TraversalDirection,
    pub required: bool,
}

impl EdgeRef {
    /// Orients a `(self, other)` pair as a stored `(from_id, to_id)` row.
    pub fn stored_pair(&self, this: i64, other: i64) -> (i64, i64) {
        match self.direction {
            TraversalDirection::Outgoing => (this, other),
            TraversalDirection::Incoming => (other, this),
        }
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    types: Vec<EntityType>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entity_type: EntityType) -> Result<&mut Self> {
        if entity_type.name.trim().is_empty() {
            return Err(EntGraphError::invalid_schema("entity type name must be set"));
        }
        if self.types.iter().any(|t| t.name == entity_type.name) {
            return Err(EntGraphError::duplicate_type(entity_type.name));
        }
        self.types.push(entity_type);
        Ok(self)
    }

    pub fn build(self) -> Result<SchemaRegistry> {
        let mut index = AHashMap::with_capacity(self.types.len());
        for (pos, ty) in self.types.iter().enumerate() {
            index.insert(ty.name.clone(), pos);
        }
        let lookup = |name: &str| -> Result<&EntityType> {
            index
                .get(name)
                .map(|pos| &self.types[*pos])
                .ok_or_else(|| EntGraphError::unknown_type(name.to_string()))
        };

        for ty in &self.types {
            validate_members(ty)?;
            for edge in &ty.edges {
                let target = lookup(&edge.target)?;
                if let EdgeDirection::Inverse { reference } = &edge.direction {
                    let owning = target.edge_def(reference).ok_or_else(|| {
                        EntGraphError::unknown_edge(format!("{}.{reference}", target.name))
                    })?;
                    if !owning.is_owning() || owning.target != ty.name {
                        return Err(EntGraphError::invalid_schema(format!(
                            "{}.{} must reference an owning edge of {} pointing at {}",
                            ty.name, edge.name, target.name, ty.name
                        )));
                    }
                }
            }
        }

        let mut owning = Vec::new();
        let mut owning_index = AHashMap::new();
        for ty in &self.types {
            for edge in ty.edges.iter().filter(|e| e.is_owning()) {
                let inverses: Vec<&EdgeDef> = lookup(&edge.target)?
                    .edges
                    .iter()
                    .filter(|e| {
                        e.target == ty.name
                            && matches!(&e.direction, EdgeDirection::Inverse { reference } if *reference == edge.name)
                    })
                    .collect();
                if inverses.len() > 1 {
                    return Err(EntGraphError::invalid_schema(format!(
                        "{}.{} is referenced by more than one inverse edge",
                        ty.name, edge.name
                    )));
                }
                let key = format!("{}.{}", ty.name, edge.name);
                owning_index.insert(key.clone(), owning.len());
                owning.push(OwningEdge {
                    key,
                    source_type: ty.name.clone(),
                    target_type: edge.target.clone(),
                    from_cardinality: edge.cardinality,
                    to_cardinality: inverses
                        .first()
                        .map(|inv| inv.cardinality)
                        .unwrap_or(Cardinality::Many),
                });
            }
        }

        Ok(SchemaRegistry {
            types: self.types,
            index,
            owning,
            owning_index,
        })
    }
}

fn validate_members(ty: &EntityType) -> Result<()> {
    let mut names = AHashSet::new();
    for field in &ty.fields {
        if field.name.trim().is_empty() || field.name == "id" {
            return Err(EntGraphError::invalid_schema(format!(
                "{}: invalid field name {:?}",
                ty.name, field.name
            )));
        }
        if !names.insert(field.name.as_str()) {
            return Err(EntGraphError::invalid_schema(format!(
                "{}: duplicate member {}",
                ty.name, field.name
            )));
        }
        if let Some(default) = &field.default {
            field.check(default).map_err(|e| {
                EntGraphError::invalid_schema(format!("{}: bad default: {e}", ty.name))
            })?;
        }
    }
    for edge in &ty.edges {
        if edge.name.trim().is_empty() || !names.insert(edge.name.as_str()) {
            return Err(EntGraphError::invalid_schema(format!(
                "{}: invalid or duplicate edge {:?}",
                ty.name, edge.name
            )));
        }
    }
    Ok(())
}

/// Immutable set of registered entity types.
#[derive(Debug)]
pub struct SchemaRegistry {
    types: Vec<EntityType>,
    index: AHashMap<String, usize>,
    owning: Vec<OwningEdge>,
    owning_index: AHashMap<String, usize>,
}

impl SchemaRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn describe(&self, name: &str) -> Result<&EntityType> {
        self.index
            .get(name)
            .map(|pos| &self.types[*pos])
            .ok_or_else(|| EntGraphError::unknown_type(name.to_string()))
    }

    /// Registered types in registration order.
    pub fn entity_types(&self) -> impl Iterator<Item = &EntityType> {
        self.types.iter()
    }

    pub fn owning_edges(&self) -> &[OwningEdge] {
        &self.owning
    }

    pub fn owning_edge(&self, key: &str) -> Option<&OwningEdge> {
        self.owning_index.get(key).map(|pos| &self.owning[*pos])
    }

    /// The same stored edge as declared on its target type, if it is.
    pub fn counterpart(&self, edge: &EdgeRef) -> Option<EdgeRef> {
        let target = self.describe(&edge.target_type).ok()?;
        target
            .edges
            .iter()
            .filter_map(|def| self.edge(&target.name, &def.name).ok())
            .find(|other| other.key == edge.key && other.direction != edge.direction)
    }

    /// Resolves `edge` declared on `entity_type` to its storage key and direction.
    pub fn edge(&self, entity_type: &str, edge: &str) -> Result<EdgeRef> {
        let ty = self.describe(entity_type)?;
        let def = ty
            .edge_def(edge)
            .ok_or_else(|| EntGraphError::unknown_edge(format!("{entity_type}.{edge}")))?;
        let (key, direction) = match &def.direction {
            EdgeDirection::Owning => (
                format!("{entity_type}.{edge}"),
                TraversalDirection::Outgoing,
            ),
            EdgeDirection::Inverse { reference } => (
                format!("{}.{reference}", def.target),
                TraversalDirection::Incoming,
            ),
        };
        Ok(EdgeRef {
            source_type: entity_type.to_string(),
            name: def.name.clone(),
            target_type: def.target.clone(),
            key,
            direction,
            required: def.required,
        })
    }
}
