//! Atomic create, update and delete of entities and their edge memberships.
//!
//! Each public operation validates its input against the registry first,
//! then applies every row and edge change inside one store transaction.
//! A failure at any point rolls the whole operation back.

use crate::{
    entity::{Entity, FieldValues, Value},
    errors::{EntGraphError, Result},
    predicate::Predicate,
    query::{self, EntityQuery},
    registry::{Cardinality, EdgeRef, EntityType, FieldDef, TraversalDirection},
    store::{EntityStore, Session},
};

/// Related ids to attach over one edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdgeAssignment {
    pub edge: String,
    pub targets: Vec<i64>,
}

impl EdgeAssignment {
    pub fn new(edge: &str, targets: impl IntoIterator<Item = i64>) -> Self {
        Self {
            edge: edge.to_string(),
            targets: targets.into_iter().collect(),
        }
    }
}

/// Changes applied by [`MutationExecutor::update`], in the order
/// `clear_edges`, `remove`, `add` for edges.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateSpec {
    pub set: FieldValues,
    pub clear: Vec<String>,
    pub add: Vec<EdgeAssignment>,
    pub remove: Vec<EdgeAssignment>,
    pub clear_edges: Vec<String>,
}

pub struct MutationExecutor<'s> {
    store: &'s EntityStore,
}

impl<'s> MutationExecutor<'s> {
    pub fn new(store: &'s EntityStore) -> Self {
        Self { store }
    }

    /// Inserts one entity and all of its edge memberships atomically.
    pub fn create(
        &self,
        entity_type: &str,
        fields: FieldValues,
        edges: Vec<EdgeAssignment>,
    ) -> Result<Entity> {
        let registry = self.store.registry();
        let ty = registry.describe(entity_type)?;
        let fields = complete_fields(ty, fields)?;
        let resolved = resolve_assignments(self.store, entity_type, &edges)?;
        for def in ty.edges.iter().filter(|e| e.required) {
            let assigned = resolved
                .iter()
                .any(|(edge, targets)| edge.name == def.name && !targets.is_empty());
            if !assigned {
                return Err(EntGraphError::constraint(format!(
                    "{entity_type}.{} is required",
                    def.name
                )));
            }
        }

        let id = self.store.with_transaction(|session| {
            let id = session.insert_row(entity_type, &fields)?;
            for (edge, targets) in &resolved {
                for target in targets {
                    link(session, edge, id, *target)?;
                }
            }
            Ok(id)
        })?;

        tracing::info!(
            target: "entgraph",
            entity_type,
            id,
            edges = edges.iter().map(|a| a.targets.len()).sum::<usize>(),
            "entity created"
        );
        Ok(Entity {
            id,
            entity_type: entity_type.to_string(),
            fields,
            edges: Default::default(),
        })
    }

    /// Applies `spec` to one existing entity atomically.
    pub fn update(&self, entity_type: &str, id: i64, spec: UpdateSpec) -> Result<Entity> {
        let registry = self.store.registry();
        let ty = registry.describe(entity_type)?;
        for (name, value) in &spec.set {
            field_def(ty, name)?.check(value)?;
        }
        for name in &spec.clear {
            let def = field_def(ty, name)?;
            if !def.optional {
                return Err(EntGraphError::constraint(format!(
                    "{entity_type}.{name} is required and cannot be cleared"
                )));
            }
        }
        let cleared = spec
            .clear_edges
            .iter()
            .map(|name| registry.edge(entity_type, name))
            .collect::<Result<Vec<_>>>()?;
        let removed = resolve_assignments(self.store, entity_type, &spec.remove)?;
        let added = resolve_assignments(self.store, entity_type, &spec.add)?;

        let entity = self.store.with_transaction(|session| {
            let mut entity = session.load(entity_type, id)?;
            for name in &spec.clear {
                entity.fields.remove(name);
            }
            for (name, value) in &spec.set {
                entity.fields.insert(name.clone(), value.clone());
            }
            session.update_row(id, &entity.fields)?;

            let mut detached = Vec::new();
            for edge in &cleared {
                let partners = session.neighbors(&edge.key, edge.direction, id)?;
                session.clear_edge(&edge.key, edge.direction, id)?;
                detached.push((edge, partners));
            }
            for (edge, targets) in &removed {
                for target in targets {
                    let (from, to) = edge.stored_pair(id, *target);
                    session.delete_edge(&edge.key, from, to)?;
                }
                detached.push((edge, targets.clone()));
            }
            for (edge, targets) in &added {
                for target in targets {
                    link(session, edge, id, *target)?;
                }
            }
            for (edge, partners) in &detached {
                ensure_counterparts_linked(session, edge, partners)?;
            }
            for def in ty.edges.iter().filter(|e| e.required) {
                let edge = session.registry().edge(entity_type, &def.name)?;
                if session.neighbors(&edge.key, edge.direction, id)?.is_empty() {
                    return Err(EntGraphError::constraint(format!(
                        "{entity_type}.{} is required",
                        def.name
                    )));
                }
            }
            Ok(entity)
        })?;

        tracing::info!(target: "entgraph", entity_type, id, "entity updated");
        Ok(entity)
    }

    /// Deletes one entity and every edge membership referencing it.
    pub fn delete(&self, entity_type: &str, id: i64) -> Result<()> {
        self.store.registry().describe(entity_type)?;
        let edges_removed = self.store.with_transaction(|session| {
            session.load(entity_type, id)?;
            remove_entity(session, id)
        })?;
        tracing::info!(target: "entgraph", entity_type, id, edges_removed, "entity deleted");
        Ok(())
    }

    /// Deletes every entity selected by `query` in one transaction and
    /// returns how many rows were removed.
    pub fn delete_where(&self, query: &EntityQuery<'_>) -> Result<usize> {
        let entity_type = query.entity_type().to_string();
        query.plan().validate(self.store.registry())?;
        let removed = self.store.with_transaction(|session| {
            let ids = query::resolve_ids(session, query.plan(), query.token())?;
            let mut removed = Vec::with_capacity(ids.len());
            for id in ids {
                let edges = remove_entity(session, id)?;
                removed.push((id, edges));
            }
            Ok(removed)
        })?;
        for (id, edges_removed) in &removed {
            tracing::info!(
                target: "entgraph",
                entity_type = %entity_type,
                id,
                edges_removed,
                "entity deleted"
            );
        }
        Ok(removed.len())
    }
}

/// Deletes the row and its memberships; returns the number of edge rows removed.
fn remove_entity(session: &Session<'_>, id: i64) -> Result<usize> {
    let edges = session.delete_edges_of(id)?;
    if !session.delete_row(id)? {
        return Err(EntGraphError::not_found(format!("entity {id}")));
    }
    Ok(edges)
}

/// Adds the membership `this -edge-> other`, enforcing target type and
/// cardinality on both sides. Re-adding an existing membership is a no-op.
fn link(session: &Session<'_>, edge: &EdgeRef, this: i64, other: i64) -> Result<()> {
    match session.type_of(other)? {
        None => {
            return Err(EntGraphError::not_found(format!(
                "{} target {other}",
                edge.name
            )));
        }
        Some(ty) if ty != edge.target_type => {
            return Err(EntGraphError::constraint(format!(
                "{}.{} expects {}, entity {other} is {ty}",
                edge.source_type, edge.name, edge.target_type
            )));
        }
        Some(_) => {}
    }
    let owning = session
        .registry()
        .owning_edge(&edge.key)
        .ok_or_else(|| EntGraphError::unknown_edge(edge.key.clone()))?;
    let (from, to) = edge.stored_pair(this, other);
    if owning.from_cardinality == Cardinality::One {
        ensure_vacant(session, &edge.key, TraversalDirection::Outgoing, from, to)?;
    }
    if owning.to_cardinality == Cardinality::One {
        ensure_vacant(session, &edge.key, TraversalDirection::Incoming, to, from)?;
    }
    session.insert_edge(&edge.key, from, to)?;
    Ok(())
}

/// Fails if detaching `partners` over `edge` left any of them without a
/// membership their own side declares as required.
fn ensure_counterparts_linked(
    session: &Session<'_>,
    edge: &EdgeRef,
    partners: &[i64],
) -> Result<()> {
    let Some(other) = session.registry().counterpart(edge) else {
        return Ok(());
    };
    if !other.required {
        return Ok(());
    }
    for partner in partners {
        if session.type_of(*partner)?.as_deref() != Some(other.source_type.as_str()) {
            continue;
        }
        if session.neighbors(&other.key, other.direction, *partner)?.is_empty() {
            return Err(EntGraphError::constraint(format!(
                "{}.{} of entity {partner} is required",
                other.source_type, other.name
            )));
        }
    }
    Ok(())
}

fn ensure_vacant(
    session: &Session<'_>,
    key: &str,
    direction: TraversalDirection,
    id: i64,
    partner: i64,
) -> Result<()> {
    let existing = session.neighbors(key, direction, id)?;
    if existing.iter().any(|other| *other != partner) {
        return Err(EntGraphError::constraint(format!(
            "{key}: entity {id} is already connected to {existing:?}"
        )));
    }
    Ok(())
}

fn resolve_assignments(
    store: &EntityStore,
    entity_type: &str,
    assignments: &[EdgeAssignment],
) -> Result<Vec<(EdgeRef, Vec<i64>)>> {
    assignments
        .iter()
        .map(|assignment| {
            let edge = store.registry().edge(entity_type, &assignment.edge)?;
            Ok((edge, assignment.targets.clone()))
        })
        .collect()
}

fn field_def<'t>(ty: &'t EntityType, name: &str) -> Result<&'t FieldDef> {
    ty.field_def(name)
        .ok_or_else(|| EntGraphError::constraint(format!("{} has no field {name}", ty.name)))
}

/// Checks caller values and fills defaults for unset fields.
fn complete_fields(ty: &EntityType, mut fields: FieldValues) -> Result<FieldValues> {
    for (name, value) in &fields {
        field_def(ty, name)?.check(value)?;
    }
    for def in &ty.fields {
        if fields.contains_key(&def.name) {
            continue;
        }
        match &def.default {
            Some(default) => {
                fields.insert(def.name.clone(), default.clone());
            }
            None if def.optional => {}
            None => {
                return Err(EntGraphError::constraint(format!(
                    "{}.{} is required",
                    ty.name, def.name
                )));
            }
        }
    }
    Ok(fields)
}

/// Fluent form of [`MutationExecutor::create`].
pub struct CreateBuilder<'s> {
    store: &'s EntityStore,
    entity_type: String,
    fields: FieldValues,
    edges: Vec<EdgeAssignment>,
}

impl<'s> CreateBuilder<'s> {
    pub fn new(store: &'s EntityStore, entity_type: &str) -> Self {
        Self {
            store,
            entity_type: entity_type.to_string(),
            fields: FieldValues::new(),
            edges: Vec::new(),
        }
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn add_edge(mut self, edge: &str, targets: impl IntoIterator<Item = i64>) -> Self {
        self.edges.push(EdgeAssignment::new(edge, targets));
        self
    }

    /// Attaches the given entities over `edge`.
    pub fn add_entities(self, edge: &str, targets: &[&Entity]) -> Self {
        let ids: Vec<i64> = targets.iter().map(|e| e.id).collect();
        self.add_edge(edge, ids)
    }

    pub fn save(self) -> Result<Entity> {
        MutationExecutor::new(self.store).create(&self.entity_type, self.fields, self.edges)
    }

    pub fn exec(self) -> Result<()> {
        self.save().map(|_| ())
    }
}

/// Fluent form of [`MutationExecutor::update`].
pub struct UpdateBuilder<'s> {
    store: &'s EntityStore,
    entity_type: String,
    id: i64,
    spec: UpdateSpec,
}

impl<'s> UpdateBuilder<'s> {
    pub fn new(store: &'s EntityStore, entity_type: &str, id: i64) -> Self {
        Self {
            store,
            entity_type: entity_type.to_string(),
            id,
            spec: UpdateSpec::default(),
        }
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.spec.set.insert(field.to_string(), value.into());
        self
    }

    pub fn clear(mut self, field: &str) -> Self {
        self.spec.clear.push(field.to_string());
        self
    }

    pub fn add_edge(mut self, edge: &str, targets: impl IntoIterator<Item = i64>) -> Self {
        self.spec.add.push(EdgeAssignment::new(edge, targets));
        self
    }

    pub fn remove_edge(mut self, edge: &str, targets: impl IntoIterator<Item = i64>) -> Self {
        self.spec.remove.push(EdgeAssignment::new(edge, targets));
        self
    }

    pub fn clear_edge(mut self, edge: &str) -> Self {
        self.spec.clear_edges.push(edge.to_string());
        self
    }

    pub fn save(self) -> Result<Entity> {
        MutationExecutor::new(self.store).update(&self.entity_type, self.id, self.spec)
    }
}

/// Bulk delete over a query, executed with [`exec`](Self::exec).
pub struct DeleteQuery<'s> {
    query: EntityQuery<'s>,
}

impl<'s> DeleteQuery<'s> {
    pub fn new(query: EntityQuery<'s>) -> Self {
        Self { query }
    }

    pub fn filter(self, predicate: Predicate) -> Self {
        Self {
            query: self.query.filter(predicate),
        }
    }

    pub fn exec(&self) -> Result<usize> {
        MutationExecutor::new(self.query.store()).delete_where(&self.query)
    }
}
