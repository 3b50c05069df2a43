//! Typed, immutable query builders.
//!
//! An [`EntityQuery`] accumulates predicates, ordering, paging and edge hops
//! as a plain value; nothing touches the store until a terminal method
//! (`all`, `only`, `count`, ...) runs. Every narrowing method consumes the
//! builder and returns a new one, and builders are `Clone`, so one base query
//! can be refined in several directions without shared mutable state.

use std::cmp::Ordering;

use crate::{
    cancel::{self, CancelToken},
    entity::Entity,
    errors::{EntGraphError, Result},
    multi_hop,
    predicate::{Predicate, matches_all},
    registry::{EdgeRef, SchemaRegistry},
    store::{EntityStore, Session},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Clone, Debug)]
pub(crate) enum Source {
    All,
    Ids(Vec<i64>),
    Edge { from: Box<QueryPlan>, edge: EdgeRef },
}

/// Store-independent description of one query step.
#[derive(Clone, Debug)]
pub(crate) struct QueryPlan {
    pub(crate) entity_type: String,
    pub(crate) source: Source,
    pub(crate) predicates: Vec<Predicate>,
    pub(crate) order: Vec<OrderBy>,
    pub(crate) limit: Option<usize>,
    pub(crate) offset: Option<usize>,
}

impl QueryPlan {
    fn new(entity_type: &str, source: Source) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            source,
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// No refinements: the step's result is exactly its source set.
    fn is_plain(&self) -> bool {
        self.predicates.is_empty()
            && self.order.is_empty()
            && self.limit.is_none()
            && self.offset.is_none()
    }

    fn hops(&self) -> usize {
        match &self.source {
            Source::Edge { from, .. } => 1 + from.hops(),
            _ => 0,
        }
    }

    pub(crate) fn validate(&self, registry: &SchemaRegistry) -> Result<()> {
        let ty = registry.describe(&self.entity_type)?;
        for predicate in &self.predicates {
            predicate.validate(ty, registry)?;
        }
        for order in &self.order {
            if ty.field_def(&order.field).is_none() {
                return Err(EntGraphError::constraint(format!(
                    "{} has no field {} to order by",
                    ty.name, order.field
                )));
            }
        }
        if let Source::Edge { from, .. } = &self.source {
            from.validate(registry)?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct EntityQuery<'s> {
    store: &'s EntityStore,
    plan: QueryPlan,
    eager: Vec<String>,
    token: Option<CancelToken>,
}

impl<'s> EntityQuery<'s> {
    /// Query over every row of `entity_type`.
    pub fn new(store: &'s EntityStore, entity_type: &str) -> Result<Self> {
        store.registry().describe(entity_type)?;
        Ok(Self::from_plan(store, QueryPlan::new(entity_type, Source::All)))
    }

    /// Query pinned to the given ids of `entity_type`; ids of other types
    /// or missing rows simply do not match.
    pub fn from_ids(store: &'s EntityStore, entity_type: &str, ids: Vec<i64>) -> Self {
        Self::from_plan(store, QueryPlan::new(entity_type, Source::Ids(ids)))
    }

    fn from_plan(store: &'s EntityStore, plan: QueryPlan) -> Self {
        Self {
            store,
            plan,
            eager: Vec::new(),
            token: None,
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.plan.entity_type
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.plan.predicates.push(predicate);
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.plan.order.push(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.plan.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: usize) -> Self {
        self.plan.offset = Some(n);
        self
    }

    /// Eager-loads related ids for `edge` into [`Entity::edges`].
    pub fn with_edge(mut self, edge: &str) -> Self {
        self.eager.push(edge.to_string());
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Moves to the target type of `edge`, scoped to the rows reachable from
    /// this query's result set.
    pub fn query_edge(self, edge: &str) -> Result<EntityQuery<'s>> {
        let edge = self.store.registry().edge(&self.plan.entity_type, edge)?;
        let target = edge.target_type.clone();
        let plan = QueryPlan::new(
            &target,
            Source::Edge {
                from: Box::new(self.plan),
                edge,
            },
        );
        Ok(EntityQuery {
            store: self.store,
            plan,
            eager: Vec::new(),
            token: self.token,
        })
    }

    /// `query_edge` over each name of `path` in turn.
    pub fn query_path(self, path: &[&str]) -> Result<EntityQuery<'s>> {
        path.iter().try_fold(self, |query, edge| query.query_edge(edge))
    }

    pub fn all(&self) -> Result<Vec<Entity>> {
        self.run(&self.plan)
    }

    pub fn ids(&self) -> Result<Vec<i64>> {
        Ok(self.all()?.into_iter().map(|e| e.id).collect())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.all()?.len())
    }

    pub fn exist(&self) -> Result<bool> {
        Ok(!self.run(&self.capped(1))?.is_empty())
    }

    pub fn first(&self) -> Result<Option<Entity>> {
        Ok(self.run(&self.capped(1))?.into_iter().next())
    }

    /// The single matching entity: `NotFound` for none, `NotSingular` for more.
    pub fn only(&self) -> Result<Entity> {
        self.maybe_only()?.ok_or_else(|| {
            EntGraphError::not_found(format!("no {} matched", self.plan.entity_type))
        })
    }

    /// Like [`only`](Self::only) but an empty result is `Ok(None)`.
    pub fn maybe_only(&self) -> Result<Option<Entity>> {
        let mut rows = self.run(&self.capped(2))?;
        if rows.len() > 1 {
            return Err(EntGraphError::not_singular(format!(
                "more than one {} matched",
                self.plan.entity_type
            )));
        }
        Ok(rows.pop())
    }

    pub fn only_id(&self) -> Result<i64> {
        self.only().map(|e| e.id)
    }

    pub(crate) fn store(&self) -> &'s EntityStore {
        self.store
    }

    pub(crate) fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub(crate) fn token(&self) -> Option<&CancelToken> {
        self.token.as_ref()
    }

    fn capped(&self, n: usize) -> QueryPlan {
        let mut plan = self.plan.clone();
        plan.limit = Some(plan.limit.map_or(n, |limit| limit.min(n)));
        plan
    }

    fn run(&self, plan: &QueryPlan) -> Result<Vec<Entity>> {
        plan.validate(self.store.registry())?;
        let eager = self
            .eager
            .iter()
            .map(|name| self.store.registry().edge(&plan.entity_type, name))
            .collect::<Result<Vec<_>>>()?;
        let token = self.token.as_ref();
        cancel::check(token)?;
        let rows = self.store.read(|session| {
            let mut rows = resolve(session, plan, token)?;
            for edge in &eager {
                for entity in rows.iter_mut() {
                    cancel::check(token)?;
                    let related = session.neighbors(&edge.key, edge.direction, entity.id)?;
                    entity.edges.insert(edge.name.clone(), related);
                }
            }
            Ok(rows)
        })?;
        tracing::debug!(
            target: "entgraph",
            entity_type = %plan.entity_type,
            rows = rows.len(),
            hops = plan.hops(),
            "query executed"
        );
        Ok(rows)
    }
}

/// Materializes the rows selected by `plan`.
pub(crate) fn resolve(
    session: &Session<'_>,
    plan: &QueryPlan,
    token: Option<&CancelToken>,
) -> Result<Vec<Entity>> {
    let candidates = match &plan.source {
        Source::All => session.scan(&plan.entity_type, token)?,
        Source::Ids(ids) => session.load_many(&plan.entity_type, ids, token)?,
        Source::Edge { .. } => {
            let ids = source_ids(session, plan, token)?;
            session.load_many(&plan.entity_type, &ids, token)?
        }
    };
    refine(session, plan, candidates, token)
}

/// Ids selected by `plan`, skipping row materialization for plain hops.
pub(crate) fn resolve_ids(
    session: &Session<'_>,
    plan: &QueryPlan,
    token: Option<&CancelToken>,
) -> Result<Vec<i64>> {
    if plan.is_plain() {
        if let Source::Edge { .. } = plan.source {
            return source_ids(session, plan, token);
        }
    }
    Ok(resolve(session, plan, token)?
        .into_iter()
        .map(|e| e.id)
        .collect())
}

/// Ids reachable over the edge hops ending at `plan`, before `plan`'s own
/// refinements. Consecutive plain hops are walked as one chain.
fn source_ids(
    session: &Session<'_>,
    plan: &QueryPlan,
    token: Option<&CancelToken>,
) -> Result<Vec<i64>> {
    let (mut base, first) = match &plan.source {
        Source::Edge { from, edge } => (from.as_ref(), edge),
        Source::All | Source::Ids(_) => return resolve_ids(session, plan, token),
    };
    let mut path = vec![first.clone()];
    while let (true, Source::Edge { from, edge }) = (base.is_plain(), &base.source) {
        path.push(edge.clone());
        base = from.as_ref();
    }
    path.reverse();
    let start = resolve_ids(session, base, token)?;
    multi_hop::chain(session, &start, &path, token)
}

fn refine(
    session: &Session<'_>,
    plan: &QueryPlan,
    candidates: Vec<Entity>,
    token: Option<&CancelToken>,
) -> Result<Vec<Entity>> {
    let mut rows = Vec::with_capacity(candidates.len());
    for entity in candidates {
        cancel::check(token)?;
        if matches_all(&plan.predicates, &entity, session, token)? {
            rows.push(entity);
        }
    }
    if !plan.order.is_empty() {
        rows.sort_by(|a, b| compare_rows(a, b, &plan.order));
    }
    let offset = plan.offset.unwrap_or(0);
    let limit = plan.limit.unwrap_or(usize::MAX);
    Ok(rows.into_iter().skip(offset).take(limit).collect())
}

/// Unset values sort before set ones; ties keep insertion order.
fn compare_rows(a: &Entity, b: &Entity, order: &[OrderBy]) -> Ordering {
    for key in order {
        let ordering = match (a.get(&key.field), b.get(&key.field)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
        };
        let ordering = match key.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::entity::Value;

    fn row(id: i64, age: Option<i64>) -> Entity {
        let mut fields = BTreeMap::new();
        if let Some(age) = age {
            fields.insert("age".to_string(), Value::Int(age));
        }
        Entity {
            id,
            entity_type: "User".into(),
            fields,
            edges: BTreeMap::new(),
        }
    }

    #[test]
    fn compare_rows_puts_unset_first_and_keeps_ties_stable() {
        let mut rows = vec![row(1, Some(30)), row(2, None), row(3, Some(28)), row(4, Some(30))];
        let order = [OrderBy {
            field: "age".into(),
            direction: Direction::Asc,
        }];
        rows.sort_by(|a, b| compare_rows(a, b, &order));
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3, 1, 4]);
    }

    #[test]
    fn compare_rows_descending() {
        let mut rows = vec![row(1, Some(28)), row(2, Some(30))];
        let order = [OrderBy {
            field: "age".into(),
            direction: Direction::Desc,
        }];
        rows.sort_by(|a, b| compare_rows(a, b, &order));
        assert_eq!(rows[0].id, 2);
    }
}
