use std::cmp::Ordering;

use crate::{
    cancel::{self, CancelToken},
    entity::{Entity, FieldKind, Value},
    errors::{EntGraphError, Result},
    registry::{EntityType, SchemaRegistry},
    store::Session,
};

/// Boolean condition over one entity. A query AND-combines its predicates.
///
/// Comparisons against an optional field that is unset are false, so
/// `ne("nickname", "x")` does not match rows without a nickname. `not`
/// negates the inner result as evaluated.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    Ne(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
    Contains(String, String),
    IsNull(String),
    NotNull(String),
    HasEdge(String),
    HasEdgeWith(String, Vec<Predicate>),
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Eq(field.to_string(), value.into())
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Ne(field.to_string(), value.into())
    }

    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Gt(field.to_string(), value.into())
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Gte(field.to_string(), value.into())
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Lt(field.to_string(), value.into())
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Lte(field.to_string(), value.into())
    }

    pub fn is_in<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::In(
            field.to_string(),
            values.into_iter().map(Into::into).collect(),
        )
    }

    pub fn contains(field: &str, needle: &str) -> Self {
        Predicate::Contains(field.to_string(), needle.to_string())
    }

    pub fn is_null(field: &str) -> Self {
        Predicate::IsNull(field.to_string())
    }

    pub fn not_null(field: &str) -> Self {
        Predicate::NotNull(field.to_string())
    }

    pub fn has_edge(edge: &str) -> Self {
        Predicate::HasEdge(edge.to_string())
    }

    pub fn has_edge_with(edge: &str, predicates: Vec<Predicate>) -> Self {
        Predicate::HasEdgeWith(edge.to_string(), predicates)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(predicate: Predicate) -> Self {
        Predicate::Not(Box::new(predicate))
    }

    pub fn and(predicates: Vec<Predicate>) -> Self {
        Predicate::And(predicates)
    }

    pub fn or(predicates: Vec<Predicate>) -> Self {
        Predicate::Or(predicates)
    }

    /// Checks field names, value kinds and edge names against `ty`.
    pub fn validate(&self, ty: &EntityType, registry: &SchemaRegistry) -> Result<()> {
        match self {
            Predicate::Eq(field, value)
            | Predicate::Ne(field, value)
            | Predicate::Gt(field, value)
            | Predicate::Gte(field, value)
            | Predicate::Lt(field, value)
            | Predicate::Lte(field, value) => expect_kind(ty, field, value.kind()),
            Predicate::In(field, values) => {
                field_kind(ty, field)?;
                values
                    .iter()
                    .try_for_each(|value| expect_kind(ty, field, value.kind()))
            }
            Predicate::Contains(field, _) => expect_kind(ty, field, FieldKind::Text),
            Predicate::IsNull(field) | Predicate::NotNull(field) => field_kind(ty, field).map(|_| ()),
            Predicate::HasEdge(edge) => registry.edge(&ty.name, edge).map(|_| ()),
            Predicate::HasEdgeWith(edge, inner) => {
                let edge = registry.edge(&ty.name, edge)?;
                let target = registry.describe(&edge.target_type)?;
                inner
                    .iter()
                    .try_for_each(|p| p.validate(target, registry))
            }
            Predicate::Not(inner) => inner.validate(ty, registry),
            Predicate::And(inner) | Predicate::Or(inner) => {
                inner.iter().try_for_each(|p| p.validate(ty, registry))
            }
        }
    }

    /// Evaluates the predicate on an entity. Edge predicates consult the
    /// edge index only; `HasEdgeWith` loads the related rows it tests.
    pub(crate) fn matches(
        &self,
        entity: &Entity,
        session: &Session<'_>,
        token: Option<&CancelToken>,
    ) -> Result<bool> {
        Ok(match self {
            Predicate::Eq(field, value) => compare(entity, field, value) == Some(Ordering::Equal),
            Predicate::Ne(field, value) => matches!(
                compare(entity, field, value),
                Some(Ordering::Less | Ordering::Greater)
            ),
            Predicate::Gt(field, value) => compare(entity, field, value) == Some(Ordering::Greater),
            Predicate::Gte(field, value) => matches!(
                compare(entity, field, value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Predicate::Lt(field, value) => compare(entity, field, value) == Some(Ordering::Less),
            Predicate::Lte(field, value) => matches!(
                compare(entity, field, value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Predicate::In(field, values) => values
                .iter()
                .any(|value| compare(entity, field, value) == Some(Ordering::Equal)),
            Predicate::Contains(field, needle) => entity
                .text(field)
                .is_some_and(|text| text.contains(needle.as_str())),
            Predicate::IsNull(field) => entity.get(field).is_none(),
            Predicate::NotNull(field) => entity.get(field).is_some(),
            Predicate::HasEdge(edge) => {
                let edge = session.registry().edge(&entity.entity_type, edge)?;
                !session
                    .neighbors(&edge.key, edge.direction, entity.id)?
                    .is_empty()
            }
            Predicate::HasEdgeWith(edge, inner) => {
                let edge = session.registry().edge(&entity.entity_type, edge)?;
                let related = session.neighbors(&edge.key, edge.direction, entity.id)?;
                let mut found = false;
                for target in session.load_many(&edge.target_type, &related, token)? {
                    cancel::check(token)?;
                    if matches_all(inner, &target, session, token)? {
                        found = true;
                        break;
                    }
                }
                found
            }
            Predicate::Not(inner) => !inner.matches(entity, session, token)?,
            Predicate::And(inner) => matches_all(inner, entity, session, token)?,
            Predicate::Or(inner) => {
                let mut any = false;
                for predicate in inner {
                    if predicate.matches(entity, session, token)? {
                        any = true;
                        break;
                    }
                }
                any
            }
        })
    }
}

pub(crate) fn matches_all(
    predicates: &[Predicate],
    entity: &Entity,
    session: &Session<'_>,
    token: Option<&CancelToken>,
) -> Result<bool> {
    for predicate in predicates {
        if !predicate.matches(entity, session, token)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn compare(entity: &Entity, field: &str, value: &Value) -> Option<Ordering> {
    entity.get(field).and_then(|stored| stored.compare(value))
}

fn field_kind(ty: &EntityType, field: &str) -> Result<FieldKind> {
    ty.field_def(field)
        .map(|def| def.kind)
        .ok_or_else(|| EntGraphError::constraint(format!("{} has no field {field}", ty.name)))
}

fn expect_kind(ty: &EntityType, field: &str, kind: FieldKind) -> Result<()> {
    let declared = field_kind(ty, field)?;
    if declared != kind {
        return Err(EntGraphError::constraint(format!(
            "{}.{field} is {declared}, predicate uses {kind}",
            ty.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FieldDef;

    fn car_type() -> EntityType {
        EntityType::new("Car")
            .field(FieldDef::text("model"))
            .field(FieldDef::int("doors").optional())
    }

    fn registry() -> SchemaRegistry {
        let mut builder = SchemaRegistry::builder();
        builder.register(car_type()).expect("register");
        builder.build().expect("build")
    }

    #[test]
    fn validate_rejects_unknown_field() {
        let err = Predicate::eq("color", "red")
            .validate(&car_type(), &registry())
            .expect_err("unknown field");
        assert!(matches!(err, EntGraphError::ConstraintViolation(_)));
    }

    #[test]
    fn validate_rejects_mismatched_kind() {
        let err = Predicate::gt("model", 3)
            .validate(&car_type(), &registry())
            .expect_err("kind mismatch");
        assert!(matches!(err, EntGraphError::ConstraintViolation(_)));
    }

    #[test]
    fn validate_rejects_unknown_edge_inside_not() {
        let err = Predicate::not(Predicate::has_edge("owner"))
            .validate(&car_type(), &registry())
            .expect_err("unknown edge");
        assert!(matches!(err, EntGraphError::UnknownEdge(_)));
    }

    #[test]
    fn validate_accepts_nested_composition() {
        let predicate = Predicate::or(vec![
            Predicate::and(vec![Predicate::eq("model", "Ford"), Predicate::is_null("doors")]),
            Predicate::is_in("doors", [2, 4]),
        ]);
        predicate
            .validate(&car_type(), &registry())
            .expect("valid predicate");
    }
}
