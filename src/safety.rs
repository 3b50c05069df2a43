use std::{fmt, result};

use rusqlite::OptionalExtension;
use serde::Serialize;

use crate::{
    errors::{EntGraphError, Result},
    registry::{Cardinality, TraversalDirection},
    store::{EntityStore, Session},
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub total_rows: i64,
    pub total_edges: i64,
    /// Membership rows whose endpoint row no longer exists.
    pub orphan_edges: i64,
    /// Membership rows whose endpoints have the wrong entity type.
    pub mistyped_edges: i64,
    /// Entities holding more than one membership on a unique side.
    pub cardinality_violations: i64,
    /// Entities with no membership on an edge their type marks required.
    pub missing_required_edges: i64,
}

impl IntegrityReport {
    pub fn has_issues(&self) -> bool {
        self.orphan_edges > 0
            || self.mistyped_edges > 0
            || self.cardinality_violations > 0
            || self.missing_required_edges > 0
    }
}

#[derive(Debug)]
pub struct IntegrityError {
    pub report: IntegrityReport,
    pub source: Option<EntGraphError>,
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "integrity violations detected")
    }
}

impl std::error::Error for IntegrityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| err as &dyn std::error::Error)
    }
}

/// Scans the whole store for broken memberships and unmet edge constraints.
pub fn check_integrity(store: &EntityStore) -> Result<IntegrityReport> {
    store.read(|session| {
        let mut report = IntegrityReport {
            total_rows: query_single(session, "SELECT COUNT(*) FROM ent_rows")?,
            total_edges: query_single(session, "SELECT COUNT(*) FROM ent_edges")?,
            ..IntegrityReport::default()
        };
        report.orphan_edges = query_single(
            session,
            "SELECT COUNT(*) FROM ent_edges e
             LEFT JOIN ent_rows src ON src.id = e.from_id
             LEFT JOIN ent_rows dst ON dst.id = e.to_id
             WHERE src.id IS NULL OR dst.id IS NULL",
        )?;
        for edge in session.registry().owning_edges() {
            report.mistyped_edges += query_keyed(
                session,
                "SELECT COUNT(*) FROM ent_edges e
                 JOIN ent_rows src ON src.id = e.from_id
                 JOIN ent_rows dst ON dst.id = e.to_id
                 WHERE e.edge_type = ?1
                   AND (src.entity_type <> ?2 OR dst.entity_type <> ?3)",
                &[&edge.key, &edge.source_type, &edge.target_type],
            )?;
            if edge.from_cardinality == Cardinality::One {
                report.cardinality_violations += query_keyed(
                    session,
                    "SELECT COUNT(*) FROM (SELECT from_id FROM ent_edges
                     WHERE edge_type = ?1 GROUP BY from_id HAVING COUNT(*) > 1)",
                    &[&edge.key],
                )?;
            }
            if edge.to_cardinality == Cardinality::One {
                report.cardinality_violations += query_keyed(
                    session,
                    "SELECT COUNT(*) FROM (SELECT to_id FROM ent_edges
                     WHERE edge_type = ?1 GROUP BY to_id HAVING COUNT(*) > 1)",
                    &[&edge.key],
                )?;
            }
        }
        for ty in session.registry().entity_types() {
            for def in ty.edges.iter().filter(|def| def.required) {
                let edge = session.registry().edge(&ty.name, &def.name)?;
                let sql = match edge.direction {
                    TraversalDirection::Outgoing => {
                        "SELECT COUNT(*) FROM ent_rows r WHERE r.entity_type = ?1
                         AND NOT EXISTS (SELECT 1 FROM ent_edges e
                                         WHERE e.edge_type = ?2 AND e.from_id = r.id)"
                    }
                    TraversalDirection::Incoming => {
                        "SELECT COUNT(*) FROM ent_rows r WHERE r.entity_type = ?1
                         AND NOT EXISTS (SELECT 1 FROM ent_edges e
                                         WHERE e.edge_type = ?2 AND e.to_id = r.id)"
                    }
                };
                report.missing_required_edges +=
                    query_keyed(session, sql, &[&ty.name, &edge.key])?;
            }
        }
        Ok(report)
    })
}

pub fn check_integrity_strict(store: &EntityStore) -> result::Result<(), IntegrityError> {
    let report = check_integrity(store).map_err(|err| IntegrityError {
        report: IntegrityReport::default(),
        source: Some(err),
    })?;
    if report.has_issues() {
        Err(IntegrityError {
            report,
            source: None,
        })
    } else {
        Ok(())
    }
}

fn query_single(session: &Session<'_>, sql: &str) -> Result<i64> {
    query_keyed(session, sql, &[])
}

fn query_keyed(session: &Session<'_>, sql: &str, args: &[&String]) -> Result<i64> {
    let params = rusqlite::params_from_iter(args.iter());
    session
        .conn()
        .query_row(sql, params, |row| row.get(0))
        .optional()
        .map(|opt| opt.unwrap_or(0))
        .map_err(EntGraphError::from_sqlite)
}
