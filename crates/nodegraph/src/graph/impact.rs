//! Impact Analyzer: the read-only blast radius of a prospective change.
//!
//! The analyzer walks exactly the edges the Cascade Executor would follow
//! and never writes. Callers run it before a destructive operation and abort
//! if [`ImpactAnalysis::exceeds`] their threshold.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use nodegraph_key::CompositeKey;

use super::types::{AffectedNode, ImpactAnalysis, ImpactLevel};
use super::{Direction, Follow, GraphRead, Step, walk};
use crate::domain::{DependencyEdge, ImpactType, Node, NodeId};
use crate::error::Result;
use crate::registry::TypeRegistry;

/// Cascade depth above which a change counts as deep.
const DEEP_CASCADE: usize = 3;

/// Affected-node count above which a phased rollout is suggested.
const WIDE_IMPACT: usize = 5;

/// Analyze what `impact_type` applied to `source` would affect.
///
/// - `delete`: every direct dependent, continuing through cascade-delete
///   edges (the nodes the delete cascade would remove).
/// - `update`: dependents reached through cascade-update edges, transitively.
/// - `version_change`: direct dependents whose edge metadata carries a
///   `version_constraint`.
///
/// The score is `round(sum(strength * 0.5^(depth - 1)))` clamped to 0-100,
/// counting each affected node once at its shallowest depth. It is raised to
/// the score of any node the change expands through, so a change never
/// scores below one it implies.
///
/// # Errors
///
/// Propagates read failures from `graph`.
pub fn analyze<G: GraphRead + ?Sized>(
    graph: &G,
    registry: &TypeRegistry,
    source: &Node,
    impact_type: ImpactType,
    now: DateTime<Utc>,
) -> Result<ImpactAnalysis> {
    let reached = walk(graph, source.id, Direction::Dependents, None, |edge| {
        classify(impact_type, edge)
    })?;

    let keys: HashMap<NodeId, &CompositeKey> = reached
        .steps
        .iter()
        .map(|s| (s.edge.dependent_node_id, &s.edge.dependent_key))
        .collect();

    let affected_nodes: Vec<AffectedNode> = reached
        .steps
        .iter()
        .map(|step| {
            let edge = &step.edge;
            let level = impact_level(impact_type, edge);
            let path = std::iter::once(source.key.clone())
                .chain(
                    reached.path_to(edge.dependent_node_id)
                        .into_iter()
                        .filter_map(|id| keys.get(&id).map(|k| (*k).clone())),
                )
                .collect();

            AffectedNode {
                node_id: edge.dependent_node_id,
                node_key: edge.dependent_key.clone(),
                edge_id: edge.id,
                dependency_type: edge.dependency_type.clone(),
                strength: edge.strength,
                depth: step.depth,
                impact_level: level,
                reason: reason(impact_type, edge),
                action_needed: action(impact_type, edge, level).to_string(),
                path,
                cascades: step.expanded,
            }
        })
        .collect();

    // Never below the score of a node the change expands through.
    let mut score = decayed_score(&reached.steps);
    for step in reached.steps.iter().filter(|s| s.expanded) {
        let own = walk(graph, step.edge.dependent_node_id, Direction::Dependents, None, |edge| {
            classify(impact_type, edge)
        })?;
        score = score.max(decayed_score(&own.steps));
    }

    let mut analysis = ImpactAnalysis {
        source_node_id: source.id,
        source_key: source.key.clone(),
        impact_type,
        score,
        cascade_depth: reached.max_depth(),
        affected_nodes,
        warnings: Vec::new(),
        recommendations: Vec::new(),
        analyzed_at: now,
    };
    advise(&mut analysis, registry);

    tracing::debug!(
        source = %source.key,
        %impact_type,
        affected = analysis.affected_nodes.len(),
        score = analysis.score,
        "Analyzed impact"
    );
    Ok(analysis)
}

fn classify(impact_type: ImpactType, edge: &DependencyEdge) -> Follow {
    match impact_type {
        ImpactType::Delete if edge.cascade_delete => Follow::Expand,
        ImpactType::Delete => Follow::Report,
        ImpactType::Update if edge.cascade_update => Follow::Expand,
        ImpactType::VersionChange if edge.has_version_constraint() => Follow::Report,
        ImpactType::Update | ImpactType::VersionChange => Follow::Skip,
    }
}

fn impact_level(impact_type: ImpactType, edge: &DependencyEdge) -> ImpactLevel {
    let kind = edge.dependency_type.as_str();
    match impact_type {
        ImpactType::Delete if edge.cascade_delete => ImpactLevel::Critical,
        ImpactType::Delete => match kind {
            "hard" => ImpactLevel::High,
            "reference" => ImpactLevel::Low,
            _ => ImpactLevel::Medium,
        },
        ImpactType::Update if edge.cascade_update => ImpactLevel::High,
        ImpactType::Update => match kind {
            "hard" => ImpactLevel::Medium,
            _ => ImpactLevel::Low,
        },
        ImpactType::VersionChange => match kind {
            "hard" | "runtime" => ImpactLevel::High,
            "compile" => ImpactLevel::Medium,
            _ => ImpactLevel::Low,
        },
    }
}

fn reason(impact_type: ImpactType, edge: &DependencyEdge) -> String {
    match impact_type {
        ImpactType::Delete => format!(
            "Depends on a deleted node through a {} dependency",
            edge.dependency_type
        ),
        ImpactType::Update => format!(
            "May need an update after a change to its {} dependency",
            edge.dependency_type
        ),
        ImpactType::VersionChange => {
            "Has a version constraint that may no longer be satisfied".to_string()
        }
    }
}

fn action(impact_type: ImpactType, edge: &DependencyEdge, level: ImpactLevel) -> &'static str {
    match impact_type {
        ImpactType::Delete if edge.cascade_delete => "Will be automatically deleted",
        ImpactType::Delete => match level {
            ImpactLevel::Critical | ImpactLevel::High => "Review and update or remove the dependency",
            ImpactLevel::Medium => "Consider updating its configuration",
            ImpactLevel::Low => "Update documentation if needed",
        },
        ImpactType::Update if edge.cascade_update => "Will be notified of the update",
        ImpactType::Update => match level {
            ImpactLevel::Critical | ImpactLevel::High => "Review and test the changes",
            ImpactLevel::Medium => "Monitor for compatibility issues",
            ImpactLevel::Low => "Update documentation if needed",
        },
        ImpactType::VersionChange => match level {
            ImpactLevel::Critical | ImpactLevel::High => {
                "Verify version compatibility and update constraints"
            }
            ImpactLevel::Medium => "Test with the new version",
            ImpactLevel::Low => "Update the version constraint if needed",
        },
    }
}

/// Depth-decayed sum of edge strengths, clamped to 0-100.
fn decayed_score(steps: &[Step]) -> u8 {
    let total: f64 = steps
        .iter()
        .map(|s| {
            let exponent = i32::try_from(s.depth.saturating_sub(1)).unwrap_or(i32::MAX);
            f64::from(s.edge.strength) * 0.5_f64.powi(exponent)
        })
        .sum();

    // Clamped to 0..=100 first, so the cast cannot truncate or wrap.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let score = total.round().clamp(0.0, 100.0) as u8;
    score
}

fn advise(analysis: &mut ImpactAnalysis, registry: &TypeRegistry) {
    let affected = analysis.affected_nodes.len();
    if affected == 0 {
        return;
    }
    let critical = analysis.count_at(ImpactLevel::Critical);
    let high = analysis.count_at(ImpactLevel::High);

    let mut needs_validation: Vec<&str> = analysis
        .affected_nodes
        .iter()
        .filter(|n| {
            registry
                .lookup(&n.dependency_type)
                .is_ok_and(|t| t.validation_required)
        })
        .map(|n| n.dependency_type.as_str())
        .collect();
    needs_validation.sort_unstable();
    needs_validation.dedup();

    let mut warnings = Vec::new();
    let mut recommendations = Vec::new();

    match analysis.impact_type {
        ImpactType::Delete => {
            if critical > 0 {
                warnings.push(format!(
                    "{critical} node(s) will be deleted automatically by cascade"
                ));
                recommendations.push("Consider backing up data before proceeding".to_string());
            }
            if high > 0 {
                recommendations.push(format!(
                    "Review {high} node(s) with high impact dependencies"
                ));
            }
            if affected > WIDE_IMPACT {
                recommendations.push(
                    "Consider a phased deletion approach to minimize disruption".to_string(),
                );
            }
        }
        ImpactType::Update => {
            recommendations
                .push("Test in a staging environment before production deployment".to_string());
            if analysis.cascade_depth > DEEP_CASCADE {
                recommendations.push("Deep cascade detected; consider a gradual rollout".to_string());
            }
        }
        ImpactType::VersionChange => {
            recommendations.push("Verify version constraints are compatible".to_string());
            recommendations.push("Run compatibility tests before deployment".to_string());
        }
    }

    if analysis.cascade_depth > DEEP_CASCADE {
        warnings.push(format!(
            "Change propagates {} levels deep",
            analysis.cascade_depth
        ));
    }
    if !needs_validation.is_empty() {
        warnings.push(format!(
            "Dependents linked by {} dependencies require re-validation",
            needs_validation.join(", ")
        ));
    }

    analysis.warnings = warnings;
    analysis.recommendations = recommendations;
}
