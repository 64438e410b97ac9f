use thiserror::Error;

use crate::{
    BlockIndex, BlockTarget, ConnectionDirection, ConnectionPointType, PointIndex, MAX_GRAPH_DEPTH,
};

/// Bound on the points walked by a type or name query. A block costs up to three hops
/// (input, linked input, typed output).
pub const MAX_RESOLVE_DEPTH: usize = 4 * MAX_GRAPH_DEPTH;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("cannot connect {output} ({output_type:?}) to {input} ({input_type:?}): type mismatch")]
    TypeMismatch {
        output: String,
        input: String,
        output_type: ConnectionPointType,
        input_type: ConnectionPointType,
    },
    #[error("cannot connect {0} to {1}: fragment values cannot flow back into the vertex stage")]
    TargetIncompatible(String, String),
    #[error("cannot connect {0}: its type could not be resolved")]
    UnresolvedType(String),
    #[error("cannot connect {0} to {1}: expected an output and an input")]
    InvalidDirection(String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatibilityState {
    Compatible,
    TypeIncompatible,
    TargetIncompatible,
}

#[derive(Debug, Clone)]
pub struct ConnectionPoint {
    pub name: String,
    pub owner: BlockIndex,
    pub direction: ConnectionDirection,
    pub inner_type: ConnectionPointType,
    pub is_optional: bool,
    pub target: BlockTarget,
    pub accepted_types: Vec<ConnectionPointType>,
    pub excluded_types: Vec<ConnectionPointType>,
    pub type_source: Option<PointIndex>,
    pub linked_source: Option<PointIndex>,
    pub(crate) connected_point: Option<PointIndex>,
    pub(crate) endpoints: Vec<PointIndex>,
    pub(crate) associated_variable_name: String,
    pub(crate) enforce_associated_variable_name: bool,
}

impl ConnectionPoint {
    pub fn new(
        name: &str,
        owner: BlockIndex,
        direction: ConnectionDirection,
        inner_type: ConnectionPointType,
    ) -> Self {
        Self {
            name: name.to_owned(),
            owner,
            direction,
            inner_type,
            is_optional: false,
            target: BlockTarget::VertexAndFragment,
            accepted_types: Vec::new(),
            excluded_types: Vec::new(),
            type_source: None,
            linked_source: None,
            connected_point: None,
            endpoints: Vec::new(),
            associated_variable_name: String::new(),
            enforce_associated_variable_name: false,
        }
    }

    pub fn is_input(&self) -> bool {
        self.direction == ConnectionDirection::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == ConnectionDirection::Output
    }

    pub fn connected_point(&self) -> Option<PointIndex> {
        self.connected_point
    }

    pub fn endpoints(&self) -> &[PointIndex] {
        &self.endpoints
    }

    pub fn is_connected(&self) -> bool {
        match self.direction {
            ConnectionDirection::Input => self.connected_point.is_some(),
            ConnectionDirection::Output => !self.endpoints.is_empty(),
        }
    }

    pub fn has_endpoints(&self) -> bool {
        !self.endpoints.is_empty()
    }

    pub fn set_associated_variable_name(&mut self, name: impl Into<String>) {
        self.associated_variable_name = name.into();
    }

    pub(crate) fn clear_associated_variable_name(&mut self) {
        self.associated_variable_name.clear();
    }
}

pub fn resolve_type(points: &[ConnectionPoint], index: PointIndex) -> ConnectionPointType {
    let mut current = &points[usize::from(index)];
    for _ in 0..MAX_RESOLVE_DEPTH {
        let next = match current.inner_type {
            ConnectionPointType::AutoDetect => current.connected_point.or_else(|| {
                current
                    .linked_source
                    .filter(|x| points[usize::from(*x)].is_connected())
            }),
            ConnectionPointType::BasedOnInput => current.type_source,
            inner => return inner,
        };

        match next {
            Some(next) => current = &points[usize::from(next)],
            None => break,
        }
    }
    current.inner_type
}

/// GLSL identifier bound to a point. Inputs follow their upstream output unless a varying
/// name has been enforced on them.
pub fn resolve_variable_name(points: &[ConnectionPoint], index: PointIndex) -> &str {
    let mut current = &points[usize::from(index)];
    for _ in 0..MAX_RESOLVE_DEPTH {
        let follow = !current.enforce_associated_variable_name
            || current.associated_variable_name.is_empty();
        match current.connected_point {
            Some(connected) if follow => current = &points[usize::from(connected)],
            _ => break,
        }
    }
    &current.associated_variable_name
}

/// Type rules applied when `output` is wired into `input`.
pub fn check_type_compatibility(
    output_type: ConnectionPointType,
    input: &ConnectionPoint,
    input_type: ConnectionPointType,
) -> CompatibilityState {
    if output_type != input_type && input.inner_type != ConnectionPointType::AutoDetect {
        if output_type.is_equivalent(input_type) || input.accepted_types.contains(&output_type) {
            return CompatibilityState::Compatible;
        }
        return CompatibilityState::TypeIncompatible;
    }

    if input.excluded_types.contains(&output_type) {
        return CompatibilityState::TypeIncompatible;
    }

    CompatibilityState::Compatible
}
