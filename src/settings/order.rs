use serde::{Deserialize, Serialize};

use crate::variables::VariableRegistry;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    Up,
    Down,
}

/// Turns any list of ids into a duplicate-free permutation of the full catalog.
///
/// Unknown ids are dropped, the first occurrence of a known id wins, and catalog
/// ids missing from `raw` are appended in catalog order.
pub fn normalize_variable_order<S: AsRef<str>>(
    registry: &VariableRegistry,
    raw: &[S],
) -> Vec<String> {
    let mut order: Vec<String> = Vec::with_capacity(registry.len());
    for id in raw {
        let id = id.as_ref();
        if registry.contains(id) && !order.iter().any(|existing| existing == id) {
            order.push(id.to_string());
        }
    }
    for id in registry.ids() {
        if !order.contains(&id) {
            order.push(id);
        }
    }
    order
}

pub fn move_variable(order: &mut [String], variable_id: &str, direction: MoveDirection) -> bool {
    let Some(current) = order.iter().position(|id| id == variable_id) else {
        return false;
    };
    let next = match direction {
        MoveDirection::Up => match current.checked_sub(1) {
            Some(next) => next,
            None => return false,
        },
        MoveDirection::Down => current + 1,
    };
    if next >= order.len() {
        return false;
    }
    order.swap(current, next);
    true
}
