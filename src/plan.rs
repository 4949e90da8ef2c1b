//! Dispatch plan - which bees run, grouped into ordered phases

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One bee entry in a dispatch plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchBee {
    /// Stable identity of this bee within the plan
    pub bee_instance_id: String,
    /// Broad capability family (e.g. "scout", "analyst", "assistant")
    pub bee_type: String,
    /// Specialization within the family
    pub subtype: String,
    /// Phase number - not a timestamp; bees sharing an order run together
    pub order: u32,
}

impl DispatchBee {
    pub fn new(
        bee_instance_id: impl Into<String>,
        bee_type: impl Into<String>,
        subtype: impl Into<String>,
        order: u32,
    ) -> Self {
        Self {
            bee_instance_id: bee_instance_id.into(),
            bee_type: bee_type.into(),
            subtype: subtype.into(),
            order,
        }
    }
}

/// Static description of a swarm run, produced by an external planner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchPlan {
    pub bees: Vec<DispatchBee>,
}

impl DispatchPlan {
    pub fn new(bees: Vec<DispatchBee>) -> Self {
        Self { bees }
    }

    pub fn is_empty(&self) -> bool {
        self.bees.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bees.len()
    }

    /// Group bees into phases, ascending by order.
    ///
    /// Phase membership is exactly the set of bees sharing an `order`
    /// value; the phase numbers themselves may be sparse.
    pub fn phases(&self) -> Vec<(u32, Vec<&DispatchBee>)> {
        let mut grouped: BTreeMap<u32, Vec<&DispatchBee>> = BTreeMap::new();
        for bee in &self.bees {
            grouped.entry(bee.order).or_default().push(bee);
        }
        grouped.into_iter().collect()
    }

    /// Distinct phase numbers, ascending
    pub fn orders(&self) -> Vec<u32> {
        self.phases().into_iter().map(|(order, _)| order).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bee(id: &str, order: u32) -> DispatchBee {
        DispatchBee::new(id, "scout", "research", order)
    }

    // === Construction Tests ===

    #[test]
    fn test_empty_plan() {
        let plan = DispatchPlan::default();
        assert!(plan.is_empty());
        assert_eq!(plan.len(), 0);
        assert!(plan.phases().is_empty());
    }

    #[test]
    fn test_single_bee_plan() {
        let plan = DispatchPlan::new(vec![bee("a", 0)]);
        assert!(!plan.is_empty());
        assert_eq!(plan.len(), 1);
    }

    // === Phase Grouping Tests ===

    #[test]
    fn test_bees_sharing_order_share_phase() {
        let plan = DispatchPlan::new(vec![bee("a", 0), bee("b", 0), bee("c", 1)]);
        let phases = plan.phases();

        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].0, 0);
        assert_eq!(phases[0].1.len(), 2);
        assert_eq!(phases[1].0, 1);
        assert_eq!(phases[1].1.len(), 1);
    }

    #[test]
    fn test_phases_sorted_ascending_regardless_of_plan_order() {
        let plan = DispatchPlan::new(vec![bee("c", 2), bee("a", 0), bee("b", 1)]);
        assert_eq!(plan.orders(), vec![0, 1, 2]);
    }

    #[test]
    fn test_sparse_phase_numbers_are_preserved() {
        let plan = DispatchPlan::new(vec![bee("a", 0), bee("b", 5), bee("c", 10)]);
        assert_eq!(plan.orders(), vec![0, 5, 10]);
    }

    #[test]
    fn test_phase_membership_keeps_plan_order_within_phase() {
        let plan = DispatchPlan::new(vec![bee("first", 0), bee("second", 0)]);
        let phases = plan.phases();
        let ids: Vec<&str> = phases[0]
            .1
            .iter()
            .map(|b| b.bee_instance_id.as_str())
            .collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    // === Serialization Tests ===

    #[test]
    fn test_plan_deserializes_from_planner_json() {
        let raw = r#"{
            "bees": [
                {"bee_instance_id": "scout-1", "bee_type": "scout", "subtype": "research", "order": 0},
                {"bee_instance_id": "writer-1", "bee_type": "writer", "subtype": "drafting", "order": 1}
            ]
        }"#;

        let plan: DispatchPlan = serde_json::from_str(raw).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.bees[0].bee_instance_id, "scout-1");
        assert_eq!(plan.orders(), vec![0, 1]);
    }
}
