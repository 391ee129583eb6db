use serde::{Deserialize, Serialize};

/// Estimación de costo de una corrida: runtime × nodos × tarifa.
/// Los campos de DBU solo se llenan cuando se pasan ambas tarifas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub runtime_seconds: i64,
    pub nodes: i64,
    pub node_hours: f64,
    pub rate_per_node_hour: f64,
    pub estimated_cost: f64,
    pub dbus: Option<f64>,
    pub rate_per_dbu_hour: Option<f64>,
    pub estimated_cost_dbu: Option<f64>,
}

/// Diferencia entre una corrida actual y una optimizada.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostComparison {
    pub current_cost: f64,
    pub optimized_cost: f64,
    pub savings: f64,
    pub current_node_hours: f64,
    pub optimized_node_hours: f64,
    pub node_hours_saved: f64,
}

/// Aritmética pura: runtime se recorta a ≥ 0 y nodos se pisa en 1.
pub fn estimate_cost(
    runtime_seconds: i64,
    nodes: i64,
    rate_per_node_hour: f64,
    dbus_per_node: f64,
    rate_per_dbu_hour: f64,
) -> CostEstimate {
    let runtime_seconds = runtime_seconds.max(0);
    let nodes = nodes.max(1);
    let node_hours = (runtime_seconds as f64 / 3600.0) * nodes as f64;
    let estimated_cost = node_hours * rate_per_node_hour;

    // Solo hay números de DBU si vienen las dos tarifas
    let (dbus, estimated_cost_dbu, rate_dbu) = if dbus_per_node != 0.0 && rate_per_dbu_hour != 0.0 {
        let dbus = (runtime_seconds as f64 / 3600.0) * nodes as f64 * dbus_per_node;
        (
            Some(dbus),
            Some(dbus * rate_per_dbu_hour),
            Some(rate_per_dbu_hour),
        )
    } else {
        (None, None, None)
    };

    CostEstimate {
        runtime_seconds,
        nodes,
        node_hours,
        rate_per_node_hour,
        estimated_cost,
        dbus,
        rate_per_dbu_hour: rate_dbu,
        estimated_cost_dbu,
    }
}

pub fn compare(current: &CostEstimate, optimized: &CostEstimate) -> CostComparison {
    CostComparison {
        current_cost: current.estimated_cost,
        optimized_cost: optimized.estimated_cost,
        savings: current.estimated_cost - optimized.estimated_cost,
        current_node_hours: current.node_hours,
        optimized_node_hours: optimized.node_hours,
        node_hours_saved: current.node_hours - optimized.node_hours,
    }
}
