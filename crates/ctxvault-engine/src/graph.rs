use ctxvault_types::{Record, RecordKind};

pub const PROPAGATION_ITERATIONS: usize = 3;
pub const DAMPING: f64 = 0.85;
pub const SEQUENTIAL_EDGE_WEIGHT: f64 = 0.5;
pub const SAME_KIND_EDGE_WEIGHT: f64 = 0.3;
pub const SAME_KIND_WINDOW: usize = 10;

const KIND_SLOTS: usize = 7;
const FEATURE_LEN: usize = KIND_SLOTS + 2;
const TOKEN_SCALE: f64 = 5000.0;

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub index: usize,
    pub kind: RecordKind,
    /// `[one-hot(kind), position / total, min(tokens / 5000, 1)]`.
    /// Kept for inspection only; propagation does not read it.
    pub features: [f64; FEATURE_LEN],
    pub importance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphEdge {
    pub source: usize,
    pub target: usize,
    pub weight: f64,
}

/// Light dependency graph over one log, ranked by damped propagation.
#[derive(Debug, Clone, Default)]
pub struct ImportanceGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl ImportanceGraph {
    pub fn build(records: &[Record]) -> Self {
        let total = records.len();
        let nodes = records
            .iter()
            .enumerate()
            .map(|(index, record)| GraphNode {
                index,
                kind: record.kind,
                features: features(record, index, total),
                importance: base_importance(record.kind),
            })
            .collect();

        let mut edges = Vec::new();
        for i in 1..total {
            edges.push(GraphEdge {
                source: i - 1,
                target: i,
                weight: SEQUENTIAL_EDGE_WEIGHT,
            });

            let window_start = i.saturating_sub(SAME_KIND_WINDOW);
            for j in window_start..i {
                if records[j].kind == records[i].kind {
                    edges.push(GraphEdge {
                        source: j,
                        target: i,
                        weight: SAME_KIND_EDGE_WEIGHT,
                    });
                }
            }
        }

        Self { nodes, edges }
    }

    /// Run the fixed number of propagation rounds, then min-max normalize.
    pub fn propagate(&mut self) {
        let n = self.nodes.len();
        let mut incoming: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for edge in &self.edges {
            incoming[edge.target].push((edge.source, edge.weight));
        }

        let mut importance: Vec<f64> = self.nodes.iter().map(|n| n.importance).collect();
        for _ in 0..PROPAGATION_ITERATIONS {
            importance = self
                .nodes
                .iter()
                .map(|node| {
                    let inputs = &incoming[node.index];
                    let mean = if inputs.is_empty() {
                        0.0
                    } else {
                        inputs.iter().map(|(src, w)| importance[*src] * w).sum::<f64>()
                            / inputs.len() as f64
                    };
                    (1.0 - DAMPING) * base_importance(node.kind) + DAMPING * mean
                })
                .collect();
        }

        normalize(&mut importance);
        for (node, value) in self.nodes.iter_mut().zip(importance) {
            node.importance = value;
        }
    }

    pub fn importances(&self) -> Vec<f64> {
        self.nodes.iter().map(|n| n.importance).collect()
    }

    /// Build, propagate and return per-record importance in `[0, 1]`.
    pub fn compute(records: &[Record]) -> Vec<f64> {
        let mut graph = Self::build(records);
        graph.propagate();
        graph.importances()
    }
}

fn base_importance(kind: RecordKind) -> f64 {
    if kind == RecordKind::Summary { 0.9 } else { 0.5 }
}

fn kind_slot(kind: RecordKind) -> Option<usize> {
    match kind {
        RecordKind::User => Some(0),
        RecordKind::Assistant => Some(1),
        RecordKind::Summary => Some(2),
        RecordKind::System => Some(3),
        RecordKind::FileSnapshot => Some(4),
        RecordKind::QueueOp => Some(5),
        RecordKind::ToolUse | RecordKind::ToolResult => Some(6),
        RecordKind::Unknown => None,
    }
}

fn features(record: &Record, index: usize, total: usize) -> [f64; FEATURE_LEN] {
    let mut f = [0.0; FEATURE_LEN];
    if let Some(slot) = kind_slot(record.kind) {
        f[slot] = 1.0;
    }
    f[KIND_SLOTS] = if total > 0 { index as f64 / total as f64 } else { 0.0 };
    f[KIND_SLOTS + 1] = (record.estimated_tokens() as f64 / TOKEN_SCALE).min(1.0);
    f
}

// All-zero input is left alone; a flat non-zero input keeps its raw values,
// which are already inside [0, 1].
fn normalize(values: &mut [f64]) {
    if values.iter().all(|v| *v == 0.0) {
        return;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range <= f64::EPSILON {
        return;
    }
    for v in values.iter_mut() {
        *v = (*v - min) / range;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxvault_types::parse_record;

    fn records(kinds: &[&str]) -> Vec<Record> {
        kinds
            .iter()
            .map(|k| parse_record(&format!(r#"{{"type":"{}","summary":"s","message":{{"content":"m"}}}}"#, k)))
            .collect()
    }

    #[test]
    fn test_edges() {
        let graph = ImportanceGraph::build(&records(&["user", "assistant", "user"]));
        assert!(graph.edges.contains(&GraphEdge { source: 0, target: 1, weight: 0.5 }));
        assert!(graph.edges.contains(&GraphEdge { source: 1, target: 2, weight: 0.5 }));
        assert!(graph.edges.contains(&GraphEdge { source: 0, target: 2, weight: 0.3 }));
        assert_eq!(graph.edges.len(), 3);
    }

    #[test]
    fn test_same_kind_window_is_bounded() {
        let kinds: Vec<&str> = std::iter::repeat_n("user", 15).collect();
        let graph = ImportanceGraph::build(&records(&kinds));
        let into_last = graph.edges.iter().filter(|e| e.target == 14).count();
        // 10 same-kind edges plus the sequential one.
        assert_eq!(into_last, 11);
        assert!(graph.edges.iter().all(|e| e.target - e.source <= SAME_KIND_WINDOW));
    }

    #[test]
    fn test_importance_normalized() {
        let importance = ImportanceGraph::compute(&records(&[
            "user", "assistant", "summary", "user", "assistant", "system",
        ]));
        assert_eq!(importance.len(), 6);
        assert!(importance.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(importance.iter().any(|v| *v == 0.0));
        assert!(importance.iter().any(|v| (*v - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_single_node_keeps_raw_value() {
        let importance = ImportanceGraph::compute(&records(&["summary"]));
        assert!((importance[0] - 0.15 * 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_features_layout() {
        let graph = ImportanceGraph::build(&records(&["user", "tool_use", "mystery"]));
        assert_eq!(graph.nodes[0].features[0], 1.0);
        assert_eq!(graph.nodes[1].features[6], 1.0);
        assert!(graph.nodes[2].features[..KIND_SLOTS].iter().all(|v| *v == 0.0));
        assert!((graph.nodes[1].features[KIND_SLOTS] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_graph() {
        assert!(ImportanceGraph::compute(&[]).is_empty());
    }
}
