use std::fmt::Display;
use std::ops::{Add, AddAssign};

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ClusterProgress {
    pub sub_clusters: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub nodes: usize,
    pub edges: usize,
}

impl ClusterProgress {
    pub fn accepted(nodes: usize, edges: usize) -> Self {
        Self {
            sub_clusters: 1,
            accepted: 1,
            nodes,
            edges,
            ..Default::default()
        }
    }

    pub fn rejected() -> Self {
        Self {
            sub_clusters: 1,
            rejected: 1,
            ..Default::default()
        }
    }
}

impl Add for ClusterProgress {
    type Output = ClusterProgress;

    fn add(self, rhs: Self) -> Self::Output {
        let mut dup = self.clone();
        dup += rhs;
        dup
    }
}

impl AddAssign for ClusterProgress {
    fn add_assign(&mut self, rhs: Self) {
        self.sub_clusters += rhs.sub_clusters;
        self.accepted += rhs.accepted;
        self.rejected += rhs.rejected;
        self.nodes += rhs.nodes;
        self.edges += rhs.edges;
    }
}

impl Display for ClusterProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Sub-clusters: {} | Accepted: {} | Rejected: {} | Nodes: {} | Edges: {}",
            self.sub_clusters, self.accepted, self.rejected, self.nodes, self.edges
        )
    }
}
