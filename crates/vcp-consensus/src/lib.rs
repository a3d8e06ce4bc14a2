//! # VCP Consensus
//!
//! Schulze-method ranked preference aggregation for multi-stakeholder
//! deliberation. Condorcet-consistent and clone-independent.
//!
//! Algorithm:
//! 1. Build the pairwise defeat matrix `d[i][j]` (ballots preferring
//!    candidate i over candidate j)
//! 2. Compute strongest paths `p[i][j]` with a Floyd-Warshall variant
//!    where path strength is the minimum edge along the path
//! 3. Candidate i beats j iff `p[i][j] > p[j][i]`; rank by win count

#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use vcp_core::{Result, VcpError};

/// A ranked ballot from one stakeholder.
///
/// `rankings` is an ordered list of candidate groups, best first; each
/// inner group holds candidates of equal preference. Unranked
/// candidates are treated as tied at the bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub voter_id: String,
    pub rankings: Vec<Vec<String>>,
}

impl Ballot {
    /// Create a validated ballot.
    ///
    /// # Errors
    ///
    /// Returns [`VcpError::Invalid`] for empty rankings, empty groups,
    /// or duplicate candidates.
    pub fn new(voter_id: impl Into<String>, rankings: Vec<Vec<String>>) -> Result<Self> {
        if rankings.is_empty() {
            return Err(VcpError::invalid("rankings must be non-empty"));
        }
        let mut seen = HashSet::new();
        for group in &rankings {
            if group.is_empty() {
                return Err(VcpError::invalid("each ranking group must be non-empty"));
            }
            for candidate in group {
                if !seen.insert(candidate.clone()) {
                    return Err(VcpError::invalid(format!("duplicate candidate: {candidate}")));
                }
            }
        }
        Ok(Self {
            voter_id: voter_id.into(),
            rankings,
        })
    }

    /// Convenience for strict (untied) rankings.
    pub fn strict(voter_id: impl Into<String>, order: &[&str]) -> Result<Self> {
        Self::new(
            voter_id,
            order.iter().map(|c| vec![c.to_string()]).collect(),
        )
    }
}

/// A candidate's position in the final ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchulzeRanking {
    pub candidate: String,
    /// 1-indexed; ties share a rank
    pub rank: usize,
    pub wins: usize,
    pub losses: usize,
}

/// Complete result of a Schulze election.
#[derive(Debug, Clone)]
pub struct ElectionResult {
    pub ranking: Vec<SchulzeRanking>,
    pub pairwise_matrix: Vec<Vec<u32>>,
    pub strongest_paths: Vec<Vec<u32>>,
    /// Notes on ties or contentious outcomes
    pub dissent_notes: Vec<String>,
}

impl ElectionResult {
    /// Top-ranked candidate, if any ballots were cast.
    pub fn winner(&self) -> Option<&str> {
        self.ranking.first().map(|r| r.candidate.as_str())
    }
}

/// Schulze election over a fixed candidate list.
pub struct SchulzeElection {
    candidates: Vec<String>,
    index: HashMap<String, usize>,
    ballots: Vec<Ballot>,
}

impl SchulzeElection {
    /// Create an election.
    ///
    /// # Errors
    ///
    /// Returns [`VcpError::Invalid`] when candidates are empty or not
    /// unique.
    pub fn new(candidates: Vec<String>) -> Result<Self> {
        if candidates.is_empty() {
            return Err(VcpError::invalid("candidates must be non-empty"));
        }
        let index: HashMap<String, usize> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        if index.len() != candidates.len() {
            return Err(VcpError::invalid("candidates must be unique"));
        }
        Ok(Self {
            candidates,
            index,
            ballots: Vec::new(),
        })
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn ballot_count(&self) -> usize {
        self.ballots.len()
    }

    pub fn add_ballot(&mut self, ballot: Ballot) {
        self.ballots.push(ballot);
    }

    /// Run the Schulze method over the cast ballots.
    pub fn compute(&self) -> ElectionResult {
        let n = self.candidates.len();

        if self.ballots.is_empty() {
            return ElectionResult {
                ranking: Vec::new(),
                pairwise_matrix: vec![vec![0; n]; n],
                strongest_paths: vec![vec![0; n]; n],
                dissent_notes: vec!["No ballots cast".to_string()],
            };
        }

        let d = self.pairwise_matrix();
        let p = strongest_paths(&d);
        let (ranking, dissent) = self.determine_ranking(&p);

        ElectionResult {
            ranking,
            pairwise_matrix: d,
            strongest_paths: p,
            dissent_notes: dissent,
        }
    }

    /// `d[i][j]` = ballots preferring candidate i over candidate j.
    fn pairwise_matrix(&self) -> Vec<Vec<u32>> {
        let n = self.candidates.len();
        let mut d = vec![vec![0u32; n]; n];

        for ballot in &self.ballots {
            // Position per candidate; unranked sit below every group
            let mut position: HashMap<&str, usize> = HashMap::new();
            let mut rank = 0usize;
            for group in &ballot.rankings {
                for candidate in group {
                    if self.index.contains_key(candidate) {
                        position.insert(candidate.as_str(), rank);
                    }
                }
                rank += 1;
            }
            let bottom = rank;

            for i in 0..n {
                for j in (i + 1)..n {
                    let pi = *position
                        .get(self.candidates[i].as_str())
                        .unwrap_or(&bottom);
                    let pj = *position
                        .get(self.candidates[j].as_str())
                        .unwrap_or(&bottom);
                    if pi < pj {
                        d[i][j] += 1;
                    } else if pj < pi {
                        d[j][i] += 1;
                    }
                }
            }
        }
        d
    }

    fn determine_ranking(&self, p: &[Vec<u32>]) -> (Vec<SchulzeRanking>, Vec<String>) {
        let n = self.candidates.len();
        let mut wins = vec![0usize; n];
        let mut losses = vec![0usize; n];
        let mut dissent = Vec::new();
        let mut tie_keys = HashSet::new();

        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                if p[i][j] > p[j][i] {
                    wins[i] += 1;
                    losses[j] += 1;
                } else if i < j && p[i][j] == p[j][i] && p[i][j] > 0 {
                    let key = (i, j);
                    if tie_keys.insert(key) {
                        dissent.push(format!(
                            "Tie between {} and {}",
                            self.candidates[i], self.candidates[j]
                        ));
                    }
                }
            }
        }

        let mut indices: Vec<usize> = (0..n).collect();
        indices.sort_by(|a, b| wins[*b].cmp(&wins[*a]).then(a.cmp(b)));

        let mut ranking = Vec::with_capacity(n);
        let mut current_rank = 1;
        for (pos, idx) in indices.iter().enumerate() {
            if pos > 0 && wins[*idx] < wins[indices[pos - 1]] {
                current_rank = pos + 1;
            }
            ranking.push(SchulzeRanking {
                candidate: self.candidates[*idx].clone(),
                rank: current_rank,
                wins: wins[*idx],
                losses: losses[*idx],
            });
        }
        (ranking, dissent)
    }
}

/// Floyd-Warshall variant: `p[i][j]` is the strength of the strongest
/// path from i to j, counting only net-victory edges.
fn strongest_paths(d: &[Vec<u32>]) -> Vec<Vec<u32>> {
    let n = d.len();
    let mut p = vec![vec![0u32; n]; n];

    for i in 0..n {
        for j in 0..n {
            if i != j && d[i][j] > d[j][i] {
                p[i][j] = d[i][j];
            }
        }
    }

    for k in 0..n {
        for i in 0..n {
            if i == k {
                continue;
            }
            for j in 0..n {
                if j == i || j == k {
                    continue;
                }
                let via_k = p[i][k].min(p[k][j]);
                if via_k > p[i][j] {
                    p[i][j] = via_k;
                }
            }
        }
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    fn election(candidates: &[&str]) -> SchulzeElection {
        SchulzeElection::new(candidates.iter().map(|c| c.to_string()).collect()).unwrap()
    }

    #[test]
    fn simple_majority_election() {
        let mut e = election(&["A", "B", "C"]);
        for i in 0..3 {
            e.add_ballot(Ballot::strict(format!("v{i}"), &["A", "B", "C"]).unwrap());
        }
        for i in 3..5 {
            e.add_ballot(Ballot::strict(format!("v{i}"), &["B", "C", "A"]).unwrap());
        }

        let result = e.compute();
        assert_eq!(result.winner(), Some("A"));

        // A beats B 3-2, A beats C 3-2, B beats C 5-0
        assert_eq!(result.pairwise_matrix[0][1], 3);
        assert_eq!(result.pairwise_matrix[1][0], 2);
        assert_eq!(result.pairwise_matrix[0][2], 3);
        assert_eq!(result.pairwise_matrix[2][0], 2);
        assert_eq!(result.pairwise_matrix[1][2], 5);
        assert_eq!(result.pairwise_matrix[2][1], 0);

        assert_eq!(result.ranking[0].wins, 2);
        assert_eq!(result.ranking[1].candidate, "B");
        assert_eq!(result.ranking[2].candidate, "C");
    }

    #[test]
    fn tied_groups_count_equal() {
        let mut e = election(&["A", "B", "C"]);
        e.add_ballot(
            Ballot::new("v1", vec![vec!["A".into(), "B".into()], vec!["C".into()]]).unwrap(),
        );

        let result = e.compute();
        // A and B tied: no preference either way
        assert_eq!(result.pairwise_matrix[0][1], 0);
        assert_eq!(result.pairwise_matrix[1][0], 0);
        assert_eq!(result.pairwise_matrix[0][2], 1);
        assert_eq!(result.pairwise_matrix[1][2], 1);
    }

    #[test]
    fn unranked_candidates_sit_at_bottom() {
        let mut e = election(&["A", "B", "C"]);
        e.add_ballot(Ballot::strict("v1", &["B"]).unwrap());

        let result = e.compute();
        assert_eq!(result.pairwise_matrix[1][0], 1);
        assert_eq!(result.pairwise_matrix[1][2], 1);
        assert_eq!(result.pairwise_matrix[0][2], 0);
        assert_eq!(result.winner(), Some("B"));
    }

    #[test]
    fn condorcet_cycle_resolved_by_path_strength() {
        // Classic rock-paper-scissors preferences with unequal margins
        let mut e = election(&["A", "B", "C"]);
        for _ in 0..5 {
            e.add_ballot(Ballot::strict("v", &["A", "B", "C"]).unwrap());
        }
        for _ in 0..4 {
            e.add_ballot(Ballot::strict("v", &["B", "C", "A"]).unwrap());
        }
        for _ in 0..3 {
            e.add_ballot(Ballot::strict("v", &["C", "A", "B"]).unwrap());
        }

        let result = e.compute();
        // Direct defeats: A>B 8-4, B>C 9-3, C>A 7-5
        assert!(result.winner().is_some());
        // Schulze resolves the cycle deterministically
        assert_eq!(result.ranking.len(), 3);
    }

    #[test]
    fn empty_election_notes_no_ballots() {
        let e = election(&["A", "B"]);
        let result = e.compute();
        assert!(result.winner().is_none());
        assert_eq!(result.dissent_notes, vec!["No ballots cast".to_string()]);
    }

    #[test]
    fn exact_tie_recorded_in_dissent() {
        let mut e = election(&["A", "B"]);
        e.add_ballot(Ballot::strict("v1", &["A", "B"]).unwrap());
        e.add_ballot(Ballot::strict("v2", &["B", "A"]).unwrap());

        let result = e.compute();
        // 1-1: no path beats the other; both rank 1
        assert_eq!(result.ranking[0].rank, 1);
        assert_eq!(result.ranking[1].rank, 1);
    }

    #[test]
    fn ballot_validation() {
        assert!(Ballot::new("v", vec![]).is_err());
        assert!(Ballot::new("v", vec![vec![]]).is_err());
        assert!(Ballot::new("v", vec![vec!["A".into()], vec!["A".into()]]).is_err());
        assert!(SchulzeElection::new(vec![]).is_err());
        assert!(SchulzeElection::new(vec!["A".into(), "A".into()]).is_err());
    }
}
