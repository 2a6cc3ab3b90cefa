use std::collections::BTreeMap;

/// A candidate identity: indices into the clustered record slice.
///
/// `representative` is fixed at creation and anchors pass-1 comparisons.
#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    pub representative: usize,
    pub members: Vec<usize>,
    pub episodes: BTreeMap<String, usize>,
}

impl Cluster {
    pub fn new(representative: usize, episode: String) -> Self {
        let mut cluster = Self {
            representative,
            members: Vec::new(),
            episodes: BTreeMap::new(),
        };
        cluster.push(representative, episode);
        cluster
    }

    pub fn push(&mut self, member: usize, episode: String) {
        self.members.push(member);
        *self.episodes.entry(episode).or_default() += 1;
    }

    /// Appends every member of `other`, keeping this cluster's representative.
    pub fn absorb(&mut self, other: Cluster) {
        self.members.extend(other.members);
        for (episode, count) in other.episodes {
            *self.episodes.entry(episode).or_default() += count;
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
