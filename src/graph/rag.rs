//! Region adjacency graph over the fragments of a label volume.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::error::{ProofreadError, Result};
use crate::graph::forest::MergeForest;
use crate::graph::policy::{BoundaryMean, MergePolicy};
use crate::graph::queue::{MergeQueue, QueueEntry};
use crate::volume::{ImageVolume, LabelVolume};

/// Statistics of a live node (a fragment or a merged segment).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeData {
    /// Number of voxels.
    pub size: u64,
    /// Sum of normalized image intensities over the node's voxels.
    pub intensity_sum: f64,
    /// Separation tags; nodes sharing a tag are never agglomerated.
    pub exclusions: BTreeSet<usize>,
    version: u64,
}

impl NodeData {
    pub fn mean_intensity(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            self.intensity_sum / self.size as f64
        }
    }
}

/// Statistics of the contact surface between two live nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EdgeData {
    /// Number of touching voxel faces.
    pub contact: u64,
    /// Sum of the mean intensity across each touching face.
    pub intensity_sum: f64,
}

impl EdgeData {
    pub fn mean_intensity(&self) -> f64 {
        if self.contact == 0 {
            0.0
        } else {
            self.intensity_sum / self.contact as f64
        }
    }

    fn absorb(&mut self, other: &EdgeData) {
        self.contact += other.contact;
        self.intensity_sum += other.intensity_sum;
    }
}

/// One recorded correction, replayed onto a rebuilt graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStep {
    /// Merge the current segments of two ids.
    Merge(u64, u64),
    /// Split two fragments apart and tag both sides with `tag`.
    Separate { f0: u64, f1: u64, tag: usize },
}

#[derive(Debug, Clone)]
struct RagState {
    forest: MergeForest,
    nodes: BTreeMap<u64, NodeData>,
    edges: BTreeMap<u64, BTreeMap<u64, EdgeData>>,
    /// Every merge applied since construction, as (kept, absorbed) roots.
    merges: Vec<(u64, u64)>,
    /// Every exclusion tag applied, as (fragment, tag).
    exclusions: Vec<(u64, usize)>,
}

/// Region adjacency graph with union-find merge semantics.
///
/// Live nodes are exactly the roots of the merge forest. Merging `s1` into
/// `s0` keeps the id `s0`, so every segment id is also a fragment id. The
/// graph remembers its pristine state, which lets [`Rag::separate_fragments`]
/// undo merges by replaying its own merge record.
#[derive(Clone)]
pub struct Rag {
    state: RagState,
    pristine: Arc<RagState>,
    policy: Arc<dyn MergePolicy>,
    queue: MergeQueue,
    boundary_body: u64,
    has_image: bool,
}

impl fmt::Debug for Rag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rag")
            .field("fragments", &self.fragments().len())
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .field("merges", &self.state.merges.len())
            .field("policy", &self.policy.name())
            .field("boundary_body", &self.boundary_body)
            .finish()
    }
}

/// Scale an image into [0, 1] by its maximum.
fn normalize(image: &ImageVolume) -> Vec<f64> {
    let max = image.data().iter().copied().fold(0.0_f64, f64::max);
    if max > 0.0 {
        image
            .data()
            .iter()
            .map(|&v| (v / max).clamp(0.0, 1.0))
            .collect()
    } else {
        vec![0.0; image.len()]
    }
}

impl Rag {
    /// Build the graph of a label volume.
    ///
    /// `image` may be empty; otherwise it must have the shape of `labels`.
    /// Voxels labeled `boundary_body` belong to no node.
    pub fn new(labels: &LabelVolume, image: &ImageVolume, boundary_body: u64) -> Result<Self> {
        let has_image = !image.is_empty();
        if has_image {
            labels.check_aligned(image)?;
        }
        let intensities = if has_image { normalize(image) } else { Vec::new() };
        let value = |i: usize| intensities.get(i).copied().unwrap_or(0.0);

        let fragments = labels.fragments(boundary_body);
        let mut nodes: BTreeMap<u64, NodeData> = fragments
            .iter()
            .map(|&f| (f, NodeData::default()))
            .collect();
        for (i, label) in labels.data().iter().enumerate() {
            if let Some(node) = nodes.get_mut(label) {
                node.size += 1;
                node.intensity_sum += value(i);
            }
        }

        let mut edges: BTreeMap<u64, BTreeMap<u64, EdgeData>> = fragments
            .iter()
            .map(|&f| (f, BTreeMap::new()))
            .collect();
        let data = labels.data();
        labels.for_each_face_pair(|a, b| {
            let (la, lb) = (data[a], data[b]);
            if la == lb || la == boundary_body || lb == boundary_body {
                return;
            }
            let face = EdgeData {
                contact: 1,
                intensity_sum: (value(a) + value(b)) / 2.0,
            };
            for (x, y) in [(la, lb), (lb, la)] {
                edges.entry(x).or_default().entry(y).or_default().absorb(&face);
            }
        });

        let state = RagState {
            forest: MergeForest::new(&fragments),
            nodes,
            edges,
            merges: Vec::new(),
            exclusions: Vec::new(),
        };
        let mut rag = Rag {
            pristine: Arc::new(state.clone()),
            state,
            policy: Arc::new(BoundaryMean),
            queue: MergeQueue::new(),
            boundary_body,
            has_image,
        };
        rag.rebuild_merge_queue();
        debug!(
            "built region adjacency graph: {} fragments, {} edges",
            rag.node_count(),
            rag.edge_count()
        );
        Ok(rag)
    }

    pub fn boundary_body(&self) -> u64 {
        self.boundary_body
    }

    pub fn has_image(&self) -> bool {
        self.has_image
    }

    /// Original fragment ids, sorted.
    pub fn fragments(&self) -> &[u64] {
        self.state.forest.ids()
    }

    pub fn node_count(&self) -> usize {
        self.state.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.state.edges.values().map(BTreeMap::len).sum::<usize>() / 2
    }

    /// Ids of the live nodes.
    pub fn nodes(&self) -> impl Iterator<Item = u64> + '_ {
        self.state.nodes.keys().copied()
    }

    /// Whether `id` is a live node.
    pub fn contains(&self, id: u64) -> bool {
        self.state.nodes.contains_key(&id)
    }

    pub fn node(&self, id: u64) -> Option<&NodeData> {
        self.state.nodes.get(&id)
    }

    pub fn edge(&self, a: u64, b: u64) -> Option<&EdgeData> {
        self.state.edges.get(&a)?.get(&b)
    }

    pub fn has_edge(&self, a: u64, b: u64) -> bool {
        self.edge(a, b).is_some()
    }

    /// Live neighbors of `id`, in ascending order.
    pub fn neighbors(&self, id: u64) -> impl Iterator<Item = u64> + '_ {
        self.state
            .edges
            .get(&id)
            .into_iter()
            .flat_map(|neighbors| neighbors.keys().copied())
    }

    /// Highest ancestor of a fragment or segment id.
    pub fn find(&self, id: u64) -> Result<u64> {
        self.state
            .forest
            .find(id)
            .ok_or(ProofreadError::UnknownNode(id))
    }

    fn find_mut(&mut self, id: u64) -> Result<u64> {
        self.state
            .forest
            .find_mut(id)
            .ok_or(ProofreadError::UnknownNode(id))
    }

    /// Merges applied since construction, as (kept, absorbed) pairs.
    pub fn merge_record(&self) -> &[(u64, u64)] {
        &self.state.merges
    }

    pub fn exclusions(&self, id: u64) -> Option<&BTreeSet<usize>> {
        self.node(id).map(|node| &node.exclusions)
    }

    /// Whether two live nodes carry a common separation tag.
    pub fn shares_exclusion(&self, a: u64, b: u64) -> bool {
        match (self.node(a), self.node(b)) {
            (Some(x), Some(y)) => !x.exclusions.is_disjoint(&y.exclusions),
            _ => false,
        }
    }

    fn tag(&mut self, fragment: u64, tag: usize) -> Result<u64> {
        let root = self.find_mut(fragment)?;
        if let Some(node) = self.state.nodes.get_mut(&root) {
            node.exclusions.insert(tag);
            node.version += 1;
        }
        Ok(root)
    }

    /// Tag the current ancestor of `fragment` with a separation tag.
    pub fn add_exclusion(&mut self, fragment: u64, tag: usize) -> Result<u64> {
        let root = self.tag(fragment, tag)?;
        self.state.exclusions.push((fragment, tag));
        self.enqueue_neighbors(root);
        Ok(root)
    }

    pub fn policy(&self) -> &Arc<dyn MergePolicy> {
        &self.policy
    }

    /// Install a merge policy and rebuild the merge queue under it.
    pub fn set_policy(&mut self, policy: Arc<dyn MergePolicy>) {
        self.policy = policy;
        self.rebuild_merge_queue();
    }

    /// Priority of merging two live nodes; lower merges first.
    pub fn merge_priority(&self, a: u64, b: u64) -> f64 {
        if self.shares_exclusion(a, b) {
            f64::INFINITY
        } else {
            self.policy.priority(self, a, b)
        }
    }

    /// Recompute the priority of every live edge.
    pub fn rebuild_merge_queue(&mut self) {
        self.queue.clear();
        let pairs: Vec<(u64, u64)> = self
            .state
            .edges
            .iter()
            .flat_map(|(&a, neighbors)| {
                neighbors
                    .keys()
                    .filter(move |&&b| a < b)
                    .map(move |&b| (a, b))
            })
            .collect();
        for (a, b) in pairs {
            self.enqueue(a, b);
        }
    }

    fn version(&self, id: u64) -> u64 {
        self.state.nodes.get(&id).map_or(0, |node| node.version)
    }

    fn enqueue(&mut self, a: u64, b: u64) {
        let priority = self.merge_priority(a, b);
        let versions = (self.version(a), self.version(b));
        self.queue.push(QueueEntry {
            priority,
            a,
            b,
            versions,
        });
    }

    fn enqueue_neighbors(&mut self, id: u64) {
        let neighbors: Vec<u64> = self.neighbors(id).collect();
        for neighbor in neighbors {
            self.enqueue(id, neighbor);
        }
    }

    fn is_current(&self, entry: &QueueEntry) -> bool {
        self.has_edge(entry.a, entry.b)
            && entry.versions == (self.version(entry.a), self.version(entry.b))
    }

    /// Merge live node `s1` into live node `s0` and return the result id.
    pub fn merge_nodes(&mut self, s0: u64, s1: u64) -> Result<u64> {
        let root = self.apply_merge(s0, s1)?;
        self.enqueue_neighbors(root);
        Ok(root)
    }

    fn apply_merge(&mut self, s0: u64, s1: u64) -> Result<u64> {
        if s0 == s1 {
            return Err(ProofreadError::invalid_selection(format!(
                "cannot merge segment {s0} with itself"
            )));
        }
        for id in [s0, s1] {
            if !self.contains(id) {
                return Err(ProofreadError::UnknownNode(id));
            }
        }
        if !self.state.forest.union(s0, s1) {
            return Err(ProofreadError::other(format!(
                "segments {s0} and {s1} are live but not both roots of the merge forest"
            )));
        }
        let absorbed = self
            .state
            .nodes
            .remove(&s1)
            .ok_or(ProofreadError::UnknownNode(s1))?;
        let absorbed_edges = self.state.edges.remove(&s1).unwrap_or_default();

        for (neighbor, edge) in absorbed_edges {
            if neighbor == s0 {
                if let Some(edges) = self.state.edges.get_mut(&s0) {
                    edges.remove(&s1);
                }
                continue;
            }
            if let Some(edges) = self.state.edges.get_mut(&neighbor) {
                edges.remove(&s1);
                edges.entry(s0).or_default().absorb(&edge);
            }
            self.state
                .edges
                .entry(s0)
                .or_default()
                .entry(neighbor)
                .or_default()
                .absorb(&edge);
        }

        if let Some(node) = self.state.nodes.get_mut(&s0) {
            node.size += absorbed.size;
            node.intensity_sum += absorbed.intensity_sum;
            node.exclusions.extend(absorbed.exclusions);
            node.version += 1;
        }
        self.state.merges.push((s0, s1));
        Ok(s0)
    }

    /// Merge the lowest-priority live edge while its priority is below
    /// `threshold`. Returns the number of merges.
    pub fn agglomerate(&mut self, threshold: f64) -> Result<usize> {
        let mut merged = 0;
        while let Some(entry) = self.queue.pop() {
            if !self.is_current(&entry) {
                continue;
            }
            if !(entry.priority < threshold) {
                self.queue.push(entry);
                break;
            }
            self.merge_nodes(entry.a, entry.b)?;
            merged += 1;
        }
        debug!(
            "agglomerated {merged} merges at threshold {threshold}, {} nodes remain",
            self.node_count()
        );
        Ok(merged)
    }

    /// Undo just enough merges that `f0` and `f1` resolve to different nodes.
    ///
    /// The graph is rebuilt from its pristine state and its merge record is
    /// replayed, skipping every merge that would join the two fragments'
    /// components or whose sides are no longer adjacent. Returns the
    /// resulting (segment of `f0`, segment of `f1`).
    pub fn separate_fragments(&mut self, f0: u64, f1: u64) -> Result<(u64, u64)> {
        if f0 == f1 {
            return Err(ProofreadError::invalid_selection(format!(
                "cannot separate fragment {f0} from itself"
            )));
        }
        let (s0, s1) = (self.find_mut(f0)?, self.find_mut(f1)?);
        if s0 != s1 {
            return Ok((s0, s1));
        }

        let merges = std::mem::take(&mut self.state.merges);
        let exclusions = std::mem::take(&mut self.state.exclusions);
        self.state = (*self.pristine).clone();
        for &(fragment, tag) in &exclusions {
            self.tag(fragment, tag)?;
        }
        self.state.exclusions = exclusions;

        let mut undone = 0;
        for (a, b) in merges {
            let (ra, rb) = (self.find_mut(a)?, self.find_mut(b)?);
            if ra == rb {
                continue;
            }
            let (r0, r1) = (self.find_mut(f0)?, self.find_mut(f1)?);
            let joins = (ra == r0 && rb == r1) || (ra == r1 && rb == r0);
            // Merges that only touched through an undone merge go too.
            if joins || !self.has_edge(ra, rb) {
                undone += 1;
                continue;
            }
            self.apply_merge(ra, rb)?;
        }
        self.rebuild_merge_queue();
        debug!("separated fragments {f0} and {f1} by undoing {undone} merges");
        Ok((self.find_mut(f0)?, self.find_mut(f1)?))
    }

    /// Replay a correction history in the order it was given.
    ///
    /// Merges resolve both ids to their current ancestors and are skipped
    /// when the two are already joined or no longer adjacent. Separations go
    /// through [`Rag::separate_fragments`] and then tag both sides, so a later
    /// merge of the same pair still applies.
    pub fn replay_history<I>(&mut self, history: I) -> Result<()>
    where
        I: IntoIterator<Item = ReplayStep>,
    {
        let mut skipped = 0;
        for step in history {
            match step {
                ReplayStep::Merge(s0, s1) => {
                    let (r0, r1) = (self.find_mut(s0)?, self.find_mut(s1)?);
                    if r0 == r1 || !self.has_edge(r0, r1) {
                        skipped += 1;
                        continue;
                    }
                    self.apply_merge(r0, r1)?;
                }
                ReplayStep::Separate { f0, f1, tag } => {
                    self.separate_fragments(f0, f1)?;
                    self.add_exclusion(f0, tag)?;
                    self.add_exclusion(f1, tag)?;
                }
            }
        }
        self.rebuild_merge_queue();
        debug!(
            "replayed history: {} merges in effect, {skipped} skipped",
            self.state.merges.len()
        );
        Ok(())
    }

    /// Segment id of every original fragment, as parallel sequences.
    pub fn segment_map(&self) -> (Vec<u64>, Vec<u64>) {
        let fragments = self.fragments().to_vec();
        let segments = fragments
            .iter()
            .map(|&f| self.state.forest.find(f).unwrap_or(f))
            .collect();
        (fragments, segments)
    }
}
