//! A scripted proofreader driving a session toward a known ground truth.

use std::collections::{BTreeMap, BTreeSet};
use std::net::ToSocketAddrs;

use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::config::SimulatorConfig;
use crate::error::Result;
use crate::protocol::{Channel, Envelope, LookupTable, TcpChannel};
use crate::volume::LabelVolume;

/// Voxel overlap between the labels of two aligned volumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContingencyTable {
    /// row label -> column label -> overlapping voxels
    cells: BTreeMap<u64, BTreeMap<u64, u64>>,
}

impl ContingencyTable {
    pub fn new(rows: &LabelVolume, columns: &LabelVolume) -> Result<Self> {
        rows.check_aligned(columns)?;
        let mut cells: BTreeMap<u64, BTreeMap<u64, u64>> = BTreeMap::new();
        for (&row, &column) in rows.data().iter().zip(columns.data()) {
            *cells.entry(row).or_default().entry(column).or_default() += 1;
        }
        Ok(Self { cells })
    }

    pub fn overlap(&self, row: u64, column: u64) -> u64 {
        self.cells
            .get(&row)
            .and_then(|columns| columns.get(&column))
            .copied()
            .unwrap_or(0)
    }

    pub fn rows(&self) -> impl Iterator<Item = u64> + '_ {
        self.cells.keys().copied()
    }

    /// Distinct column labels, ascending.
    pub fn columns(&self) -> Vec<u64> {
        let columns: BTreeSet<u64> = self
            .cells
            .values()
            .flat_map(|columns| columns.keys().copied())
            .collect();
        columns.into_iter().collect()
    }

    /// Rows overlapping `column`, ascending.
    pub fn column(&self, column: u64) -> Vec<u64> {
        self.cells
            .iter()
            .filter(|(_, columns)| columns.get(&column).is_some_and(|&n| n > 0))
            .map(|(&row, _)| row)
            .collect()
    }

    /// Column with the largest overlap with `row`; ties go to the smaller
    /// label.
    pub fn best_column(&self, row: u64) -> Option<u64> {
        let mut best: Option<(u64, u64)> = None;
        for (&column, &count) in self.cells.get(&row)? {
            if best.is_none_or(|(_, most)| count > most) {
                best = Some((column, count));
            }
        }
        best.map(|(column, _)| column)
    }
}

/// The closest segmentation to `truth` that can be built by merging
/// fragments: each fragment takes the ground-truth label it overlaps most.
/// Boundary voxels stay boundary.
pub fn best_segmentation(
    fragments: &LabelVolume,
    truth: &LabelVolume,
    boundary_body: u64,
) -> Result<LabelVolume> {
    let table = ContingencyTable::new(fragments, truth)?;
    let assignment: BTreeMap<u64, u64> = table
        .rows()
        .map(|fragment| {
            let label = if fragment == boundary_body {
                boundary_body
            } else {
                table.best_column(fragment).unwrap_or(boundary_body)
            };
            (fragment, label)
        })
        .collect();
    let data = fragments
        .data()
        .iter()
        .map(|f| assignment.get(f).copied().unwrap_or(boundary_body))
        .collect();
    LabelVolume::new(fragments.shape().to_vec(), data)
}

/// Face adjacency between labels, boundary included.
pub fn label_adjacency(labels: &LabelVolume) -> BTreeMap<u64, BTreeSet<u64>> {
    let mut adjacency: BTreeMap<u64, BTreeSet<u64>> = BTreeMap::new();
    let data = labels.data();
    labels.for_each_face_pair(|i, j| {
        let (a, b) = (data[i], data[j]);
        if a != b {
            adjacency.entry(a).or_default().insert(b);
            adjacency.entry(b).or_default().insert(a);
        }
    });
    adjacency
}

/// Replays ground truth as proofreading commands.
///
/// For each ground-truth segment, in shuffled order, the simulator sends one
/// `merge` with every fragment of that segment, then a `separate` for every
/// fragment of the segment and each neighbor outside it.
#[derive(Debug, Clone)]
pub struct Simulator {
    config: SimulatorConfig,
    table: ContingencyTable,
    adjacency: BTreeMap<u64, BTreeSet<u64>>,
}

impl Simulator {
    pub fn new(fragments: &LabelVolume, truth: &LabelVolume, config: SimulatorConfig) -> Result<Self> {
        let best = best_segmentation(fragments, truth, config.boundary_body)?;
        let table = ContingencyTable::new(fragments, &best)?;
        let adjacency = label_adjacency(fragments);
        Ok(Self {
            config,
            table,
            adjacency,
        })
    }

    pub fn table(&self) -> &ContingencyTable {
        &self.table
    }

    /// Ground-truth labels in the order they will be painted.
    fn painting_order(&self) -> Vec<u64> {
        let mut labels: Vec<u64> = self
            .table
            .columns()
            .into_iter()
            .filter(|&label| label != self.config.boundary_body)
            .collect();
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        labels.shuffle(&mut rng);
        labels
    }

    /// Commands for up to `num_operations` segments, without the final
    /// request.
    pub fn script(&self) -> Vec<Envelope> {
        let mut script = Vec::new();
        for label in self
            .painting_order()
            .into_iter()
            .take(self.config.num_operations)
        {
            let components: Vec<u64> = self
                .table
                .column(label)
                .into_iter()
                .filter(|&f| f != self.config.boundary_body)
                .collect();
            debug!("painting segment {label} over fragments {components:?}");
            script.push(Envelope::merge(&components));

            for &fragment in &components {
                let Some(neighbors) = self.adjacency.get(&fragment) else {
                    continue;
                };
                for &neighbor in neighbors {
                    if !components.contains(&neighbor) {
                        script.push(Envelope::separate(fragment, neighbor));
                    }
                }
            }
        }
        script
    }

    /// Send the script, request the lookup table and return it.
    pub fn run(&self, channel: &mut dyn Channel) -> Result<LookupTable> {
        let script = self.script();
        info!("sending {} proofreading commands", script.len());
        for envelope in &script {
            channel.send(envelope)?;
        }
        channel.send(&Envelope::request_lut())?;
        let table = LookupTable::from_envelope(&channel.recv()?)?;
        info!(
            "received lookup table: {} fragments in {} segments",
            table.len(),
            table.segment_count()
        );
        if self.config.stop_when_finished {
            channel.send(&Envelope::stop())?;
        }
        Ok(table)
    }
}

/// Proofread a session listening at `address`.
pub fn proofread<A: ToSocketAddrs>(
    fragments: &LabelVolume,
    truth: &LabelVolume,
    address: A,
    config: SimulatorConfig,
) -> Result<LookupTable> {
    let simulator = Simulator::new(fragments, truth, config)?;
    let mut channel = TcpChannel::connect(address)?;
    simulator.run(&mut channel)
}
