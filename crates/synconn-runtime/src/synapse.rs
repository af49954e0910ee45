//! Chemical synapse connectivity with spike replay

use crate::{
    collaborators::{Collaborators, Instantiator},
    discovery::ConnectionKind,
    error::Result,
    manager::ConnectionManager,
};

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;
use synconn_index::{Gid, ReplayStimulus, SynapseMode};

/// Spike times per source gid
pub type SpikeTrains = HashMap<Gid, Arc<[f64]>>;

/// Connection manager for chemical synapses
pub struct SynapseConnectionManager<E> {
    inner: ConnectionManager<E>,
}

impl<E: Instantiator> SynapseConnectionManager<E> {
    /// Open the synapse file of a circuit
    pub fn open(circuit_path: &Path, collab: Collaborators<E>) -> Result<Self> {
        Ok(Self {
            inner: ConnectionManager::open(circuit_path, ConnectionKind::Synapses, collab)?,
        })
    }

    /// Set the receptor placement mode for new records by name
    /// (`"AmpaOnly"` or `"DualSyns"`, case-insensitive)
    pub fn with_synapse_mode(mut self, mode: &str) -> Result<Self> {
        let mode: SynapseMode = mode.parse()?;
        log::debug!("Synapse mode: {}", mode);
        self.inner.set_synapse_mode(mode);
        Ok(self)
    }

    /// Instantiate every pending synapse connection
    pub fn finalize(&mut self, base_seed: u64) -> Result<u64> {
        self.inner.instantiate_all(base_seed, |_| Ok(None))
    }

    /// Tag the live records from spiking sources onto `target_name` members for replay.
    ///
    /// Returns the number of tagged records across all ranks. Events before
    /// `start_delay` are suppressed by the engine.
    pub fn replay(&mut self, spikes: &SpikeTrains, target_name: &str, start_delay: f64) -> Result<u64> {
        let target = self.inner.targets.get_target(target_name)?;
        let mut tagged = 0u64;
        for set in self.inner.populations.values_mut() {
            for (dest, conns) in set.iter_mut() {
                if !target.contains(dest) {
                    continue;
                }
                for conn in conns.iter_mut() {
                    if let Some(times) = spikes.get(&conn.source()) {
                        conn.replay = Some(ReplayStimulus {
                            spike_times: Arc::clone(times),
                            start_delay,
                        });
                        tagged += 1;
                    }
                }
            }
        }

        let total = self.inner.comm.allreduce_sum(tagged);
        if self.inner.comm.rank() == 0 {
            if total == 0 {
                log::warn!("No connections were found to replay spikes onto {}", target_name);
            } else {
                log::info!("Replaying spikes on {} connections onto {}", total, target_name);
            }
        }
        Ok(total)
    }
}

impl<E> Deref for SynapseConnectionManager<E> {
    type Target = ConnectionManager<E>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<E> DerefMut for SynapseConnectionManager<E> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
