//! MPI communication context.
//!
//! Requires the `mpi` feature and an MPI installation. The universe must
//! outlive every `MpiComm` built from it:
//!
//! ```ignore
//! let universe = mpi::initialize().expect("MPI init failed");
//! let comm = MpiComm::new(&universe);
//! ```
//!
//! Complex buffers travel as interleaved `f64` pairs.

use {
    super::{Communicator, Tag},
    mpi::{
        collective::SystemOperation,
        point_to_point::send_receive_into_with_tags,
        environment::Universe,
        topology::SimpleCommunicator,
        traits::{Communicator as _, CommunicatorCollectives, Destination, Source},
    },
    num_complex::Complex64,
};

/// Owns a duplicate of an MPI communicator, so its tags never collide
/// with messages of other libraries sharing the processes.
pub struct MpiComm {
    comm: SimpleCommunicator,
}

impl MpiComm {
    /// Context spanning every process of `universe`.
    pub fn new(universe: &Universe) -> Self {
        Self::from_communicator(&universe.world())
    }

    /// Context on the processes of `comm`.
    pub fn from_communicator(comm: &SimpleCommunicator) -> Self {
        MpiComm {
            comm: comm.duplicate(),
        }
    }

    fn world(&self) -> &SimpleCommunicator {
        &self.comm
    }
}

// SAFETY: MPI handles are plain identifiers. Collectives and point to point
// calls are only issued from the thread driving the operators, never from
// the rayon workers.
unsafe impl Send for MpiComm {}
unsafe impl Sync for MpiComm {}

fn interleave(data: &[Complex64]) -> Vec<f64> {
    let mut raw = Vec::with_capacity(2 * data.len());
    for c in data {
        raw.push(c.re);
        raw.push(c.im);
    }
    raw
}

fn deinterleave(raw: &[f64], buf: &mut [Complex64]) {
    for (c, pair) in buf.iter_mut().zip(raw.chunks_exact(2)) {
        *c = Complex64::new(pair[0], pair[1]);
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.world().rank() as usize
    }

    fn size(&self) -> usize {
        self.world().size() as usize
    }

    fn send(&self, data: &[Complex64], dest: usize, tag: Tag) {
        let raw = interleave(data);
        self.world()
            .process_at_rank(dest as i32)
            .send_with_tag(&raw[..], tag);
    }

    fn receive(&self, buf: &mut [Complex64], source: usize, tag: Tag) {
        let mut raw = vec![0.0; 2 * buf.len()];
        self.world()
            .process_at_rank(source as i32)
            .receive_into_with_tag(&mut raw[..], tag);
        deinterleave(&raw, buf);
    }

    fn send_receive(
        &self,
        data: &[Complex64],
        dest: usize,
        buf: &mut [Complex64],
        source: usize,
        tag: Tag,
    ) {
        let world = self.world();
        let raw = interleave(data);
        let mut received = vec![0.0; 2 * buf.len()];

        send_receive_into_with_tags(
            &raw[..],
            &world.process_at_rank(dest as i32),
            tag,
            &mut received[..],
            &world.process_at_rank(source as i32),
            tag,
        );
        deinterleave(&received, buf);
    }

    fn all_gather(&self, value: usize) -> Vec<usize> {
        let world = self.world();
        let mut gathered = vec![0u64; world.size() as usize];
        world.all_gather_into(&(value as u64), &mut gathered[..]);
        gathered.into_iter().map(|v| v as usize).collect()
    }

    fn all_reduce_sum(&self, value: f64) -> f64 {
        let mut sum = 0.0f64;
        self.world()
            .all_reduce_into(&value, &mut sum, SystemOperation::sum());
        sum
    }

    fn barrier(&self) {
        self.world().barrier();
    }
}
