//! Explicit communication context shared by every distributed component.
//!
//! Nothing in this crate reaches for an ambient "world" communicator: the
//! context is created once by the caller and handed to the transform, the
//! decomposition and the operators at construction.
//!
//! All point-to-point operations are blocking. A send and its receive are
//! matched by (source, destination, tag); messages between the same pair of
//! ranks with the same tag are delivered in order.

#[cfg(feature = "mpi")]
mod mpi_comm;
mod threads;

#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;
pub use threads::ThreadComm;

use num_complex::Complex64;

/// Message tag
pub type Tag = i32;

pub trait Communicator: Send + Sync {
    /// Rank of this process
    fn rank(&self) -> usize;

    /// Number of ranks
    fn size(&self) -> usize;

    /// Blocking send of `data` to rank `dest`.
    fn send(&self, data: &[Complex64], dest: usize, tag: Tag);

    /// Blocking receive from rank `source` into `buf`, whose length must
    /// match the length of the message.
    fn receive(&self, buf: &mut [Complex64], source: usize, tag: Tag);

    /// Sends `data` to `dest` while receiving from `source` into `buf`.
    /// Safe to use in rotation patterns where every rank sends and
    /// receives at the same time.
    fn send_receive(
        &self,
        data: &[Complex64],
        dest: usize,
        buf: &mut [Complex64],
        source: usize,
        tag: Tag,
    );

    /// Gathers one integer per rank, in rank order, on every rank.
    fn all_gather(&self, value: usize) -> Vec<usize>;

    /// Sum of a scalar over all ranks, available on every rank.
    fn all_reduce_sum(&self, value: f64) -> f64;

    fn barrier(&self);
}

/// Communication context of a run on a single rank.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, _data: &[Complex64], dest: usize, tag: Tag) {
        panic!(
            "send to rank {} (tag {}) in a single process run",
            dest, tag
        );
    }

    fn receive(&self, _buf: &mut [Complex64], source: usize, tag: Tag) {
        panic!(
            "receive from rank {} (tag {}) in a single process run",
            source, tag
        );
    }

    fn send_receive(
        &self,
        data: &[Complex64],
        dest: usize,
        buf: &mut [Complex64],
        source: usize,
        _tag: Tag,
    ) {
        assert!(dest == 0 && source == 0, "no peer ranks");
        buf.copy_from_slice(data);
    }

    fn all_gather(&self, value: usize) -> Vec<usize> {
        vec![value]
    }

    fn all_reduce_sum(&self, value: f64) -> f64 {
        value
    }

    fn barrier(&self) {}
}

/// Exchanges one block with every rank (including this one): `blocks[r]`
/// is sent to rank `r` and the block received from rank `r` is written to
/// `received[r]`, which must already have the expected length.
///
/// Uses a rotation so that at each step every rank sends to one peer and
/// receives from another, which cannot deadlock with blocking transfers.
pub fn all_to_all(
    comm: &dyn Communicator,
    blocks: &[Vec<Complex64>],
    received: &mut [Vec<Complex64>],
    tag: Tag,
) {
    let size = comm.size();
    let rank = comm.rank();

    assert_eq!(blocks.len(), size);
    assert_eq!(received.len(), size);

    received[rank].copy_from_slice(&blocks[rank]);

    for step in 1..size {
        let dest = (rank + step) % size;
        let source = (rank + size - step) % size;
        comm.send_receive(&blocks[dest], dest, &mut received[source], source, tag);
    }
}

#[cfg(test)]
mod test {
    use {super::*, std::sync::Arc};

    #[test]
    fn single_process() {
        let comm = SingleProcess;

        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.size(), 1);
        assert_eq!(comm.all_gather(7), vec![7]);
        assert_eq!(comm.all_reduce_sum(1.5), 1.5);
    }

    #[test]
    fn all_to_all_rotation() {
        let received = ThreadComm::run(3, |comm: Arc<dyn Communicator>| {
            let rank = comm.rank();
            let blocks = (0..3)
                .map(|dest| vec![Complex64::new(rank as f64, dest as f64); dest + 1])
                .collect::<Vec<_>>();
            let mut received = (0..3)
                .map(|_| vec![Complex64::default(); rank + 1])
                .collect::<Vec<_>>();

            all_to_all(comm.as_ref(), &blocks, &mut received, 5);
            received
        });

        for (rank, blocks) in received.iter().enumerate() {
            for (source, block) in blocks.iter().enumerate() {
                assert_eq!(block.len(), rank + 1);
                assert!(block
                    .iter()
                    .all(|c| *c == Complex64::new(source as f64, rank as f64)));
            }
        }
    }
}
