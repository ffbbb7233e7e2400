//! In-process "cluster": one thread per rank, channels between every pair
//! of ranks. Used by the test-suite and for small runs on a workstation
//! without an MPI installation.

use {
    super::{Communicator, Tag},
    crossbeam_channel::{unbounded, Receiver, Sender},
    log::debug,
    num_complex::Complex64,
    std::{collections::VecDeque, panic, sync::Arc, sync::Mutex, thread},
};

const GATHER_TAG: Tag = -1;
const REDUCE_TAG: Tag = -2;

enum Payload {
    Complex(Vec<Complex64>),
    Index(usize),
    Float(f64),
}

struct Message {
    tag: Tag,
    payload: Payload,
}

pub struct ThreadComm {
    rank: usize,
    // senders[dest]
    senders: Vec<Sender<Message>>,
    // receivers[source]
    receivers: Vec<Receiver<Message>>,
    // Messages already pulled from receivers[source] but not yet matched
    pending: Vec<Mutex<VecDeque<Message>>>,
}

impl ThreadComm {
    /// Creates the communicators of a cluster of `size` ranks, indexed by
    /// rank.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "a cluster needs at least one rank");

        let mut senders = (0..size).map(|_| Vec::new()).collect::<Vec<_>>();
        let mut receivers = (0..size).map(|_| Vec::new()).collect::<Vec<_>>();

        for src in 0..size {
            for dest_receivers in receivers.iter_mut() {
                let (s, r) = unbounded();
                senders[src].push(s);
                dest_receivers.push(r);
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, receivers))| ThreadComm {
                rank,
                senders,
                receivers,
                pending: (0..size).map(|_| Mutex::new(VecDeque::new())).collect(),
            })
            .collect()
    }

    /// Runs `f` on every rank of a fresh cluster of `size` ranks and
    /// returns the results in rank order.
    ///
    /// # Panics
    ///
    /// A panic on any rank is propagated. Also panics if the operating
    /// system refuses to spawn a rank thread.
    pub fn run<T, F>(size: usize, f: F) -> Vec<T>
    where
        F: Fn(Arc<dyn Communicator>) -> T + Sync,
        T: Send,
    {
        let f = &f;

        thread::scope(|scope| {
            let handles = Self::world(size)
                .into_iter()
                .map(|comm| {
                    thread::Builder::new()
                        .name(format!("rank-{}", comm.rank))
                        .spawn_scoped(scope, move || f(Arc::new(comm)))
                        .unwrap_or_else(|e| panic!("failed to spawn rank thread: {}", e))
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| panic::resume_unwind(e)))
                .collect()
        })
    }

    fn post(&self, dest: usize, tag: Tag, payload: Payload) {
        if self.senders[dest].send(Message { tag, payload }).is_err() {
            panic!("rank {}: rank {} has shut down", self.rank, dest);
        }
    }

    fn take(&self, source: usize, tag: Tag) -> Payload {
        let mut pending = self.pending[source]
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        if let Some(pos) = pending.iter().position(|m| m.tag == tag) {
            if let Some(msg) = pending.remove(pos) {
                return msg.payload;
            }
        }

        loop {
            match self.receivers[source].recv() {
                Ok(msg) if msg.tag == tag => return msg.payload,
                Ok(msg) => pending.push_back(msg),
                Err(_) => panic!(
                    "rank {}: rank {} shut down before sending tag {}",
                    self.rank, source, tag
                ),
            }
        }
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn send(&self, data: &[Complex64], dest: usize, tag: Tag) {
        self.post(dest, tag, Payload::Complex(data.to_vec()));
    }

    fn receive(&self, buf: &mut [Complex64], source: usize, tag: Tag) {
        match self.take(source, tag) {
            Payload::Complex(data) => {
                assert_eq!(
                    data.len(),
                    buf.len(),
                    "rank {}: message from {} with tag {} has the wrong length",
                    self.rank,
                    source,
                    tag
                );
                buf.copy_from_slice(&data);
            }
            _ => panic!("rank {}: unexpected payload for tag {}", self.rank, tag),
        }
    }

    fn send_receive(
        &self,
        data: &[Complex64],
        dest: usize,
        buf: &mut [Complex64],
        source: usize,
        tag: Tag,
    ) {
        // Channels are unbounded so the send never blocks
        self.send(data, dest, tag);
        self.receive(buf, source, tag);
    }

    fn all_gather(&self, value: usize) -> Vec<usize> {
        for dest in 0..self.size() {
            self.post(dest, GATHER_TAG, Payload::Index(value));
        }

        (0..self.size())
            .map(|source| match self.take(source, GATHER_TAG) {
                Payload::Index(v) => v,
                _ => panic!("rank {}: unexpected payload in all_gather", self.rank),
            })
            .collect()
    }

    fn all_reduce_sum(&self, value: f64) -> f64 {
        for dest in 0..self.size() {
            self.post(dest, REDUCE_TAG, Payload::Float(value));
        }

        // Summed in rank order so that every rank gets the same bits
        (0..self.size())
            .map(|source| match self.take(source, REDUCE_TAG) {
                Payload::Float(v) => v,
                _ => panic!("rank {}: unexpected payload in all_reduce_sum", self.rank),
            })
            .sum()
    }

    fn barrier(&self) {
        debug!("rank {}: barrier", self.rank);
        self.all_gather(0);
    }
}
