//! Slab decomposition of the spectral index space.
//!
//! Every rank owns a contiguous range along the first spectral axis and the
//! whole of the two other axes. [`DomainDecomposition::locate_wavenumber`]
//! is the only place where the owner of a global wavenumber is decided; all
//! cross-rank exchanges rely on it giving the same answer on every rank.

use {
    crate::{
        comm::Communicator,
        error::{Error, Result},
        fft::SpectralTransform,
    },
    log::debug,
    std::ops::Range,
};

/// Contiguous block partition of `n` indices over `nb_proc` ranks, the
/// first `n % nb_proc` ranks getting one extra index.
pub fn block_partition(n: usize, nb_proc: usize) -> Result<Vec<Range<usize>>> {
    if nb_proc == 0 {
        return Err(Error::configuration("decomposition over zero ranks"));
    }
    if nb_proc > n {
        return Err(Error::configuration(format!(
            "cannot split {} indices over {} ranks",
            n, nb_proc
        )));
    }

    let base = n / nb_proc;
    let rem = n % nb_proc;

    let mut start = 0;
    Ok((0..nb_proc)
        .map(|rank| {
            let len = base + if rank < rem { 1 } else { 0 };
            let range = start..start + len;
            start += len;
            range
        })
        .collect())
}

/// Owner and local position of a global wavenumber triple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub rank: usize,
    pub ik0: usize,
    pub ik1: usize,
    pub ik2: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DomainDecomposition {
    pub rank: usize,
    pub nb_proc: usize,
    pub shape_k_seq: [usize; 3],
    pub shape_k_loc: [usize; 3],
    /// First global index along axis 0, indexed by rank
    pub starts: Vec<usize>,
    /// Local extent along axis 0, indexed by rank
    pub extents: Vec<usize>,
    /// Every rank holds the same extent along axis 0
    pub same_size_in_all_proc: bool,
}

impl DomainDecomposition {
    /// Builds the decomposition from the extents along axis 0 of every rank.
    pub fn from_extents(
        rank: usize,
        extents: Vec<usize>,
        shape_k_seq: [usize; 3],
        shape_k_loc: [usize; 3],
    ) -> Result<Self> {
        let nb_proc = extents.len();

        if rank >= nb_proc {
            return Err(Error::configuration(format!(
                "rank {} outside of a {} rank decomposition",
                rank, nb_proc
            )));
        }
        if extents.iter().sum::<usize>() != shape_k_seq[0] {
            return Err(Error::configuration(format!(
                "local extents {:?} do not cover the {} global indices",
                extents, shape_k_seq[0]
            )));
        }
        if extents[rank] != shape_k_loc[0] {
            return Err(Error::configuration(format!(
                "local shape {:?} does not match extent {} of rank {}",
                shape_k_loc, extents[rank], rank
            )));
        }

        let starts = extents
            .iter()
            .scan(0, |start, len| {
                let s = *start;
                *start += len;
                Some(s)
            })
            .collect();

        Self::from_table(rank, starts, extents, shape_k_seq, shape_k_loc)
    }

    /// Gathers the offsets and extents published by `transform` on every
    /// rank. Collective.
    pub fn gather(comm: &dyn Communicator, transform: &dyn SpectralTransform) -> Result<Self> {
        let shape_k_loc = transform.shape_k_loc();
        let shape_k_seq = transform.shape_k_seq();
        let first = transform.seq_indices_first_k();

        if first[1] != 0 || first[2] != 0 {
            return Err(Error::configuration(format!(
                "{} FFT splits more than the first spectral axis",
                transform.name()
            )));
        }

        let starts = comm.all_gather(first[0]);
        let extents = comm.all_gather(shape_k_loc[0]);

        Self::from_table(comm.rank(), starts, extents, shape_k_seq, shape_k_loc)
    }

    fn from_table(
        rank: usize,
        starts: Vec<usize>,
        extents: Vec<usize>,
        shape_k_seq: [usize; 3],
        shape_k_loc: [usize; 3],
    ) -> Result<Self> {
        let nb_proc = starts.len();

        // Ranges must tile [0, nk0_seq) in rank order
        let mut next = 0;
        for (r, (&start, &len)) in starts.iter().zip(&extents).enumerate() {
            if start != next {
                return Err(Error::configuration(format!(
                    "rank {} starts at {} instead of {}",
                    r, start, next
                )));
            }
            next += len;
        }
        if next != shape_k_seq[0] {
            return Err(Error::configuration(format!(
                "ranks cover {} of {} indices along the first spectral axis",
                next, shape_k_seq[0]
            )));
        }

        let max = extents.iter().copied().max().unwrap_or(0);
        let same_size_in_all_proc = extents.iter().all(|&e| e >= max);

        debug!(
            "decomposition over {} ranks: starts {:?}, same size: {}",
            nb_proc, starts, same_size_in_all_proc
        );

        Ok(Self {
            rank,
            nb_proc,
            shape_k_seq,
            shape_k_loc,
            starts,
            extents,
            same_size_in_all_proc,
        })
    }

    /// Ranges along axis 0 owned by each rank
    pub fn local_ranges(&self) -> Vec<Range<usize>> {
        self.starts
            .iter()
            .zip(&self.extents)
            .map(|(&s, &e)| s..s + e)
            .collect()
    }

    /// Only the first axis is split
    pub fn is_slab(&self) -> bool {
        self.shape_k_loc[1] == self.shape_k_seq[1] && self.shape_k_loc[2] == self.shape_k_seq[2]
    }

    /// Resolves a global wavenumber triple to its owning rank and the local
    /// index triple on that rank. Negative indices along axes 1 and 2 count
    /// from the end.
    pub fn locate_wavenumber(&self, ik0: usize, ik1: isize, ik2: isize) -> Result<Location> {
        let nk0_seq = self.shape_k_seq[0];

        if ik0 >= nk0_seq {
            return Err(Error::out_of_range(0, ik0 as isize, nk0_seq));
        }

        let rank = if self.nb_proc == 1 {
            0
        } else if self.same_size_in_all_proc {
            let nk0_loc = self.extents[0];
            if ik0 >= nk0_loc * self.nb_proc {
                return Err(Error::out_of_range(0, ik0 as isize, nk0_loc * self.nb_proc));
            }
            ik0 / nk0_loc
        } else {
            let mut rank = 0;
            while rank < self.nb_proc - 1
                && !(self.starts[rank] <= ik0 && ik0 < self.starts[rank + 1])
            {
                rank += 1;
            }
            rank
        };

        Ok(Location {
            rank,
            ik0: ik0 - self.starts[rank],
            ik1: wrap(1, ik1, self.shape_k_loc[1])?,
            ik2: wrap(2, ik2, self.shape_k_loc[2])?,
        })
    }

    /// Global index triple of a local index triple on `rank`
    pub fn global_from_local(&self, rank: usize, local: [usize; 3]) -> [usize; 3] {
        [self.starts[rank] + local[0], local[1], local[2]]
    }
}

fn wrap(axis: usize, ik: isize, extent: usize) -> Result<usize> {
    let n = extent as isize;
    if ik >= n || ik < -n {
        return Err(Error::out_of_range(axis, ik, extent));
    }
    Ok(if ik < 0 { (n + ik) as usize } else { ik as usize })
}
