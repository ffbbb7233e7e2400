//! Transfers between a coarse spectral field held by rank 0 and a fine,
//! possibly distributed, spectral field.
//!
//! The coarse field is always in (kz, ky, kx) layout. Planes of constant
//! coarse kz are handled in increasing order; for each plane every rank
//! computes the owner of each coefficient with the decomposition, so that
//! rank 0 and the owners agree on the packing order without exchanging it.

use {
    super::Operators3d,
    crate::{
        comm::Tag,
        decomp::DomainDecomposition,
        error::{Error, Result},
        fft::{AXIS_X, AXIS_Y, AXIS_Z},
        setofvar::SetOfVariables,
    },
    log::debug,
    ndarray::{Array3, ArrayView3, ArrayViewMut3, Axis},
    num_complex::Complex64,
};

/// Fine index of the coarse index `ikc` along a full (signed) axis with
/// `nkc` coarse and `nk` fine indices
pub fn ik_from_ikc(ikc: usize, nkc: usize, nk: usize) -> usize {
    if ikc <= nkc / 2 {
        ikc
    } else {
        ikc + nk - nkc
    }
}

// Fine local index and coarse (ky, kx) index of one coefficient
type Entry = ([usize; 3], [usize; 2]);

impl Operators3d {
    fn check_coarse_shape(&self, coarse_shape: [usize; 3]) -> Result<()> {
        let fine = self.shape_k_canonical();

        if coarse_shape.iter().zip(&fine).any(|(&c, &f)| c == 0 || c > f) {
            return Err(Error::configuration(format!(
                "coarse spectral shape {:?} does not fit in {:?}",
                coarse_shape, fine
            )));
        }

        Ok(())
    }

    fn check_fine_shape(&self, shape: &[usize]) -> Result<()> {
        if shape != &self.shape_k_loc()[..] {
            return Err(Error::configuration(format!(
                "fine array of shape {:?} instead of {:?}",
                shape,
                self.shape_k_loc()
            )));
        }

        Ok(())
    }

    /// Rank 0 tells every rank whether its coarse input is usable. Collective.
    fn agree_on_root(&self, root_ok: bool) -> Result<()> {
        if self.comm.all_gather(root_ok as usize)[0] == 0 {
            return Err(Error::configuration(
                "rank 0 has no coarse field of the expected shape",
            ));
        }

        Ok(())
    }

    /// Owner and packing order of the coefficients of coarse plane `ik0c`
    fn plane_entries(
        &self,
        dd: &DomainDecomposition,
        ik0c: usize,
        coarse_shape: [usize; 3],
    ) -> Result<Vec<Vec<Entry>>> {
        let mapping = self.transform.dim_mapping();
        let fine = self.shape_k_canonical();
        let [nkzc, nkyc, nkxc] = coarse_shape;

        let mut entries = vec![Vec::new(); dd.nb_proc];

        let ikz = ik_from_ikc(ik0c, nkzc, fine[AXIS_Z]);
        for ikyc in 0..nkyc {
            let iky = ik_from_ikc(ikyc, nkyc, fine[AXIS_Y]);
            for ikxc in 0..nkxc {
                let mut zyx = [0; 3];
                zyx[AXIS_Z] = ikz;
                zyx[AXIS_Y] = iky;
                zyx[AXIS_X] = ikxc;
                let ik = mapping.to_k(zyx);

                let loc = dd.locate_wavenumber(ik[0], ik[1] as isize, ik[2] as isize)?;
                entries[loc.rank].push(([loc.ik0, loc.ik1, loc.ik2], [ikyc, ikxc]));
            }
        }

        Ok(entries)
    }

    /// Copies the coarse spectral field held by rank 0 into `fine_fft`.
    /// Coefficients of the fine field outside the coarse grid are left
    /// untouched. `coarse_fft` is only read on rank 0. Collective.
    pub fn scatter_coarse_into_fine(
        &self,
        coarse_fft: Option<ArrayView3<Complex64>>,
        mut fine_fft: ArrayViewMut3<Complex64>,
        coarse_shape: [usize; 3],
    ) -> Result<()> {
        let dd = self.decomposition()?;
        self.check_coarse_shape(coarse_shape)?;
        self.check_fine_shape(fine_fft.shape())?;

        let rank = self.rank();
        let coarse = if rank == 0 {
            coarse_fft.filter(|c| c.shape() == &coarse_shape[..])
        } else {
            None
        };
        self.agree_on_root(rank != 0 || coarse.is_some())?;

        debug!(
            "rank {}: scattering coarse {:?} into {:?}",
            rank,
            coarse_shape,
            self.shape_k_loc()
        );

        for ik0c in 0..coarse_shape[0] {
            let entries = self.plane_entries(dd, ik0c, coarse_shape)?;
            let tag = ik0c as Tag;

            if let Some(coarse) = &coarse {
                let plane = coarse.index_axis(Axis(0), ik0c);

                for (dest, owned) in entries.iter().enumerate() {
                    if dest == 0 {
                        for &(ik, ikc) in owned {
                            fine_fft[ik] = plane[ikc];
                        }
                    } else if !owned.is_empty() {
                        let buf = owned
                            .iter()
                            .map(|&(_, ikc)| plane[ikc])
                            .collect::<Vec<_>>();
                        self.comm.send(&buf, dest, tag);
                    }
                }
            } else if !entries[rank].is_empty() {
                let owned = &entries[rank];
                let mut buf = vec![Complex64::default(); owned.len()];
                self.comm.receive(&mut buf, 0, tag);

                for (&(ik, _), value) in owned.iter().zip(buf) {
                    fine_fft[ik] = value;
                }
            }
        }

        Ok(())
    }

    /// Extracts the coefficients of the coarse grid `coarse_shape` from
    /// `fine_fft`, returned on rank 0 only. With the full canonical shape
    /// this gathers the whole field. Collective.
    pub fn gather_fine_into_coarse(
        &self,
        fine_fft: ArrayView3<Complex64>,
        coarse_shape: [usize; 3],
    ) -> Result<Option<Array3<Complex64>>> {
        let dd = self.decomposition()?;
        self.check_coarse_shape(coarse_shape)?;
        self.check_fine_shape(fine_fft.shape())?;

        let rank = self.rank();
        let [nkzc, nkyc, nkxc] = coarse_shape;
        let mut coarse = if rank == 0 {
            Some(Array3::zeros((nkzc, nkyc, nkxc)))
        } else {
            None
        };

        for ik0c in 0..nkzc {
            let entries = self.plane_entries(dd, ik0c, coarse_shape)?;
            let tag = ik0c as Tag;

            if let Some(coarse) = &mut coarse {
                let mut plane = coarse.index_axis_mut(Axis(0), ik0c);

                for (source, owned) in entries.iter().enumerate() {
                    if source == 0 {
                        for &(ik, ikc) in owned {
                            plane[ikc] = fine_fft[ik];
                        }
                    } else if !owned.is_empty() {
                        let mut buf = vec![Complex64::default(); owned.len()];
                        self.comm.receive(&mut buf, source, tag);

                        for (&(_, ikc), value) in owned.iter().zip(buf) {
                            plane[ikc] = value;
                        }
                    }
                }
            } else if !entries[rank].is_empty() {
                let buf = entries[rank]
                    .iter()
                    .map(|&(ik, _)| fine_fft[ik])
                    .collect::<Vec<_>>();
                self.comm.send(&buf, 0, tag);
            }
        }

        Ok(coarse)
    }

    /// Gathers the whole spectral field on rank 0 in (kz, ky, kx) layout.
    /// Collective.
    pub fn gather_full(&self, fine_fft: ArrayView3<Complex64>) -> Result<Option<Array3<Complex64>>> {
        self.gather_fine_into_coarse(fine_fft, self.shape_k_canonical())
    }

    /// [`Self::scatter_coarse_into_fine`] for every variable. The coarse
    /// set on rank 0 must have the same keys as `fine`. Collective.
    pub fn scatter_coarse_into_fine_set(
        &self,
        coarse: Option<&SetOfVariables<Complex64>>,
        fine: &mut SetOfVariables<Complex64>,
        coarse_shape: [usize; 3],
    ) -> Result<()> {
        let root_ok = self.rank() != 0
            || coarse.map_or(false, |c| c.keys() == fine.keys() && c.shape() == coarse_shape);
        self.agree_on_root(root_ok)?;

        for i in 0..fine.nvar() {
            let coarse_var = coarse.map(|c| c.data.index_axis(Axis(0), i));
            self.scatter_coarse_into_fine(
                coarse_var,
                fine.data.index_axis_mut(Axis(0), i),
                coarse_shape,
            )?;
        }

        Ok(())
    }

    /// [`Self::gather_fine_into_coarse`] for every variable. Collective.
    pub fn gather_fine_into_coarse_set(
        &self,
        fine: &SetOfVariables<Complex64>,
        coarse_shape: [usize; 3],
    ) -> Result<Option<SetOfVariables<Complex64>>> {
        let mut gathered = Vec::with_capacity(fine.nvar());
        for (_, var) in fine.iter() {
            gathered.push(self.gather_fine_into_coarse(var, coarse_shape)?);
        }

        if self.rank() != 0 {
            return Ok(None);
        }

        let keys = fine.keys().iter().map(String::as_str).collect::<Vec<_>>();
        let views = gathered
            .iter()
            .flatten()
            .map(|a| a.view())
            .collect::<Vec<_>>();

        if keys.is_empty() {
            let [n0, n1, n2] = coarse_shape;
            return Ok(Some(SetOfVariables::zeros(&[], [n0, n1, n2])));
        }

        SetOfVariables::from_arrays(&keys, &views).map(Some)
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{
            comm::{Communicator, SingleProcess, ThreadComm},
            fft::{DimMapping, Sequential3d, SpectralTransform},
            parameters::Parameters,
        },
        ndarray::{s, Array3},
        rand::{rngs::StdRng, Rng, SeedableRng},
        std::sync::Arc,
    };

    fn params(n: usize) -> Parameters {
        let mut params = Parameters::default();
        params.oper.nx = n;
        params.oper.ny = n;
        params.oper.nz = n;
        params
    }

    fn random_coarse(shape: [usize; 3], seed: u64) -> Array3<Complex64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array3::from_shape_simple_fn((shape[0], shape[1], shape[2]), || {
            Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
        })
    }

    #[test]
    fn coarse_index_mapping() {
        let mapped = (0..4).map(|ikc| ik_from_ikc(ikc, 4, 16)).collect::<Vec<_>>();
        assert_eq!(mapped, vec![0, 1, 2, 15]);

        let mapped = (0..5).map(|ikc| ik_from_ikc(ikc, 5, 12)).collect::<Vec<_>>();
        assert_eq!(mapped, vec![0, 1, 2, 10, 11]);

        // Same size is the identity
        assert!((0..7).all(|ik| ik_from_ikc(ik, 7, 7) == ik));
    }

    #[test]
    fn single_rank_round_trip() {
        let oper = Operators3d::new(&params(16), Arc::new(SingleProcess)).unwrap();
        let coarse = random_coarse([4, 4, 3], 1);

        let mut fine = oper.create_array_k();
        oper.scatter_coarse_into_fine(Some(coarse.view()), fine.view_mut(), [4, 4, 3])
            .unwrap();

        assert_eq!(fine[[15, 1, 2]], coarse[[3, 1, 2]]);
        assert_eq!(fine[[2, 15, 0]], coarse[[2, 3, 0]]);
        assert_eq!(
            fine.iter().filter(|c| **c != Complex64::default()).count(),
            coarse.len()
        );

        let back = oper
            .gather_fine_into_coarse(fine.view(), [4, 4, 3])
            .unwrap()
            .unwrap();
        assert_eq!(back, coarse);
    }

    #[test]
    fn untouched_outside_coarse_grid() {
        let oper = Operators3d::new(&params(8), Arc::new(SingleProcess)).unwrap();
        let coarse = random_coarse([4, 4, 3], 2);

        let mut fine = oper.create_array_k();
        fine.fill(Complex64::new(7.0, 0.0));
        oper.scatter_coarse_into_fine(Some(coarse.view()), fine.view_mut(), [4, 4, 3])
            .unwrap();

        assert_eq!(fine[[4, 0, 0]], Complex64::new(7.0, 0.0));
        assert_eq!(fine[[0, 0, 4]], Complex64::new(7.0, 0.0));
        assert_eq!(fine[[7, 7, 2]], coarse[[3, 3, 2]]);
    }

    fn distributed_round_trip(nb_proc: usize) {
        let coarse = random_coarse([4, 4, 3], 3);

        // Reference: the same scatter on a single rank
        let seq = Operators3d::new(&params(16), Arc::new(SingleProcess)).unwrap();
        let mut expected = seq.create_array_k();
        seq.scatter_coarse_into_fine(Some(coarse.view()), expected.view_mut(), [4, 4, 3])
            .unwrap();

        let gathered = ThreadComm::run(nb_proc, |comm| {
            let oper = Operators3d::new(&params(16), comm.clone()).unwrap();
            let root = comm.rank() == 0;

            let mut fine = oper.create_array_k();
            oper.scatter_coarse_into_fine(
                if root { Some(coarse.view()) } else { None },
                fine.view_mut(),
                [4, 4, 3],
            )
            .unwrap();

            // Slab layout is (ky, kz, kx)
            let ky0 = oper.transform().seq_indices_first_k()[0];
            let nky = oper.shape_k_loc()[0];
            assert_eq!(
                fine,
                expected
                    .slice(s![.., ky0..ky0 + nky, ..])
                    .permuted_axes([1, 0, 2])
            );

            oper.gather_fine_into_coarse(fine.view(), [4, 4, 3]).unwrap()
        });

        assert_eq!(gathered[0].as_ref(), Some(&coarse));
        assert!(gathered[1..].iter().all(Option::is_none));
    }

    #[test]
    fn equal_partitions() {
        distributed_round_trip(2);
        distributed_round_trip(4);
    }

    #[test]
    fn unequal_partitions() {
        distributed_round_trip(3);
        distributed_round_trip(5);
    }

    #[test]
    fn cubic_coarse_spectrum_into_cubic_fine_spectrum() {
        // nx = 30 gives 16 modes along the half axis
        let mut p = params(16);
        p.oper.nx = 30;
        let coarse = random_coarse([4, 4, 4], 11);

        for &nb_proc in &[1, 3] {
            let gathered = ThreadComm::run(nb_proc, |comm| {
                let oper = Operators3d::new(&p, comm.clone()).unwrap();
                assert_eq!(oper.shape_k_canonical(), [16, 16, 16]);
                let root = comm.rank() == 0;

                let mut fine = oper.create_array_k();
                oper.scatter_coarse_into_fine(
                    if root { Some(coarse.view()) } else { None },
                    fine.view_mut(),
                    [4, 4, 4],
                )
                .unwrap();

                let full = oper.gather_full(fine.view()).unwrap();
                let back = oper.gather_fine_into_coarse(fine.view(), [4, 4, 4]).unwrap();
                (full, back)
            });

            let (full, back) = &gathered[0];
            let full = full.as_ref().unwrap();
            assert_eq!(full[[15, 1, 3]], coarse[[3, 1, 3]]);
            assert_eq!(full[[2, 15, 0]], coarse[[2, 3, 0]]);
            assert_eq!(full[[1, 1, 4]], Complex64::default());
            assert_eq!(back.as_ref(), Some(&coarse));
        }
    }

    #[test]
    fn full_gather_matches_sequential_transform() {
        let n = 8;
        let field = Array3::from_shape_fn((n, n, n), |(iz, iy, ix)| {
            ((ix + iy) as f64 * 0.4).sin() + (iz as f64 * 0.7).cos() * iy as f64
        });
        let expected = Sequential3d::new(n, n, n).fft(field.view());

        let gathered = ThreadComm::run(3, |comm| {
            let oper = Operators3d::new(&params(n), comm).unwrap();
            let z0 = oper.transform().seq_indices_first_x()[0];
            let nz = oper.shape_x_loc()[0];

            let f_fft = oper.fft(field.slice(s![z0..z0 + nz, .., ..]));
            oper.gather_full(f_fft.view()).unwrap()
        });

        let full = gathered[0].as_ref().unwrap();
        assert_eq!(full.dim(), (8, 8, 5));
        for (a, b) in full.iter().zip(expected.iter()) {
            approx::assert_abs_diff_eq!(a.re, b.re, epsilon = 1.0E-13);
            approx::assert_abs_diff_eq!(a.im, b.im, epsilon = 1.0E-13);
        }
    }

    #[test]
    fn sets_of_variables() {
        let keys = ["ux_fft", "uy_fft"];
        let ux = random_coarse([4, 4, 3], 4);
        let uy = random_coarse([4, 4, 3], 5);
        let coarse = SetOfVariables::from_arrays(&keys, &[ux.view(), uy.view()]).unwrap();

        let gathered = ThreadComm::run(2, |comm| {
            let oper = Operators3d::new(&params(8), comm.clone()).unwrap();
            let [n0, n1, n2] = oper.shape_k_loc();
            let mut fine = SetOfVariables::zeros(&keys, [n0, n1, n2]);

            let root = comm.rank() == 0;
            oper.scatter_coarse_into_fine_set(
                if root { Some(&coarse) } else { None },
                &mut fine,
                [4, 4, 3],
            )
            .unwrap();

            oper.gather_fine_into_coarse_set(&fine, [4, 4, 3]).unwrap()
        });

        assert_eq!(gathered[0].as_ref(), Some(&coarse));
    }

    #[test]
    fn bad_coarse_inputs() {
        let oper = Operators3d::new(&params(8), Arc::new(SingleProcess)).unwrap();
        let mut fine = oper.create_array_k();
        let coarse = random_coarse([4, 4, 3], 6);

        // Larger than the fine grid
        assert!(matches!(
            oper.scatter_coarse_into_fine(Some(coarse.view()), fine.view_mut(), [12, 4, 3]),
            Err(Error::Configuration(_))
        ));
        // Missing on rank 0
        assert!(matches!(
            oper.scatter_coarse_into_fine(None, fine.view_mut(), [4, 4, 3]),
            Err(Error::Configuration(_))
        ));
        // Shape disagreeing with the declared one
        assert!(matches!(
            oper.scatter_coarse_into_fine(Some(coarse.view()), fine.view_mut(), [4, 4, 2]),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            oper.gather_fine_into_coarse(fine.view(), [4, 9, 3]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn mismatched_ranks_agree_on_failure() {
        let results = ThreadComm::run(3, |comm| {
            let oper = Operators3d::new(&params(8), comm.clone()).unwrap();
            let mut fine = oper.create_array_k();
            oper.scatter_coarse_into_fine(None, fine.view_mut(), [4, 4, 3])
                .is_err()
        });

        assert_eq!(results, vec![true; 3]);
    }

    /// Pretends to split the second spectral axis over two ranks
    struct Pencil(Sequential3d);

    impl SpectralTransform for Pencil {
        fn name(&self) -> &str {
            "pencil"
        }

        fn fft(&self, field: ArrayView3<f64>) -> Array3<Complex64> {
            self.0.fft(field)
        }

        fn ifft(&self, field_fft: ArrayView3<Complex64>) -> Array3<f64> {
            self.0.ifft(field_fft)
        }

        fn shape_x_seq(&self) -> [usize; 3] {
            self.0.shape_x_seq()
        }

        fn shape_x_loc(&self) -> [usize; 3] {
            self.0.shape_x_loc()
        }

        fn shape_k_seq(&self) -> [usize; 3] {
            self.0.shape_k_seq()
        }

        fn shape_k_loc(&self) -> [usize; 3] {
            let [n0, n1, n2] = self.0.shape_k_seq();
            [n0, n1 / 2, n2]
        }

        fn seq_indices_first_x(&self) -> [usize; 3] {
            [0; 3]
        }

        fn seq_indices_first_k(&self) -> [usize; 3] {
            [0; 3]
        }

        fn dim_mapping(&self) -> DimMapping {
            DimMapping::IDENTITY
        }
    }

    #[test]
    fn multi_axis_decomposition_is_unimplemented() {
        let comm: Arc<dyn Communicator> = Arc::new(SingleProcess);
        let oper = Operators3d::with_transform(
            &params(8),
            comm,
            Box::new(Pencil(Sequential3d::new(8, 8, 8))),
        )
        .unwrap();
        let mut fine = oper.create_array_k();
        let coarse = random_coarse([4, 4, 3], 7);

        assert!(matches!(
            oper.scatter_coarse_into_fine(Some(coarse.view()), fine.view_mut(), [4, 4, 3]),
            Err(Error::Unimplemented(_))
        ));
        assert!(matches!(
            oper.gather_fine_into_coarse(fine.view(), [4, 4, 3]),
            Err(Error::Unimplemented(_))
        ));
        assert!(matches!(
            oper.set_value_spect(fine.view_mut(), Complex64::default(), [0, 0, 1]),
            Err(Error::Unimplemented(_))
        ));
    }
}
