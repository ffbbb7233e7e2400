use {
    crate::{
        dealias::KernelKind,
        error::{Error, Result},
        fft::FftKind,
    },
    serde::{Deserialize, Serialize},
    std::f64::consts::PI,
};

/// Grid size used when only a coarse operator is requested
pub const COARSE_OPER_SIZE: usize = 4;

/// Operator parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Parameters {
    pub oper: Oper,
    /// Forces a tiny grid regardless of the requested sizes, for cheap
    /// structural testing of dependent code
    #[serde(rename = "ONLY_COARSE_OPER")]
    pub only_coarse_oper: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Oper {
    /// Method for the 3d FFT ("default", "sequential" or "slab")
    pub type_fft: String,
    /// Method for the 2d FFT
    pub type_fft2d: String,
    /// Fraction of the largest wavenumber kept by the dealiasing mask
    pub coef_dealiasing: f64,
    /// Number of points over the x-axis (last dimension in physical space)
    pub nx: usize,
    /// Number of points over the y-axis
    pub ny: usize,
    /// Number of points over the z-axis (first dimension in physical space)
    pub nz: usize,
    /// Domain lengths
    #[serde(rename = "Lx", alias = "lx")]
    pub lx: f64,
    #[serde(rename = "Ly", alias = "ly")]
    pub ly: f64,
    #[serde(rename = "Lz", alias = "lz")]
    pub lz: f64,
    /// Also dealias the modes with kx = ky = 0
    #[serde(rename = "NO_SHEAR_MODES", alias = "no_shear_modes")]
    pub no_shear_modes: bool,
    /// Dealiasing implementation
    pub dealiasing_kernel: KernelKind,
}

impl Default for Oper {
    fn default() -> Self {
        Oper {
            type_fft: "default".to_string(),
            type_fft2d: "sequential".to_string(),
            coef_dealiasing: 2.0 / 3.0,
            nx: 48,
            ny: 48,
            nz: 48,
            lx: 2.0 * PI,
            ly: 2.0 * PI,
            lz: 2.0 * PI,
            no_shear_modes: false,
            dealiasing_kernel: KernelKind::Sweep,
        }
    }
}

impl Parameters {
    /// Physical grid size actually used, as (nx, ny, nz)
    pub fn grid_size(&self) -> (usize, usize, usize) {
        if self.only_coarse_oper {
            (COARSE_OPER_SIZE, COARSE_OPER_SIZE, COARSE_OPER_SIZE)
        } else {
            (self.oper.nx, self.oper.ny, self.oper.nz)
        }
    }

    /// Checks every option and returns the parsed FFT method.
    pub fn validate(&self) -> Result<FftKind> {
        let oper = &self.oper;

        if !(oper.coef_dealiasing > 0.0 && oper.coef_dealiasing <= 1.0) {
            return Err(Error::configuration(format!(
                "coef_dealiasing must be in (0, 1], got {}",
                oper.coef_dealiasing
            )));
        }

        for (name, n) in &[("nx", oper.nx), ("ny", oper.ny), ("nz", oper.nz)] {
            if *n == 0 {
                return Err(Error::configuration(format!("{} must be positive", name)));
            }
        }

        for (name, l) in &[("Lx", oper.lx), ("Ly", oper.ly), ("Lz", oper.lz)] {
            if !(*l > 0.0 && l.is_finite()) {
                return Err(Error::configuration(format!(
                    "{} must be a positive length, got {}",
                    name, l
                )));
            }
        }

        let fft2d = oper.type_fft2d.as_str();
        if !(fft2d == "default"
            || fft2d == "sequential"
            || fft2d.starts_with("fft2d.")
            || fft2d.starts_with("fluidfft.fft2d."))
        {
            return Err(Error::configuration(format!(
                "unknown 2d FFT method \"{}\"",
                fft2d
            )));
        }

        oper.type_fft.parse()
    }
}
