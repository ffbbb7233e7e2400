//! Spectral state files used to restart a run, possibly at a higher
//! resolution.
//!
//! Layout: 4 magic bytes, the format version as a little endian u16, then
//! the bincode encoded [`RestartState`]. Spectral arrays are stored in
//! (kz, ky, kx) layout whatever the FFT backend that produced them.

use {
    crate::{
        error::{Error, Result},
        setofvar::SetOfVariables,
    },
    byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt},
    log::info,
    num_complex::Complex64,
    serde::{Deserialize, Serialize},
    std::{
        fs::File,
        io::{BufReader, BufWriter, Read, Write},
        path::Path,
    },
};

pub const MAGIC: [u8; 4] = *b"PSRS";
pub const VERSION: u16 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartState {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub lx: f64,
    pub ly: f64,
    pub lz: f64,
    pub time: f64,
    pub state: SetOfVariables<Complex64>,
}

impl RestartState {
    /// Spectral shape of the variables, (nz, ny, nx/2 + 1)
    pub fn shape_k(&self) -> [usize; 3] {
        [self.nz, self.ny, self.nx / 2 + 1]
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_u16::<LittleEndian>(VERSION)?;
        bincode::serialize_into(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::Format(format!("bad magic bytes {:?}", magic)));
        }

        let version = reader.read_u16::<LittleEndian>()?;
        if version != VERSION {
            return Err(Error::Format(format!(
                "format version {} (expected {})",
                version, VERSION
            )));
        }

        let restart: Self = bincode::deserialize_from(reader)?;
        if restart.state.shape() != restart.shape_k() {
            return Err(Error::Format(format!(
                "variables of shape {:?} for a {}x{}x{} grid",
                restart.state.shape(),
                restart.nx,
                restart.ny,
                restart.nz
            )));
        }

        Ok(restart)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.write(BufWriter::new(File::create(path.as_ref())?))?;
        info!(
            "saved {:?} at t = {} to {}",
            self.state.keys(),
            self.time,
            path.as_ref().display()
        );
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read(BufReader::new(File::open(path)?))
    }
}
