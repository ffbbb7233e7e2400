//! Named stack of equally shaped arrays, e.g. the spectral state of a
//! solver ("ux_fft", "uy_fft", "eta_fft").

use {
    crate::error::{Error, Result},
    ndarray::{Array3, Array4, ArrayView3, ArrayViewMut3, Axis},
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetOfVariables<A> {
    keys: Vec<String>,
    /// The first axis is the variable index
    pub data: Array4<A>,
}

impl<A: Clone + Default> SetOfVariables<A> {
    pub fn zeros(keys: &[&str], shape: [usize; 3]) -> Self {
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            data: Array4::default((keys.len(), shape[0], shape[1], shape[2])),
        }
    }

    /// Stacks `arrays`, which must all have the same shape.
    pub fn from_arrays(keys: &[&str], arrays: &[ArrayView3<A>]) -> Result<Self> {
        if keys.len() != arrays.len() || arrays.is_empty() {
            return Err(Error::configuration(format!(
                "{} keys for {} arrays",
                keys.len(),
                arrays.len()
            )));
        }

        let data = ndarray::stack(Axis(0), arrays)
            .map_err(|e| Error::configuration(format!("cannot stack variables: {}", e)))?;

        Ok(Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            data,
        })
    }
}

impl<A> SetOfVariables<A> {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn nvar(&self) -> usize {
        self.keys.len()
    }

    /// Shape of every variable
    pub fn shape(&self) -> [usize; 3] {
        let s = self.data.shape();
        [s[1], s[2], s[3]]
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    pub fn get(&self, key: &str) -> Option<ArrayView3<A>> {
        self.index_of(key)
            .map(|i| self.data.index_axis(Axis(0), i))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<ArrayViewMut3<A>> {
        let i = self.index_of(key)?;
        Some(self.data.index_axis_mut(Axis(0), i))
    }

    /// Variables in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, ArrayView3<A>)> {
        self.keys
            .iter()
            .map(String::as_str)
            .zip(self.data.outer_iter())
    }
}

impl<A: Clone> SetOfVariables<A> {
    /// Owned copy of one variable
    pub fn to_array(&self, key: &str) -> Option<Array3<A>> {
        self.get(key).map(|v| v.to_owned())
    }
}
